use chrono::{DateTime, Utc};

/// One entry of a fetched feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub title: String,
    pub link: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
}

impl Item {
    /// The timestamp used for ordering: `published`, falling back to `updated`.
    pub fn effective(&self) -> Option<DateTime<Utc>> {
        self.published.or(self.updated)
    }
}

/// The result of one successful fetch.
///
/// Items are sorted ascending by [`Item::effective`], with undated items
/// first. Snapshots are never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSnapshot {
    /// URL the snapshot was fetched from
    pub url: String,
    /// Feed title as published by the feed (may be empty)
    pub title: String,
    items: Vec<Item>,
}

impl FeedSnapshot {
    /// Builds a snapshot, sorting `items` into ascending timestamp order.
    ///
    /// The sort is stable so items sharing a timestamp keep document order.
    pub fn new(url: impl Into<String>, title: impl Into<String>, mut items: Vec<Item>) -> Self {
        items.sort_by_key(Item::effective);
        Self {
            url: url.into(),
            title: title.into(),
            items,
        }
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Effective timestamp of the most recent item, if it has one.
    pub fn newest(&self) -> Option<DateTime<Utc>> {
        self.items.last().and_then(Item::effective)
    }

    /// Key under which per-feed state is tracked: the title, or the URL for
    /// feeds that publish no title.
    pub fn key(&self) -> &str {
        if self.title.trim().is_empty() {
            &self.url
        } else {
            &self.title
        }
    }
}
