use feed_rs::parser;

use super::snapshot::{FeedSnapshot, Item};

/// Parses an RSS/Atom/JSON Feed document into a [`FeedSnapshot`].
///
/// Entries without a title get `"Untitled"`; the first link, if any, becomes
/// the item link. A feed with zero entries parses to an empty snapshot.
pub fn parse_feed(url: &str, bytes: &[u8]) -> Result<FeedSnapshot, parser::ParseFeedError> {
    let feed = parser::parse(bytes)?;

    let title = feed.title.map(|t| t.content).unwrap_or_default();

    let items: Vec<Item> = feed
        .entries
        .into_iter()
        .map(|entry| Item {
            title: entry
                .title
                .map(|t| t.content)
                .unwrap_or_else(|| "Untitled".to_string()),
            link: entry.links.into_iter().next().map(|l| l.href),
            published: entry.published,
            updated: entry.updated,
        })
        .collect();

    Ok(FeedSnapshot::new(url, title, items))
}
