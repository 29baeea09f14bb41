//! Per-feed watermarks: deciding which items of a snapshot are new.
//!
//! A watermark is the latest item timestamp already delivered for a feed.
//! Feeds seen for the first time start at the Unix epoch, so their whole
//! history is new. Watermarks only ever move forward, and only to item
//! timestamps; wall-clock time never enters the comparison.
//!
//! The tracker is owned by the poller task and never shared, so the map needs
//! no lock.
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::feed::{FeedSnapshot, Item};
use crate::sink::{render_item, OutputSink, SinkError, MAIN_BUFFER};

#[derive(Debug, Default)]
pub struct DedupTracker {
    watermarks: HashMap<String, DateTime<Utc>>,
}

impl DedupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current watermark for a feed key, `None` if the feed was never delivered.
    pub fn watermark(&self, key: &str) -> Option<DateTime<Utc>> {
        self.watermarks.get(key).copied()
    }

    /// Delivers the new items of `snapshot` to the sink's main buffer.
    ///
    /// Items are judged against the watermark as it stood when the snapshot
    /// arrived, so items sharing a timestamp are all delivered. After each
    /// delivery the watermark advances to the timestamp that qualified the
    /// item. On a sink error the remaining items are not delivered and the
    /// watermark reflects exactly what reached the sink.
    ///
    /// Returns the number of items delivered.
    pub fn deliver(
        &mut self,
        snapshot: &FeedSnapshot,
        sink: &dyn OutputSink,
    ) -> Result<usize, SinkError> {
        let key = snapshot.key();
        let baseline = self
            .watermark(key)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        if !has_news(snapshot, baseline) {
            tracing::trace!(feed = %key, watermark = %baseline, "Nothing new");
            return Ok(0);
        }

        let mut delivered = 0;
        for item in snapshot.items() {
            let Some(advance_to) = qualifying_timestamp(item, baseline) else {
                continue;
            };

            sink.write_line(MAIN_BUFFER, &render_item(item))?;
            delivered += 1;

            let watermark = self.watermarks.entry(key.to_string()).or_insert(baseline);
            if advance_to > *watermark {
                *watermark = advance_to;
            }
        }

        tracing::debug!(
            feed = %key,
            delivered,
            watermark = ?self.watermark(key),
            "Delivered new items"
        );
        Ok(delivered)
    }
}

/// Shortcut check before walking the items.
fn has_news(snapshot: &FeedSnapshot, watermark: DateTime<Utc>) -> bool {
    snapshot.newest().is_some_and(|newest| newest > watermark)
        || snapshot
            .items()
            .iter()
            .any(|item| item.updated.is_some_and(|updated| updated > watermark))
}

/// The timestamp that makes `item` new, if any.
///
/// `published` wins when it is after the watermark; otherwise a later
/// `updated` counts. Undated items never qualify.
fn qualifying_timestamp(item: &Item, watermark: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match (item.published, item.updated) {
        (Some(published), _) if published > watermark => Some(published),
        (_, Some(updated)) if updated > watermark => Some(updated),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{at, item, MemorySink};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn snapshot(title: &str, items: Vec<Item>) -> FeedSnapshot {
        FeedSnapshot::new(format!("http://{}/feed", title.to_lowercase()), title, items)
    }

    #[test]
    fn test_first_contact_delivers_everything() {
        let mut tracker = DedupTracker::new();
        let sink = MemorySink::default();

        let feed = snapshot(
            "A",
            vec![item("old", Some(10), None), item("new", Some(1_700_000_000), None)],
        );
        let delivered = tracker.deliver(&feed, &sink).unwrap();

        assert_eq!(delivered, 2);
        assert_eq!(
            sink.lines(),
            vec![
                "[old](https://example.com/old)",
                "[new](https://example.com/new)"
            ]
        );
        assert_eq!(sink.buffers(), vec![MAIN_BUFFER, MAIN_BUFFER]);
        assert_eq!(tracker.watermark("A"), Some(at(1_700_000_000)));
    }

    #[test]
    fn test_redelivery_of_same_snapshot_is_empty() {
        let mut tracker = DedupTracker::new();
        let sink = MemorySink::default();
        let feed = snapshot("A", vec![item("a", Some(100), None), item("b", Some(200), None)]);

        tracker.deliver(&feed, &sink).unwrap();
        assert_eq!(tracker.deliver(&feed, &sink).unwrap(), 0);
        assert_eq!(sink.lines().len(), 2);
    }

    #[test]
    fn test_only_items_after_watermark_delivered() {
        let mut tracker = DedupTracker::new();
        let sink = MemorySink::default();
        tracker
            .deliver(&snapshot("A", vec![item("a", Some(100), None)]), &sink)
            .unwrap();

        let next = snapshot(
            "A",
            vec![
                item("a", Some(100), None),
                item("older", Some(50), None),
                item("b", Some(150), None),
            ],
        );
        assert_eq!(tracker.deliver(&next, &sink).unwrap(), 1);
        assert_eq!(sink.lines().last().unwrap(), "[b](https://example.com/b)");
        assert_eq!(tracker.watermark("A"), Some(at(150)));
    }

    #[test]
    fn test_updated_after_watermark_is_delivered() {
        let mut tracker = DedupTracker::new();
        let sink = MemorySink::default();
        tracker
            .deliver(&snapshot("A", vec![item("a", Some(100), None)]), &sink)
            .unwrap();

        // Published before the watermark but edited since.
        let edited = snapshot("A", vec![item("a", Some(100), Some(300))]);
        assert_eq!(tracker.deliver(&edited, &sink).unwrap(), 1);
        assert_eq!(tracker.watermark("A"), Some(at(300)));

        // The edit has now been seen.
        assert_eq!(tracker.deliver(&edited, &sink).unwrap(), 0);
    }

    #[test]
    fn test_updated_at_or_before_watermark_skipped() {
        let mut tracker = DedupTracker::new();
        let sink = MemorySink::default();
        tracker
            .deliver(&snapshot("A", vec![item("a", Some(100), None)]), &sink)
            .unwrap();

        let stale = snapshot(
            "A",
            vec![item("x", Some(40), Some(100)), item("y", None, Some(90))],
        );
        assert_eq!(tracker.deliver(&stale, &sink).unwrap(), 0);
        assert_eq!(tracker.watermark("A"), Some(at(100)));
    }

    #[test]
    fn test_updated_only_item_uses_updated_as_effective() {
        let mut tracker = DedupTracker::new();
        let sink = MemorySink::default();

        let feed = snapshot("A", vec![item("u", None, Some(500))]);
        assert_eq!(tracker.deliver(&feed, &sink).unwrap(), 1);
        assert_eq!(tracker.watermark("A"), Some(at(500)));
    }

    #[test]
    fn test_watermark_is_item_time_not_wall_clock() {
        let mut tracker = DedupTracker::new();
        let sink = MemorySink::default();

        tracker
            .deliver(&snapshot("A", vec![item("a", Some(1_000), None)]), &sink)
            .unwrap();
        assert_eq!(tracker.watermark("A"), Some(at(1_000)));

        // A late-arriving item with an older-than-now but newer-than-watermark
        // timestamp must still get through.
        let late = snapshot("A", vec![item("late", Some(1_001), None)]);
        assert_eq!(tracker.deliver(&late, &sink).unwrap(), 1);
    }

    #[test]
    fn test_undated_items_never_delivered() {
        let mut tracker = DedupTracker::new();
        let sink = MemorySink::default();

        let feed = snapshot("A", vec![item("ghost", None, None), item("real", Some(10), None)]);
        assert_eq!(tracker.deliver(&feed, &sink).unwrap(), 1);
        assert_eq!(sink.lines(), vec!["[real](https://example.com/real)"]);

        let all_undated = snapshot("B", vec![item("ghost", None, None)]);
        assert_eq!(tracker.deliver(&all_undated, &sink).unwrap(), 0);
        assert_eq!(tracker.watermark("B"), None);
    }

    #[test]
    fn test_items_sharing_timestamp_all_delivered() {
        let mut tracker = DedupTracker::new();
        let sink = MemorySink::default();

        let feed = snapshot(
            "A",
            vec![item("one", Some(100), None), item("two", Some(100), None)],
        );
        assert_eq!(tracker.deliver(&feed, &sink).unwrap(), 2);
    }

    #[test]
    fn test_feeds_tracked_independently() {
        let mut tracker = DedupTracker::new();
        let sink = MemorySink::default();

        tracker
            .deliver(&snapshot("A", vec![item("a", Some(1_000), None)]), &sink)
            .unwrap();
        tracker
            .deliver(&snapshot("B", vec![item("b", Some(10), None)]), &sink)
            .unwrap();

        assert_eq!(tracker.watermark("A"), Some(at(1_000)));
        assert_eq!(tracker.watermark("B"), Some(at(10)));
    }

    #[test]
    fn test_untitled_feed_keyed_by_url() {
        let mut tracker = DedupTracker::new();
        let sink = MemorySink::default();

        let feed = FeedSnapshot::new("http://x/feed", "", vec![item("a", Some(5), None)]);
        tracker.deliver(&feed, &sink).unwrap();
        assert_eq!(tracker.watermark("http://x/feed"), Some(at(5)));
    }

    #[test]
    fn test_sink_failure_propagates_without_advancing() {
        let mut tracker = DedupTracker::new();
        let sink = MemorySink::failing();

        let feed = snapshot("A", vec![item("a", Some(100), None)]);
        assert!(tracker.deliver(&feed, &sink).is_err());
        assert_eq!(tracker.watermark("A"), None);
    }

    proptest! {
        #[test]
        fn prop_watermark_monotonic_and_no_duplicates(
            cycles in proptest::collection::vec(
                proptest::collection::vec((1i64..10_000, proptest::option::of(1i64..10_000)), 0..8),
                1..8,
            )
        ) {
            let mut tracker = DedupTracker::new();
            let sink = MemorySink::default();
            let mut previous: Option<DateTime<Utc>> = None;

            for cycle in cycles {
                let items: Vec<Item> = cycle
                    .iter()
                    .enumerate()
                    .map(|(i, (published, updated))| item(&format!("i{i}"), Some(*published), *updated))
                    .collect();
                let feed = snapshot("P", items);
                let baseline = tracker.watermark("P").unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

                let before = sink.lines().len();
                let delivered = tracker.deliver(&feed, &sink).unwrap();
                prop_assert_eq!(sink.lines().len() - before, delivered);

                // Everything delivered was strictly newer than the baseline.
                let expected = feed
                    .items()
                    .iter()
                    .filter(|i| qualifying_timestamp(i, baseline).is_some())
                    .count();
                prop_assert_eq!(delivered, expected);

                let current = tracker.watermark("P");
                prop_assert!(current >= previous);

                // A re-fed snapshot can only surface edits that postdate the
                // new watermark, and settles after that.
                tracker.deliver(&feed, &sink).unwrap();
                prop_assert_eq!(tracker.deliver(&feed, &sink).unwrap(), 0);
                prop_assert!(tracker.watermark("P") >= current);
                previous = tracker.watermark("P");
            }
        }
    }
}
