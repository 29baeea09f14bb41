//! One polling cycle: walk the subscription list and stream snapshots out.
//!
//! A cycle runs as its own task and produces [`CycleEvent`]s into a channel of
//! capacity 1, so it never gets more than one snapshot ahead of the consumer.
//! Fetches are sequential, each preceded by a random 0-999 ms pause so a long
//! subscription list does not turn into a synchronized burst of requests.
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::feed::{FeedFetcher, FeedSnapshot, FetchError};
use crate::subscriptions::{StoreError, SubscriptionStore};

/// Exclusive upper bound of the per-fetch pause.
pub const MAX_JITTER: Duration = Duration::from_millis(1000);

/// Which snapshots a cycle lets through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleMode {
    /// First pass after startup: every non-empty snapshot, whatever its age.
    Backfill,
    /// Recurring pass: only feeds whose newest item is after `since`.
    Incremental { since: DateTime<Utc> },
}

impl CycleMode {
    /// Incremental mode with the staleness window of twice the poll interval.
    pub fn incremental(now: DateTime<Utc>, poll_interval: Duration) -> Self {
        let window =
            TimeDelta::from_std(poll_interval.saturating_mul(2)).unwrap_or(TimeDelta::MAX);
        let since = now
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self::Incremental { since }
    }

    /// Staleness pre-filter. This only saves dedup work; it is not what
    /// decides whether an item is new.
    pub fn admits(&self, snapshot: &FeedSnapshot) -> bool {
        match self {
            Self::Backfill => true,
            Self::Incremental { since } => snapshot.newest().is_some_and(|newest| newest > *since),
        }
    }
}

/// What a cycle reports back to the poller.
#[derive(Debug)]
pub enum CycleEvent {
    Snapshot(FeedSnapshot),
    FetchFailed { url: String, error: FetchError },
    ListFailed(StoreError),
}

pub struct Scheduler<F> {
    store: Arc<SubscriptionStore>,
    fetcher: Arc<F>,
    max_jitter: Duration,
}

impl<F: FeedFetcher> Scheduler<F> {
    pub fn new(store: Arc<SubscriptionStore>, fetcher: Arc<F>) -> Self {
        Self {
            store,
            fetcher,
            max_jitter: MAX_JITTER,
        }
    }

    pub fn with_max_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Starts one cycle in the background.
    ///
    /// The channel closes when the list is exhausted, when `cancel` fires, or
    /// early if the receiver is dropped.
    pub fn spawn_cycle(
        &self,
        mode: CycleMode,
        cancel: CancellationToken,
    ) -> (mpsc::Receiver<CycleEvent>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(1);
        let store = Arc::clone(&self.store);
        let fetcher = Arc::clone(&self.fetcher);
        let max_jitter = self.max_jitter;

        let handle = tokio::spawn(async move {
            run_cycle(&store, fetcher.as_ref(), mode, max_jitter, &cancel, &tx).await;
        });

        (rx, handle)
    }
}

async fn run_cycle<F: FeedFetcher>(
    store: &SubscriptionStore,
    fetcher: &F,
    mode: CycleMode,
    max_jitter: Duration,
    cancel: &CancellationToken,
    tx: &mpsc::Sender<CycleEvent>,
) {
    let urls = match store.list().await {
        Ok(urls) => urls,
        Err(e) => {
            tracing::warn!(error = %e, "Could not read subscriptions, skipping cycle");
            let _ = tx.send(CycleEvent::ListFailed(e)).await;
            return;
        }
    };
    tracing::debug!(feeds = urls.len(), ?mode, "Cycle started");

    for url in urls {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(jitter(max_jitter)) => {}
        }

        let event = match fetcher.fetch(&url, cancel).await {
            Ok(snapshot) if snapshot.is_empty() => {
                tracing::debug!(url = %url, "Feed has no items");
                continue;
            }
            Ok(snapshot) if !mode.admits(&snapshot) => {
                tracing::debug!(url = %url, newest = ?snapshot.newest(), "Feed is stale, skipping");
                continue;
            }
            Ok(snapshot) => CycleEvent::Snapshot(snapshot),
            Err(FetchError::Cancelled) => break,
            Err(error) => {
                tracing::warn!(url = %url, error = %error, "Feed fetch failed");
                CycleEvent::FetchFailed { url, error }
            }
        };

        if tx.send(event).await.is_err() {
            tracing::debug!("Cycle consumer dropped, stopping early");
            return;
        }
    }
}

fn jitter(max: Duration) -> Duration {
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..max_ms))
}
