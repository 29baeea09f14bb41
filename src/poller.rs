//! The long-running polling loop.
//!
//! ```text
//! Backfilling ──► Idle ──► Polling ──► Idle ──► … ──► Stopped
//!                  ▲  timer / refresh  │
//!                  └───────────────────┘
//! ```
//!
//! The poller owns the [`DedupTracker`], so watermarks are only ever touched
//! from this one task. Each cycle's fetching runs in a separate scheduler task
//! feeding a capacity-1 channel that the poller drains.
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::dedup::DedupTracker;
use crate::feed::FeedFetcher;
use crate::scheduler::{CycleEvent, CycleMode, Scheduler};
use crate::sink::{OutputSink, SinkError};

#[derive(Debug, Error)]
pub enum PollError {
    /// Items can't be retried safely once the watermark moved, so a failed
    /// item write ends polling. Diagnostic write failures are only logged.
    #[error("Output sink failed: {0}")]
    Sink(#[from] SinkError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Backfilling,
    Idle,
    Polling,
    Stopped,
}

/// Counters for one finished cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    /// Snapshots that passed the scheduler's filters
    pub fetched: usize,
    /// Feeds that failed to fetch or parse
    pub failed: usize,
    /// Items written to the sink
    pub delivered: usize,
}

/// Asks an idle poller to start a cycle now.
///
/// Never blocks: a signal sent while a cycle is running is discarded once the
/// poller goes idle again, and a second signal before the first is picked up
/// is dropped.
#[derive(Debug, Clone)]
pub struct RefreshHandle {
    tx: mpsc::Sender<()>,
}

impl RefreshHandle {
    pub(crate) fn channel() -> (Self, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }

    /// Returns `false` if the signal was dropped.
    pub fn refresh(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(())) => {
                tracing::debug!("Refresh already pending, dropping signal");
                false
            }
            Err(mpsc::error::TrySendError::Closed(())) => {
                tracing::debug!("Poller stopped, dropping refresh signal");
                false
            }
        }
    }
}

enum Wake {
    Timer,
    Refresh,
    Stop,
}

pub struct Poller<F> {
    scheduler: Scheduler<F>,
    sink: Arc<dyn OutputSink>,
    tracker: DedupTracker,
    poll_interval: Duration,
    refresh_rx: mpsc::Receiver<()>,
    cancel: CancellationToken,
    state: watch::Sender<PollState>,
}

impl<F: FeedFetcher> Poller<F> {
    pub fn new(
        scheduler: Scheduler<F>,
        sink: Arc<dyn OutputSink>,
        poll_interval: Duration,
        cancel: CancellationToken,
    ) -> (Self, RefreshHandle) {
        let (refresh, refresh_rx) = RefreshHandle::channel();
        let (state, _) = watch::channel(PollState::Backfilling);
        let poller = Self {
            scheduler,
            sink,
            tracker: DedupTracker::new(),
            poll_interval,
            refresh_rx,
            cancel,
            state,
        };
        (poller, refresh)
    }

    /// Observe state transitions, e.g. to know when the poller is idle.
    pub fn subscribe_state(&self) -> watch::Receiver<PollState> {
        self.state.subscribe()
    }

    pub fn tracker(&self) -> &DedupTracker {
        &self.tracker
    }

    /// Runs backfill, then incremental cycles until cancelled.
    ///
    /// Returns `Ok(())` on cancellation and `Err` if the sink fails.
    pub async fn run(mut self) -> Result<(), PollError> {
        let result = self.run_loop().await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "Polling stopped");
        }
        self.set_state(PollState::Stopped);
        result
    }

    async fn run_loop(&mut self) -> Result<(), PollError> {
        self.set_state(PollState::Backfilling);
        self.run_cycle(CycleMode::Backfill).await?;

        loop {
            // Refreshes requested while a cycle was running are stale now.
            while self.refresh_rx.try_recv().is_ok() {}
            self.set_state(PollState::Idle);

            match self.wait().await {
                Wake::Stop => {
                    tracing::info!("Cancellation received, stopping poller");
                    return Ok(());
                }
                Wake::Refresh => tracing::info!("Refresh requested"),
                Wake::Timer => tracing::debug!("Poll interval elapsed"),
            }

            self.set_state(PollState::Polling);
            let mode = CycleMode::incremental(Utc::now(), self.poll_interval);
            self.run_cycle(mode).await?;
        }
    }

    async fn wait(&mut self) -> Wake {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Wake::Stop,
            Some(()) = self.refresh_rx.recv() => Wake::Refresh,
            _ = tokio::time::sleep(self.poll_interval) => Wake::Timer,
        }
    }

    /// Runs a single cycle to completion and delivers what it finds.
    pub async fn run_cycle(&mut self, mode: CycleMode) -> Result<CycleSummary, PollError> {
        let (mut rx, handle) = self.scheduler.spawn_cycle(mode, self.cancel.clone());
        let mut summary = CycleSummary::default();

        while let Some(event) = rx.recv().await {
            match event {
                CycleEvent::Snapshot(snapshot) => {
                    summary.fetched += 1;
                    match self.tracker.deliver(&snapshot, self.sink.as_ref()) {
                        Ok(n) => summary.delivered += n,
                        Err(e) => {
                            handle.abort();
                            return Err(e.into());
                        }
                    }
                }
                CycleEvent::FetchFailed { url, error } => {
                    summary.failed += 1;
                    self.report(&format!("{}: {}", url, error));
                }
                CycleEvent::ListFailed(error) => self.report(&error.to_string()),
            }
        }

        if let Err(e) = handle.await {
            if e.is_panic() {
                tracing::error!(error = %e, "Scheduler task panicked");
            }
        }

        tracing::info!(
            mode = ?mode,
            fetched = summary.fetched,
            failed = summary.failed,
            delivered = summary.delivered,
            "Cycle complete"
        );
        Ok(summary)
    }

    /// Diagnostics are best effort: losing one must not stop item delivery.
    fn report(&self, line: &str) {
        if let Err(e) = self.sink.diagnostic(line) {
            tracing::warn!(error = %e, line = %line, "Failed to write diagnostic");
        }
    }

    fn set_state(&self, state: PollState) {
        self.state.send_replace(state);
    }
}
