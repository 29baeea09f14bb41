//! Feed ingestion engine: polls subscribed RSS/Atom/JSON feeds on a fixed
//! cadence and forwards items it has not delivered before.
//!
//! - [`subscriptions`] - the newline-delimited subscription file
//! - [`feed`] - fetching and parsing one feed into a snapshot
//! - [`scheduler`] - walking the subscription list once per cycle
//! - [`dedup`] - per-feed watermarks deciding what is new
//! - [`poller`] - the long-running loop tying the above together
//! - [`commands`] - subscribe/unsubscribe/refresh/close from a command source
//! - [`sink`] - where delivered items and diagnostics go

pub mod commands;
pub mod config;
pub mod dedup;
pub mod feed;
pub mod poller;
pub mod scheduler;
pub mod sink;
pub mod subscriptions;
pub mod util;

#[cfg(test)]
mod testing;
