//! Feed retrieval: turning one subscription URL into a sorted snapshot.
//!
//! - [`snapshot`] - `FeedSnapshot` / `Item`, the values handed to deduplication
//! - [`parser`] - document parsing via the `feed-rs` crate
//! - [`fetcher`] - the `FeedFetcher` seam and its deadline-bounded HTTP implementation
//!
//! # Example
//!
//! ```ignore
//! use feedpoll::feed::{FeedFetcher, HttpFetcher};
//! use tokio_util::sync::CancellationToken;
//!
//! let fetcher = HttpFetcher::new(reqwest::Client::new());
//! let snapshot = fetcher.fetch("https://example.com/feed.xml", &CancellationToken::new()).await?;
//! for item in snapshot.items() {
//!     println!("{}", item.title);
//! }
//! ```

mod fetcher;
mod parser;
mod snapshot;

pub use fetcher::{build_client, FeedFetcher, FetchError, HttpFetcher};
pub use parser::parse_feed;
pub use snapshot::{FeedSnapshot, Item};
