use std::future::Future;
use std::time::Duration;

use futures::StreamExt;
use reqwest::redirect::Policy;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::parser::parse_feed;
use super::snapshot::FeedSnapshot;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while fetching a single feed.
///
/// None of these are fatal to a polling cycle: the scheduler reports them
/// as diagnostics and moves on to the next subscription.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the per-fetch deadline
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// The process-wide cancellation token fired mid-fetch
    #[error("Fetch cancelled")]
    Cancelled,
    /// Document could not be parsed as RSS, Atom or JSON Feed
    #[error("Parse error: {0}")]
    Parse(String),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Turns a subscription URL into a parsed [`FeedSnapshot`].
///
/// Implementations must return promptly once `cancel` fires.
pub trait FeedFetcher: Send + Sync + 'static {
    fn fetch(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<FeedSnapshot, FetchError>> + Send;
}

/// HTTP implementation of [`FeedFetcher`] backed by `reqwest`.
///
/// Every fetch is bounded by a fixed deadline (3 seconds by default) that
/// covers connecting, reading the body and nothing else; parsing happens
/// after the deadline.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        read_limited_bytes(response, MAX_FEED_SIZE).await
    }
}

impl FeedFetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<FeedSnapshot, FetchError> {
        let bytes = tokio::select! {
            biased;

            _ = cancel.cancelled() => return Err(FetchError::Cancelled),

            result = tokio::time::timeout(self.timeout, self.download(url)) => {
                result.map_err(|_| FetchError::Timeout(self.timeout))??
            }
        };

        let snapshot = parse_feed(url, &bytes).map_err(|e| FetchError::Parse(e.to_string()))?;
        tracing::debug!(
            url = %url,
            title = %snapshot.title,
            items = snapshot.items().len(),
            "Fetched feed"
        );
        Ok(snapshot)
    }
}

/// Builds the shared HTTP client used for every feed fetch.
///
/// The per-fetch deadline lives in [`HttpFetcher`]; the client only carries
/// connection pooling and the redirect policy.
pub fn build_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .redirect(redirect_policy())
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(30))
        .user_agent(concat!("feedpoll/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Follows at most 3 redirects and refuses loops.
fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= 3 {
            return attempt.error("Too many redirects (max 3)");
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev == url) {
            return attempt.error("Redirect loop detected");
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            "Following redirect"
        );
        attempt.follow()
    })
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
