use thiserror::Error;
use url::Url;

/// Errors that can occur while validating a subscription URL.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
    /// The raw text contains whitespace or control characters.
    #[error("URL must be a single token without whitespace or control characters")]
    NotSingleLine,
}

/// Validates a URL string before it is written to the subscription file.
///
/// The subscription file is line-delimited, so anything that would split or
/// pad a line is rejected before `url` gets a chance to normalize it away:
///
/// - whitespace and control characters anywhere in the raw text
/// - schemes other than `http` / `https`
/// - URLs without a host
///
/// Returns the parsed [`Url`] on success. Callers store the caller-supplied
/// text, not the normalized form, so `unsubscribe` can match it verbatim.
///
/// # Examples
///
/// ```
/// use feedpoll::util::validate_url;
///
/// assert!(validate_url("https://example.com/feed.xml").is_ok());
/// assert!(validate_url("file:///etc/passwd").is_err());
/// assert!(validate_url("https://example.com/a\nhttps://b").is_err());
/// ```
pub fn validate_url(url_str: &str) -> Result<Url, UrlValidationError> {
    if url_str
        .chars()
        .any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(UrlValidationError::NotSingleLine);
    }

    let url = Url::parse(url_str)?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(UrlValidationError::MissingHost),
    }
}
