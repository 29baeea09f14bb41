//! Utility functions shared by the command layer and the output sinks.
//!
//! - **URL validation**: keeps the line-delimited subscription file well formed
//! - **Text sanitizing**: turns feed-supplied titles and links into one clean line
//!
//! # Examples
//!
//! ```
//! use feedpoll::util::{sanitize_line, validate_url};
//!
//! let url = validate_url("https://example.com/feed.xml").unwrap();
//! assert_eq!(url.host_str(), Some("example.com"));
//!
//! assert_eq!(sanitize_line("Breaking\nnews"), "Breaking news");
//! ```

mod text;
mod url_validator;

pub use text::sanitize_line;
pub use url_validator::{validate_url, UrlValidationError};
