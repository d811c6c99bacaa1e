//! URL handling module
//!
//! This module provides base-URL validation, link resolution and
//! normalization, and the prefix-based crawl scope check.

mod normalize;

use crate::{UrlError, UrlResult};
use url::Url;

pub use normalize::{normalize, resolve_link};

/// Validates a crawl base URL
///
/// The URL must parse, use the `http` or `https` scheme, and carry a host.
///
/// # Examples
///
/// ```
/// use site_crawl::url::validate_base_url;
///
/// assert!(validate_base_url("https://example.com/docs/").is_ok());
/// assert!(validate_base_url("example.com").is_err());
/// assert!(validate_base_url("file:///tmp/index.html").is_err());
/// ```
pub fn validate_base_url(raw: &str) -> UrlResult<Url> {
    let url = Url::parse(raw)?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(UrlError::MissingHost),
    }
}

/// Returns true if a normalized URL falls inside the crawl scope
///
/// The scope is the base URL string exactly as given; the check is a plain
/// string prefix match.
pub fn in_scope(normalized: &str, scope: &str) -> bool {
    normalized.starts_with(scope)
}
