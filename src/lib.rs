//! Site-Crawl: a recursive, prefix-scoped web crawler
//!
//! This crate crawls a website starting from a base URL, following only links
//! whose normalized form starts with that base URL. Every discovered page is
//! fetched exactly once, and its body is streamed concurrently to a link
//! extractor and an optional body sink.

pub mod cache;
pub mod config;
pub mod crawler;
pub mod sink;
pub mod url;

use thiserror::Error;

/// Failure of a single fetch task
///
/// These errors never abort the crawl. Each one is handed to the configured
/// error handler and the failing page is treated as a dead end.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("error creating request for {url}: {source}")]
    Request {
        url: String,
        source: ::url::ParseError,
    },

    #[error("error performing request for {url}: {source}")]
    Transport { url: String, source: reqwest::Error },

    #[error("request for {url} canceled: crawl context canceled")]
    Cancelled { url: String },

    #[error("parsing error: {0}")]
    Parse(#[source] ParseError),

    #[error("body read error: {0}")]
    BodyRead(#[source] std::io::Error),

    #[error("parsing error: {parse} and body read error: {body}")]
    ParseAndBodyRead {
        parse: ParseError,
        body: std::io::Error,
    },
}

impl CrawlError {
    /// Returns true if the task failed because the crawl was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Link extraction errors
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read document: {0}")]
    Read(#[from] std::io::Error),

    #[error("malformed document: {0}")]
    Malformed(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("invalid URL: {0}")]
    Parse(#[from] ::url::ParseError),

    #[error("unsupported URL scheme: {0}")]
    InvalidScheme(String),

    #[error("URL host is required")]
    MissingHost,
}

/// Errors raised while assembling a crawl
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Result type alias for crawl setup operations
pub type Result<T> = std::result::Result<T, SetupError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use cache::{InMemoryCache, Visitor};
pub use config::Config;
pub use crawler::{run_crawl, CrawlSummary, Crawler, Fetch, Fetcher, Scheduler};
pub use sink::{BodySink, DiscardSink};
