//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with the body streamed to two consumers
//! - HTML parsing and link extraction
//! - Recursive fan-out scheduling with completion tracking
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod parser;
mod scheduler;
mod tee;

pub use coordinator::{run_crawl, Crawler};
pub use fetcher::{build_http_client, Fetch, Fetcher, DEFAULT_STREAM_BUFFER};
pub use parser::{HtmlLinkParser, LinkParser};
pub use scheduler::{
    CrawlSummary, ErrorHandler, LogErrors, PendingCount, PendingGuard, Scheduler,
};
pub use tee::{tee, Tee, TeeReader};
