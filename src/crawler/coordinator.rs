//! Crawl coordinator
//!
//! Wires the pieces of one crawl together: configuration, HTTP client,
//! visited cache, link parser, body sink, error handler and scheduler.

use crate::cache::{InMemoryCache, Visitor};
use crate::config::Config;
use crate::crawler::fetcher::{build_http_client, Fetcher};
use crate::crawler::parser::HtmlLinkParser;
use crate::crawler::scheduler::{CrawlSummary, ErrorHandler, LogErrors, Scheduler};
use crate::sink::{BodySink, DiscardSink};
use crate::url::validate_base_url;
use crate::SetupError;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One configured crawl over a base URL
pub struct Crawler {
    base_url: String,
    visited: Arc<InMemoryCache>,
    scheduler: Scheduler<Fetcher>,
}

impl Crawler {
    /// Creates a crawler for `base_url`
    ///
    /// The base URL doubles as the crawl scope: only links starting with it
    /// are followed.
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `base_url` - Where to start, validated with [`validate_base_url`]
    /// * `sink` - Optional consumer of every fetched body
    /// * `error_handler` - Receives the error of every failed page
    ///
    /// # Returns
    ///
    /// * `Ok(Crawler)` - Ready to run
    /// * `Err(SetupError)` - Invalid base URL or HTTP client failure
    pub fn new(
        config: &Config,
        base_url: &str,
        sink: Option<Arc<dyn BodySink>>,
        error_handler: Arc<dyn ErrorHandler>,
    ) -> Result<Self, SetupError> {
        validate_base_url(base_url)?;

        let client = build_http_client(config)?;
        let visited = Arc::new(InMemoryCache::new());
        let shared_visited: Arc<dyn Visitor> = visited.clone();

        let parser = Arc::new(HtmlLinkParser::new(base_url, Arc::clone(&shared_visited)));
        let mut fetcher =
            Fetcher::new(client, parser).with_stream_buffer(config.crawler.stream_buffer);
        if let Some(sink) = sink {
            fetcher = fetcher.with_sink(sink);
        }

        let scheduler = Scheduler::new(fetcher, shared_visited).with_error_handler(error_handler);

        Ok(Self {
            base_url: base_url.to_string(),
            visited,
            scheduler,
        })
    }

    /// Returns the base URL this crawler starts from
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Number of distinct URLs scheduled so far
    pub fn visited(&self) -> usize {
        self.visited.len()
    }

    /// Runs the crawl until it drains or `ctx` is cancelled and drained
    pub async fn run(&self, ctx: CancellationToken) -> CrawlSummary {
        self.scheduler.start(ctx, &self.base_url).await
    }
}

/// Runs a complete crawl with the default collaborators
///
/// Bodies are discarded through [`DiscardSink`] and task errors are logged
/// through [`LogErrors`].
///
/// # Example
///
/// ```no_run
/// use site_crawl::config::Config;
/// use site_crawl::crawler::run_crawl;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let summary = run_crawl(&Config::default(), "https://example.com/", CancellationToken::new()).await?;
/// println!("{} pages", summary.fetched);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(
    config: &Config,
    base_url: &str,
    ctx: CancellationToken,
) -> Result<CrawlSummary, SetupError> {
    let crawler = Crawler::new(
        config,
        base_url,
        Some(Arc::new(DiscardSink)),
        Arc::new(LogErrors),
    )?;

    Ok(crawler.run(ctx).await)
}
