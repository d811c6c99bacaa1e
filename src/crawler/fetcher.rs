//! HTTP fetcher implementation
//!
//! This module handles the single request made for every crawled page:
//! - Building the HTTP client from configuration
//! - Issuing the GET request under the crawl's cancellation token
//! - Streaming the response body to the link extractor and, if configured,
//!   to a body sink at the same time
//! - Combining the errors of both consumers into one task error

use crate::config::Config;
use crate::crawler::parser::LinkParser;
use crate::crawler::tee::tee;
use crate::sink::BodySink;
use crate::{CrawlError, ParseError};
use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::{Client, Response};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Default number of body chunks buffered per consumer
pub const DEFAULT_STREAM_BUFFER: usize = 16;

/// Fetches a page and returns the links it leads to
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Fetches `url` under `ctx` and returns the newly discovered URLs
    async fn fetch(&self, ctx: &CancellationToken, url: &str) -> Result<Vec<String>, CrawlError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The crawl configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use site_crawl::config::Config;
/// use site_crawl::crawler::build_http_client;
///
/// let client = build_http_client(&Config::default()).unwrap();
/// ```
pub fn build_http_client(config: &Config) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.header_value())
        .timeout(Duration::from_secs(config.crawler.request_timeout))
        .connect_timeout(Duration::from_secs(config.crawler.connect_timeout))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetcher streaming each response to a link parser and an optional sink
pub struct Fetcher {
    client: Client,
    parser: Arc<dyn LinkParser>,
    sink: Option<Arc<dyn BodySink>>,
    stream_buffer: usize,
}

impl Fetcher {
    /// Creates a fetcher that only extracts links
    pub fn new(client: Client, parser: Arc<dyn LinkParser>) -> Self {
        Self {
            client,
            parser,
            sink: None,
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }

    /// Sets the sink receiving every response body
    pub fn with_sink(mut self, sink: Arc<dyn BodySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Sets how many chunks each consumer may lag behind the network
    pub fn with_stream_buffer(mut self, chunks: usize) -> Self {
        self.stream_buffer = chunks.max(1);
        self
    }

    /// Parses the body directly from the network stream
    async fn parse_only(&self, response: Response, page_url: &Url) -> Result<Vec<String>, CrawlError> {
        let stream = Box::pin(response.bytes_stream().map_err(io::Error::other));
        let mut body = StreamReader::new(stream);

        self.parser
            .parse_body(page_url, &mut body)
            .await
            .map_err(CrawlError::Parse)
    }

    /// Tees the body to the parser and the sink and runs both concurrently
    async fn parse_and_consume(
        &self,
        ctx: &CancellationToken,
        response: Response,
        page_url: &Url,
        sink: &dyn BodySink,
    ) -> Result<Vec<String>, CrawlError> {
        let (tee, mut parser_body, mut sink_body) = tee(self.stream_buffer);
        let parser_stopped = CancellationToken::new();
        let network = Box::pin(response.bytes_stream());

        let parser = &self.parser;
        let stopped = &parser_stopped;

        // Each reader moves into its consumer and is dropped as soon as that
        // consumer finishes, which lets the pump skip it from then on.
        let parse = async move {
            let parsed = parser.parse_body(page_url, &mut parser_body).await;
            if parsed.is_err() {
                stopped.cancel();
            }
            parsed
        };

        let consume = async move { sink.consume(ctx, page_url, &mut sink_body).await };

        let ((), parsed, consumed) =
            tokio::join!(tee.pump(network, ctx, &parser_stopped), parse, consume);

        if ctx.is_cancelled() {
            return Err(CrawlError::Cancelled {
                url: page_url.to_string(),
            });
        }

        combine_results(parsed, consumed)
    }
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("client", &self.client)
            .field("has_sink", &self.sink.is_some())
            .field("stream_buffer", &self.stream_buffer)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Fetch for Fetcher {
    async fn fetch(&self, ctx: &CancellationToken, url: &str) -> Result<Vec<String>, CrawlError> {
        let target = Url::parse(url).map_err(|source| CrawlError::Request {
            url: url.to_string(),
            source,
        })?;

        tracing::debug!("fetching {}", target);

        let response = tokio::select! {
            biased;
            _ = ctx.cancelled() => {
                return Err(CrawlError::Cancelled { url: url.to_string() });
            }
            sent = self.client.get(target).send() => sent.map_err(|source| CrawlError::Transport {
                url: url.to_string(),
                source,
            })?,
        };

        // Relative links resolve against the final URL after redirects
        let page_url = response.url().clone();
        let status = response.status();
        if status.is_success() {
            tracing::debug!("{} responded {}", page_url, status);
        } else {
            tracing::warn!("{} responded {}, parsing body anyway", page_url, status);
        }

        match &self.sink {
            None => tokio::select! {
                biased;
                _ = ctx.cancelled() => Err(CrawlError::Cancelled { url: url.to_string() }),
                parsed = self.parse_only(response, &page_url) => parsed,
            },
            Some(sink) => {
                self.parse_and_consume(ctx, response, &page_url, sink.as_ref())
                    .await
            }
        }
    }
}

/// Merges the outcomes of the link parser and the body sink
///
/// A closed-pipe error from the sink after the parser failed is an artifact of
/// the parser's stream being torn down, not a sink failure, and is dropped.
/// A closed-pipe error while the parser succeeded is the sink's own.
fn combine_results(
    parsed: Result<Vec<String>, ParseError>,
    consumed: io::Result<()>,
) -> Result<Vec<String>, CrawlError> {
    match (parsed, consumed) {
        (Ok(links), Ok(())) => Ok(links),
        (Ok(_), Err(body)) => Err(CrawlError::BodyRead(body)),
        (Err(parse), Ok(())) => Err(CrawlError::Parse(parse)),
        (Err(parse), Err(body)) if body.kind() == io::ErrorKind::BrokenPipe => {
            Err(CrawlError::Parse(parse))
        }
        (Err(parse), Err(body)) => Err(CrawlError::ParseAndBodyRead { parse, body }),
    }
}
