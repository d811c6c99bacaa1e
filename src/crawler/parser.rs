//! HTML link extractor
//!
//! This module reads an HTML document from a byte stream and extracts the
//! links the crawl should follow next:
//! - Links come from `<a href>` and `<area href>` elements
//! - Each link is resolved against the document URL and stripped of its fragment
//! - Only links starting with the crawl scope prefix are kept
//! - Only links the visited cache has not seen before are reported

use crate::cache::Visitor;
use crate::url::{in_scope, normalize, resolve_link};
use crate::ParseError;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use html5ever::tendril::{ByteTendril, TendrilSink};
use scraper::{Html, Selector};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use url::Url;

/// Selector for anchor-type elements carrying a link
const ANCHOR_SELECTOR: &str = "a[href], area[href]";

/// Bytes requested from the body per read
const READ_CHUNK: usize = 8 * 1024;

/// Chunks queued between the body reader and the tree builder
const PENDING_CHUNKS: usize = 8;

/// Input handed to the tree builder
enum Feed {
    Chunk(Bytes),
    End,
}

/// Parses a response body for links to follow
#[async_trait]
pub trait LinkParser: Send + Sync {
    /// Reads `body` and returns the newly discovered absolute URLs
    ///
    /// `page_url` is the final URL of the response and serves as the base for
    /// relative links. On error no links are reported for the document.
    async fn parse_body(
        &self,
        page_url: &Url,
        body: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<Vec<String>, ParseError>;
}

/// Link extractor for HTML documents
///
/// Only links having the scope prefix are returned, and each one is recorded
/// in the visited cache at the moment of discovery.
///
/// # Example
///
/// ```
/// use site_crawl::cache::InMemoryCache;
/// use site_crawl::crawler::HtmlLinkParser;
/// use std::sync::Arc;
/// use url::Url;
///
/// let parser = HtmlLinkParser::new("http://base.org", Arc::new(InMemoryCache::new()));
/// let page_url = Url::parse("http://base.org/c/").unwrap();
/// let links = parser.extract_links(r#"<a href="d">D</a><a href="http://x.org/">X</a>"#, &page_url);
/// assert_eq!(links, vec!["http://base.org/c/d".to_string()]);
/// ```
#[derive(Clone)]
pub struct HtmlLinkParser {
    scope: String,
    visited: Arc<dyn Visitor>,
}

impl HtmlLinkParser {
    /// Creates a parser scoped to `scope`, recording discoveries in `visited`
    pub fn new(scope: impl Into<String>, visited: Arc<dyn Visitor>) -> Self {
        Self {
            scope: scope.into(),
            visited,
        }
    }

    /// Returns the scope prefix links must start with
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Extracts new in-scope links from an HTML document, in document order
    pub fn extract_links(&self, html: &str, page_url: &Url) -> Vec<String> {
        self.collect_links(&Html::parse_document(html), page_url)
    }

    fn collect_links(&self, document: &Html, page_url: &Url) -> Vec<String> {
        let mut links = Vec::new();

        let selector = match Selector::parse(ANCHOR_SELECTOR) {
            Ok(selector) => selector,
            Err(e) => {
                tracing::error!("invalid anchor selector: {:?}", e);
                return links;
            }
        };

        // select() walks the tree depth-first in document order
        for element in document.select(&selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };

            let Some(resolved) = resolve_link(href, page_url) else {
                tracing::trace!("skipping unresolvable link {:?} on {}", href, page_url);
                continue;
            };

            let normalized = normalize(&resolved);
            if !in_scope(&normalized, &self.scope) {
                continue;
            }

            if self.visited.visit(&normalized) {
                continue;
            }

            links.push(normalized);
        }

        links
    }

    /// Builds the document from `chunks` as they arrive
    ///
    /// Runs on a blocking thread, which owns the (non-`Send`) tree. Links are
    /// only extracted once [`Feed::End`] arrives; a feed that stops short of
    /// it yields `None` and leaves the visited cache untouched.
    fn build_and_extract(&self, mut chunks: mpsc::Receiver<Feed>, page_url: &Url) -> Option<Vec<String>> {
        let mut builder =
            html5ever::parse_document(Html::new_document(), Default::default()).from_utf8();

        while let Some(feed) = chunks.blocking_recv() {
            match feed {
                Feed::Chunk(chunk) => builder.process(ByteTendril::from_slice(&chunk)),
                Feed::End => return Some(self.collect_links(&builder.finish(), page_url)),
            }
        }

        None
    }
}

impl std::fmt::Debug for HtmlLinkParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HtmlLinkParser")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LinkParser for HtmlLinkParser {
    async fn parse_body(
        &self,
        page_url: &Url,
        body: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<Vec<String>, ParseError> {
        let (tx, rx) = mpsc::channel(PENDING_CHUNKS);
        let extractor = self.clone();
        let base = page_url.clone();
        let builder = tokio::task::spawn_blocking(move || extractor.build_and_extract(rx, &base));

        let fed = feed_document(body, &tx).await;
        if fed.is_ok() {
            let _ = tx.send(Feed::End).await;
        }
        drop(tx);

        let links = builder
            .await
            .map_err(|e| ParseError::Malformed(format!("document builder failed: {}", e)))?;

        fed?;
        links.ok_or_else(|| ParseError::Malformed("document builder stopped early".to_string()))
    }
}

/// Streams `body` to the tree builder chunk by chunk
async fn feed_document(
    body: &mut (dyn AsyncRead + Send + Unpin),
    tx: &mpsc::Sender<Feed>,
) -> Result<(), ParseError> {
    loop {
        let mut chunk = BytesMut::with_capacity(READ_CHUNK);
        if body.read_buf(&mut chunk).await? == 0 {
            return Ok(());
        }

        if tx.send(Feed::Chunk(chunk.freeze())).await.is_err() {
            // The builder is gone; its join result carries the reason
            return Ok(());
        }
    }
}
