//! Body sink collaborators
//!
//! A body sink receives the raw bytes of every fetched page, concurrently with
//! link extraction. Sinks are pluggable: the crawler only relies on the
//! [`BodySink`] contract.

use async_trait::async_trait;
use std::io;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Consumer of raw response bodies
///
/// Implementations must read `body` to exhaustion (or fail) and must return
/// promptly once `ctx` is cancelled.
///
/// An error of kind [`io::ErrorKind::BrokenPipe`] read from `body` means the
/// link extractor gave up on the page and the stream was closed under the
/// sink. Returning it as-is lets the fetcher recognise it and keep it out of
/// the reported error.
#[async_trait]
pub trait BodySink: Send + Sync {
    /// Consumes the body of the page at `page_url`
    async fn consume(
        &self,
        ctx: &CancellationToken,
        page_url: &Url,
        body: &mut (dyn AsyncRead + Send + Unpin),
    ) -> io::Result<()>;
}

/// Sink that logs each fetched page and throws its bytes away
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardSink;

#[async_trait]
impl BodySink for DiscardSink {
    async fn consume(
        &self,
        ctx: &CancellationToken,
        page_url: &Url,
        body: &mut (dyn AsyncRead + Send + Unpin),
    ) -> io::Result<()> {
        tracing::info!("fetched: {}", page_url);

        let mut discard = tokio::io::sink();
        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(io::Error::new(
                io::ErrorKind::Interrupted,
                "crawl canceled while discarding body",
            )),
            copied = tokio::io::copy(body, &mut discard) => {
                let bytes = copied?;
                tracing::trace!("discarded {} bytes from {}", bytes, page_url);
                Ok(())
            }
        }
    }
}
