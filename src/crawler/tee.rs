//! Dual-consumer body streaming
//!
//! One network body is pumped into two bounded channels, each exposed to its
//! consumer as an `AsyncRead`. The pump only advances as fast as the slower
//! live consumer reads, so neither side buffers the whole body. A consumer
//! that drops its reader is simply skipped from then on.
//!
//! When the link extractor fails, the sink's stream is ended with a
//! [`io::ErrorKind::BrokenPipe`] error instead of a clean EOF so the sink
//! cannot mistake a truncated body for a complete one.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::io;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

/// Reader half handed to one consumer of a teed body
pub type TeeReader = StreamReader<ReceiverStream<io::Result<Bytes>>, Bytes>;

/// Creates a tee with `buffer` chunks of capacity per consumer
///
/// Returns the pump and the readers for the parser and the sink.
pub fn tee(buffer: usize) -> (Tee, TeeReader, TeeReader) {
    let (parser_tx, parser_rx) = mpsc::channel(buffer);
    let (sink_tx, sink_rx) = mpsc::channel(buffer);

    let tee = Tee {
        parser: Some(parser_tx),
        sink: Some(sink_tx),
    };

    (
        tee,
        StreamReader::new(ReceiverStream::new(parser_rx)),
        StreamReader::new(ReceiverStream::new(sink_rx)),
    )
}

/// Writing side of a tee
#[derive(Debug)]
pub struct Tee {
    parser: Option<mpsc::Sender<io::Result<Bytes>>>,
    sink: Option<mpsc::Sender<io::Result<Bytes>>>,
}

enum Step {
    Chunk(Bytes),
    Failed(String),
    Done,
    Cancelled,
    ParserStopped,
}

impl Tee {
    /// Copies `body` into both readers until it ends or a stop condition hits
    ///
    /// Stops early when `ctx` is cancelled, when `parser_stopped` fires, or when
    /// both readers have been dropped. Dropping the tee closes both readers.
    pub async fn pump<S, E>(
        mut self,
        mut body: S,
        ctx: &CancellationToken,
        parser_stopped: &CancellationToken,
    ) where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: std::fmt::Display,
    {
        loop {
            let step = tokio::select! {
                biased;
                _ = ctx.cancelled() => Step::Cancelled,
                _ = parser_stopped.cancelled() => Step::ParserStopped,
                next = body.next() => match next {
                    Some(Ok(chunk)) => Step::Chunk(chunk),
                    Some(Err(e)) => Step::Failed(e.to_string()),
                    None => Step::Done,
                },
            };

            match step {
                Step::Chunk(chunk) => {
                    tracing::trace!("teeing {} bytes", chunk.len());
                    if !self.deliver(chunk, ctx).await {
                        break;
                    }
                }
                Step::Done => break,
                Step::Failed(message) => {
                    let reason = format!("error reading response body: {}", message);
                    self.fail_all(&reason, ctx).await;
                    break;
                }
                Step::Cancelled => {
                    self.interrupt_all();
                    break;
                }
                Step::ParserStopped => {
                    self.parser = None;
                    self.close_sink(ctx).await;
                    break;
                }
            }
        }
    }

    /// Sends one chunk to every live reader
    ///
    /// Returns false once there is nobody left to deliver to.
    async fn deliver(&mut self, chunk: Bytes, ctx: &CancellationToken) -> bool {
        for slot in [&mut self.parser, &mut self.sink] {
            let Some(tx) = slot.as_ref() else {
                continue;
            };

            let sent = tokio::select! {
                biased;
                _ = ctx.cancelled() => return true,
                sent = tx.send(Ok(chunk.clone())) => sent,
            };

            if sent.is_err() {
                // Reader dropped; its consumer is finished with the body
                *slot = None;
            }
        }

        self.parser.is_some() || self.sink.is_some()
    }

    /// Ends the sink's stream with a closed-pipe error
    async fn close_sink(&mut self, ctx: &CancellationToken) {
        let Some(tx) = self.sink.take() else {
            return;
        };

        let closed = io::Error::new(
            io::ErrorKind::BrokenPipe,
            "stream closed: link extractor stopped reading",
        );

        tokio::select! {
            biased;
            _ = ctx.cancelled() => {}
            _ = tx.send(Err(closed)) => {}
        }
    }

    /// Ends every live reader's stream with a body read error
    ///
    /// The error waits behind any chunks still queued, so a lagging consumer
    /// sees it after the partial body instead of a clean EOF.
    async fn fail_all(&mut self, reason: &str, ctx: &CancellationToken) {
        for slot in [&mut self.parser, &mut self.sink] {
            let Some(tx) = slot.take() else {
                continue;
            };

            let failed = io::Error::other(reason.to_string());
            tokio::select! {
                biased;
                _ = ctx.cancelled() => return,
                // A reader dropped meanwhile has nothing left to be told
                _ = tx.send(Err(failed)) => {}
            }
        }
    }

    /// Best-effort interruption of every live reader without waiting
    ///
    /// The fetch reports the cancellation itself, whatever the readers saw.
    fn interrupt_all(&mut self) {
        for slot in [&mut self.parser, &mut self.sink] {
            if let Some(tx) = slot.take() {
                let interrupted = io::Error::new(io::ErrorKind::Interrupted, "crawl canceled");
                let _ = tx.try_send(Err(interrupted));
            }
        }
    }
}
