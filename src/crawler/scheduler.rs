//! Recursive scheduler for fan-out crawling
//!
//! This module handles:
//! - Spawning one task per accepted URL, with no cap on concurrency
//! - Tracking outstanding tasks through a pending counter
//! - Blocking the caller until the counter drains to zero
//! - Routing task errors to an error handler without stopping other tasks

use crate::cache::Visitor;
use crate::crawler::fetcher::Fetch;
use crate::url::normalize;
use crate::CrawlError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Receives the error of every failed fetch task
///
/// Handlers are called from the failing task itself and must return quickly.
pub trait ErrorHandler: Send + Sync {
    /// Handles the error of one task
    fn handle(&self, err: CrawlError);
}

impl<F> ErrorHandler for F
where
    F: Fn(CrawlError) + Send + Sync,
{
    fn handle(&self, err: CrawlError) {
        self(err)
    }
}

/// Error handler that logs every task error as a warning
#[derive(Debug, Clone, Copy, Default)]
pub struct LogErrors;

impl ErrorHandler for LogErrors {
    fn handle(&self, err: CrawlError) {
        if err.is_cancelled() {
            tracing::debug!("fetcher error: {}", err);
        } else {
            tracing::warn!("fetcher error: {}", err);
        }
    }
}

/// Counter of outstanding fetch tasks
///
/// Slots are taken with [`PendingCount::enter`] and released when the returned
/// guard is dropped, so a task that panics still gives its slot back.
#[derive(Debug, Default)]
pub struct PendingCount {
    count: AtomicUsize,
    drained: Notify,
}

impl PendingCount {
    /// Creates a counter with no pending tasks
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one more pending task
    pub fn enter(self: &Arc<Self>) -> PendingGuard {
        self.count.fetch_add(1, Ordering::AcqRel);
        PendingGuard {
            pending: Arc::clone(self),
        }
    }

    /// Returns the number of pending tasks
    pub fn get(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Waits until no task is pending
    pub async fn wait(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent drain cannot be missed
            notified.as_mut().enable();

            if self.get() == 0 {
                return;
            }

            notified.await;
        }
    }

    fn leave(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.drained.notify_waiters();
        }
    }
}

/// Slot of one pending task; releases it on drop
#[derive(Debug)]
pub struct PendingGuard {
    pending: Arc<PendingCount>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending.leave();
    }
}

/// Totals for one crawl run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    /// Pages fetched without error
    pub fetched: usize,

    /// Tasks that ended with an error
    pub failed: usize,
}

impl CrawlSummary {
    /// Total number of tasks run
    pub fn total(&self) -> usize {
        self.fetched + self.failed
    }
}

#[derive(Default)]
struct Counters {
    fetched: AtomicUsize,
    failed: AtomicUsize,
}

/// State shared by every task of one crawl run
struct Shared<F> {
    fetcher: Arc<F>,
    error_handler: Option<Arc<dyn ErrorHandler>>,
    pending: Arc<PendingCount>,
    counters: Counters,
}

/// Scheduler fanning out one concurrent fetch per discovered URL
///
/// Every scheduler owns its own pending counter, so independent crawls can run
/// side by side.
pub struct Scheduler<F> {
    fetcher: Arc<F>,
    visited: Arc<dyn Visitor>,
    error_handler: Option<Arc<dyn ErrorHandler>>,
    pending: Arc<PendingCount>,
}

impl<F> Scheduler<F>
where
    F: Fetch + 'static,
{
    /// Creates a scheduler using `fetcher` and sharing `visited` with it
    ///
    /// The base URL is recorded in `visited` when the crawl starts, so it must
    /// be the same cache the link parser consults.
    pub fn new(fetcher: F, visited: Arc<dyn Visitor>) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            visited,
            error_handler: None,
            pending: Arc::new(PendingCount::new()),
        }
    }

    /// Sets the handler receiving task errors
    pub fn with_error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = Some(handler);
        self
    }

    /// Number of tasks currently pending
    pub fn pending(&self) -> usize {
        self.pending.get()
    }

    /// Crawls from `base_url` until every discovered page has been fetched
    ///
    /// Returns once the pending counter drains to zero. Cancelling `ctx` makes
    /// in-flight fetches fail fast, but this still waits for every spawned
    /// task to finish. The summary covers this run only.
    pub async fn start(&self, ctx: CancellationToken, base_url: &str) -> CrawlSummary {
        if let Ok(base) = Url::parse(base_url) {
            self.visited.visit(&normalize(&base));
        }

        tracing::info!("starting crawl at {}", base_url);

        let shared = Arc::new(Shared {
            fetcher: Arc::clone(&self.fetcher),
            error_handler: self.error_handler.clone(),
            pending: Arc::clone(&self.pending),
            counters: Counters::default(),
        });

        let guard = shared.pending.enter();
        spawn_task(Arc::clone(&shared), ctx, base_url.to_string(), guard);

        shared.pending.wait().await;

        let summary = CrawlSummary {
            fetched: shared.counters.fetched.load(Ordering::Acquire),
            failed: shared.counters.failed.load(Ordering::Acquire),
        };

        tracing::info!(
            "crawl finished: {} pages fetched, {} failed",
            summary.fetched,
            summary.failed
        );

        summary
    }
}

/// Spawns the fetch task for `url`, which owns `guard` until it completes
fn spawn_task<F>(shared: Arc<Shared<F>>, ctx: CancellationToken, url: String, guard: PendingGuard)
where
    F: Fetch + 'static,
{
    tokio::spawn(async move {
        let links = match shared.fetcher.fetch(&ctx, &url).await {
            Ok(links) => {
                shared.counters.fetched.fetch_add(1, Ordering::AcqRel);
                links
            }
            Err(err) => {
                shared.counters.failed.fetch_add(1, Ordering::AcqRel);
                if let Some(handler) = &shared.error_handler {
                    handler.handle(err);
                }
                Vec::new()
            }
        };

        tracing::debug!("{} led to {} new links", url, links.len());

        for link in links {
            // Take the child's slot before this task's own slot is released
            let child = shared.pending.enter();
            spawn_task(Arc::clone(&shared), ctx.clone(), link, child);
        }

        drop(guard);
    });
}
