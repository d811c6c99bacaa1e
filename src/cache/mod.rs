//! Visited cache for crawl deduplication
//!
//! The cache is the single source of truth for "already scheduled". A URL
//! moves from absent to present exactly once per crawl and is never evicted.

mod memory;

pub use memory::InMemoryCache;

/// Records which normalized URLs have been seen
///
/// Implementations must perform the check-and-set as one atomic step: two
/// concurrent calls for the same URL must never both return `false`.
pub trait Visitor: Send + Sync {
    /// Marks `url` as visited
    ///
    /// Returns `true` if the URL had already been visited (the call is a
    /// no-op), or `false` if this call is the one that marked it.
    fn visit(&self, url: &str) -> bool;
}
