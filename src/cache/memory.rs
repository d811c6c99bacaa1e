use crate::cache::Visitor;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

/// In-memory visited set guarded by a mutex
#[derive(Debug, Default)]
pub struct InMemoryCache {
    visited: Mutex<HashSet<String>>,
}

impl InMemoryCache {
    /// Creates an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of URLs visited so far
    pub fn len(&self) -> usize {
        self.visited
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns whether no URL has been visited yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Visitor for InMemoryCache {
    fn visit(&self, url: &str) -> bool {
        // The set only ever grows, so a poisoned lock still holds a valid set.
        let mut visited = self.visited.lock().unwrap_or_else(PoisonError::into_inner);
        !visited.insert(url.to_string())
    }
}
