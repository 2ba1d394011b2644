//! Query Cache Statistics Module
//!
//! Tracks query cache hits, misses, writes and disabled-state bypasses.

use serde::Serialize;

// == Query Cache Stats ==
/// Counters for one [`super::QueryCache`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryCacheStats {
    /// Lookups that returned a cached result
    pub hits: u64,
    /// Lookups that found nothing usable
    pub misses: u64,
    /// Results successfully stored
    pub writes: u64,
    /// Reads and writes skipped because the cache was disabled
    pub bypassed: u64,
}

impl QueryCacheStats {
    // == Constructor ==
    /// Creates a new QueryCacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    /// Bypassed calls are not lookups.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub(crate) fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub(crate) fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub(crate) fn record_write(&mut self) {
        self.writes += 1;
    }

    pub(crate) fn record_bypass(&mut self) {
        self.bypassed += 1;
    }
}
