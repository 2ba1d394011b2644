//! Query result cache over any [`Cache`] backend.

use serde_json::Value;
use tracing::debug;

use crate::cache::Cache;
use crate::config::Config;
use crate::query::key::{query_key, Query};
use crate::query::stats::QueryCacheStats;

// == Query Cache ==
/// Decorator mapping queries to cache keys on a backend.
///
/// Two states, enabled and disabled. While disabled, reads miss and writes are
/// skipped, but `delete` and `clear` still reach the backend. Toggling never
/// touches stored data.
#[derive(Debug)]
pub struct QueryCache<C: Cache> {
    backend: C,
    enabled: bool,
    /// TTL for [`QueryCache::set`], None = indefinite
    default_ttl: Option<u64>,
    stats: QueryCacheStats,
}

impl<C: Cache> QueryCache<C> {
    // == Constructor ==
    /// Creates an enabled query cache with no default TTL.
    pub fn new(backend: C) -> Self {
        Self {
            backend,
            enabled: true,
            default_ttl: None,
            stats: QueryCacheStats::new(),
        }
    }

    /// Creates a query cache with the enabled flag and default TTL from `config`.
    pub fn from_config(backend: C, config: &Config) -> Self {
        let mut cache = Self::new(backend).with_default_ttl(config.query_default_ttl);
        cache.enabled = config.query_cache_enabled;
        cache
    }

    pub fn with_default_ttl(mut self, ttl: Option<u64>) -> Self {
        self.default_ttl = ttl;
        self
    }

    // == State ==
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn default_ttl(&self) -> Option<u64> {
        self.default_ttl
    }

    pub fn set_default_ttl(&mut self, ttl: Option<u64>) {
        self.default_ttl = ttl;
    }

    /// Cache key `query` is stored under.
    pub fn key_for<Q: Query + ?Sized>(&self, query: &Q) -> String {
        query_key(query)
    }

    // == Get ==
    /// Returns the cached result, or None on a miss or while disabled.
    pub fn get<Q: Query + ?Sized>(&mut self, query: &Q) -> Option<Value> {
        if !self.enabled {
            self.stats.record_bypass();
            return None;
        }

        let key = query_key(query);
        let value = self.backend.lookup(&key);
        if value.is_some() {
            debug!(key = %key, "Query cache HIT");
            self.stats.record_hit();
        } else {
            debug!(key = %key, "Query cache MISS");
            self.stats.record_miss();
        }
        value
    }

    /// True when a result is cached for `query`; always false while disabled.
    pub fn has<Q: Query + ?Sized>(&mut self, query: &Q) -> bool {
        if !self.enabled {
            return false;
        }
        self.backend.has(&query_key(query))
    }

    // == Set ==
    /// Stores a result under the default TTL.
    pub fn set<Q: Query + ?Sized>(&mut self, query: &Q, value: Value) -> bool {
        self.set_with_ttl(query, value, self.default_ttl)
    }

    /// Stores a result with an explicit TTL (None = indefinite).
    ///
    /// A no-op returning false while disabled.
    pub fn set_with_ttl<Q: Query + ?Sized>(
        &mut self,
        query: &Q,
        value: Value,
        ttl: Option<u64>,
    ) -> bool {
        if !self.enabled {
            self.stats.record_bypass();
            return false;
        }

        let stored = self.backend.set(&query_key(query), value, ttl);
        if stored {
            self.stats.record_write();
        }
        stored
    }

    // == Remember ==
    /// Returns the cached result, or computes, stores and returns it.
    ///
    /// Errors from `compute` propagate; failing to store the computed value
    /// does not.
    pub fn remember<Q, F, E>(&mut self, query: &Q, compute: F) -> Result<Value, E>
    where
        Q: Query + ?Sized,
        F: FnOnce() -> Result<Value, E>,
    {
        if let Some(value) = self.get(query) {
            return Ok(value);
        }

        let value = compute()?;
        self.set(query, value.clone());
        Ok(value)
    }

    // == Delete / Clear ==
    /// Removes the cached result for `query`, enabled or not.
    pub fn delete<Q: Query + ?Sized>(&mut self, query: &Q) -> bool {
        self.backend.delete(&query_key(query))
    }

    /// Clears the whole backend namespace, enabled or not.
    pub fn clear(&mut self) -> bool {
        self.backend.clear()
    }

    // == Accessors ==
    pub fn stats(&self) -> &QueryCacheStats {
        &self.stats
    }

    pub fn backend(&self) -> &C {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut C {
        &mut self.backend
    }

    pub fn into_inner(self) -> C {
        self.backend
    }
}
