//! Cache Entry Module
//!
//! Defines the logical unit stored by every backend, with lazy TTL support.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// == Cache Entry ==
/// A single cache entry: key, value and optional absolute expiration.
///
/// This is also the on-disk shape used by the file backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The key the entry was stored under
    pub key: String,
    /// The stored value
    pub value: Value,
    /// Expiration timestamp (Unix seconds), None = no expiration
    pub expiration: Option<i64>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry that expires `ttl_seconds` after `now`.
    ///
    /// # Arguments
    /// * `key` - The key to store under
    /// * `value` - The value to store
    /// * `ttl_seconds` - Optional TTL in seconds
    /// * `now` - Current Unix timestamp in seconds
    pub fn new(key: impl Into<String>, value: Value, ttl_seconds: Option<u64>, now: i64) -> Self {
        Self {
            key: key.into(),
            value,
            expiration: expiration_from_ttl(ttl_seconds, now),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// Boundary condition: an entry is expired once `now >= expiration`.
    pub fn is_expired(&self, now: i64) -> bool {
        is_expired_at(self.expiration, now)
    }

    // == Time To Live ==
    /// Returns remaining TTL in seconds, or None if no expiration is set.
    ///
    /// # Returns
    /// - `Some(0)` if the entry has expired
    /// - `Some(remaining)` if the entry has TTL and hasn't expired
    /// - `None` if the entry never expires
    pub fn ttl_remaining(&self, now: i64) -> Option<u64> {
        self.expiration
            .map(|expires| u64::try_from(expires.saturating_sub(now)).unwrap_or(0))
    }
}

// == Utility Functions ==
/// Converts a relative TTL into an absolute expiration timestamp.
pub fn expiration_from_ttl(ttl_seconds: Option<u64>, now: i64) -> Option<i64> {
    ttl_seconds.map(|ttl| now.saturating_add(i64::try_from(ttl).unwrap_or(i64::MAX)))
}

/// Returns true when `expiration` is set and `now` has reached it.
pub fn is_expired_at(expiration: Option<i64>, now: i64) -> bool {
    match expiration {
        Some(expires) => now >= expires,
        None => false,
    }
}
