//! Memory Cache Module
//!
//! Process-local backend: two parallel maps, value-by-key and
//! expiration-by-key. Expiry is lazy; nothing sweeps in the background and
//! there is no capacity bound.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::cache::clock::{system_clock, Clock};
use crate::cache::entry::{expiration_from_ttl, is_expired_at};
use crate::cache::{is_valid_key, Cache};

// == Memory Cache ==
/// Volatile in-process cache owned by a single caller.
#[derive(Debug)]
pub struct MemoryCache {
    /// Key-value storage
    values: HashMap<String, Value>,
    /// Absolute expirations (Unix seconds) for keys stored with a TTL
    expirations: HashMap<String, i64>,
    /// Time source for expiry checks
    clock: Arc<dyn Clock>,
}

impl MemoryCache {
    // == Constructor ==
    /// Creates an empty cache on the system clock.
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    /// Creates an empty cache on the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            values: HashMap::new(),
            expirations: HashMap::new(),
            clock,
        }
    }

    // == Length ==
    /// Number of physically stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn remove(&mut self, key: &str) -> bool {
        self.expirations.remove(key);
        self.values.remove(key).is_some()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache for MemoryCache {
    fn lookup(&mut self, key: &str) -> Option<Value> {
        if !self.has(key) {
            return None;
        }
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value, ttl: Option<u64>) -> bool {
        if !is_valid_key(key) {
            return false;
        }

        match expiration_from_ttl(ttl, self.clock.now()) {
            Some(expiration) => {
                self.expirations.insert(key.to_string(), expiration);
            }
            None => {
                self.expirations.remove(key);
            }
        }
        self.values.insert(key.to_string(), value);
        true
    }

    fn has(&mut self, key: &str) -> bool {
        if !self.values.contains_key(key) {
            return false;
        }

        let expiration = self.expirations.get(key).copied();
        if is_expired_at(expiration, self.clock.now()) {
            debug!(key, "Memory cache entry expired, removing");
            self.remove(key);
            return false;
        }
        true
    }

    /// An expired entry is removed but reported as absent.
    fn delete(&mut self, key: &str) -> bool {
        let expiration = self.expirations.get(key).copied();
        let expired = is_expired_at(expiration, self.clock.now());
        self.remove(key) && !expired
    }

    fn clear(&mut self) -> bool {
        self.values.clear();
        self.expirations.clear();
        true
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use serde_json::json;

    const START: i64 = 1_700_000_000;

    fn cache_with_clock() -> (MemoryCache, ManualClock) {
        let clock = ManualClock::new(START);
        (MemoryCache::with_clock(Arc::new(clock.clone())), clock)
    }

    #[test]
    fn test_cache_new() {
        let cache = MemoryCache::new();
        assert_eq!(cache.len(), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_set_and_get() {
        let mut cache = MemoryCache::new();

        assert!(cache.set("scalar", json!(42), None));
        assert!(cache.set("nested", json!({"a": [1, {"b": null}], "c": "d"}), None));

        assert_eq!(cache.get("scalar", Value::Null), json!(42));
        assert_eq!(
            cache.get("nested", Value::Null),
            json!({"a": [1, {"b": null}], "c": "d"})
        );
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_get_missing_returns_default() {
        let mut cache = MemoryCache::new();
        assert_eq!(cache.get("nonexistent", json!("MISS")), json!("MISS"));
        assert!(cache.lookup("nonexistent").is_none());
    }

    #[test]
    fn test_stored_false_is_not_a_miss() {
        let mut cache = MemoryCache::new();
        cache.set("flag", json!(false), None);

        assert!(cache.has("flag"));
        assert_eq!(cache.lookup("flag"), Some(json!(false)));
    }

    #[test]
    fn test_delete() {
        let mut cache = MemoryCache::new();

        cache.set("key1", json!("value1"), None);
        assert!(cache.delete("key1"));
        assert!(cache.is_empty());
        assert!(!cache.delete("key1"));
    }

    #[test]
    fn test_delete_expired_returns_false() {
        let (mut cache, clock) = cache_with_clock();
        cache.set("e", json!(1), Some(1));

        clock.advance(1);
        assert!(!cache.delete("e"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_overwrite_resets_ttl() {
        let (mut cache, clock) = cache_with_clock();

        cache.set("key1", json!("value1"), Some(5));
        cache.set("key1", json!("value2"), None);

        clock.advance(3600);
        assert_eq!(cache.get("key1", Value::Null), json!("value2"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_ttl_expiration() {
        let (mut cache, clock) = cache_with_clock();

        cache.set("key1", json!("value1"), Some(1));
        assert!(cache.has("key1"));

        clock.advance(1);
        assert!(!cache.has("key1"));
        assert_eq!(cache.get("key1", json!("default")), json!("default"));
    }

    #[test]
    fn test_expired_has_removes_both_maps() {
        let (mut cache, clock) = cache_with_clock();

        cache.set("key1", json!(1), Some(10));
        clock.advance(10);

        // Still physically present until accessed
        assert_eq!(cache.len(), 1);
        assert!(!cache.has("key1"));
        assert!(cache.values.is_empty());
        assert!(cache.expirations.is_empty());
    }

    #[test]
    fn test_indefinite_ttl_survives_far_future() {
        let (mut cache, clock) = cache_with_clock();

        cache.set("forever", json!("v"), None);
        clock.set(i64::MAX - 1);
        assert_eq!(cache.get("forever", Value::Null), json!("v"));
    }

    #[test]
    fn test_zero_ttl_is_immediately_absent() {
        let (mut cache, _clock) = cache_with_clock();

        assert!(cache.set("gone", json!(1), Some(0)));
        assert!(!cache.has("gone"));
    }

    #[test]
    fn test_clear() {
        let mut cache = MemoryCache::new();
        cache.set("a", json!(1), None);
        cache.set("b", json!(2), Some(60));

        assert!(cache.clear());
        assert!(!cache.has("a"));
        assert!(!cache.has("b"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_empty_key_rejected() {
        let mut cache = MemoryCache::new();
        assert!(!cache.set("", json!(1), None));
        assert!(!cache.has(""));
        assert!(!cache.delete(""));
    }

    #[test]
    fn test_get_multiple_defaults_missing() {
        let mut cache = MemoryCache::new();
        cache.set("k2", json!({"v": 2}), None);

        let result = cache.get_multiple(&["k1", "k2", "k3"], json!("default"));
        assert_eq!(result.len(), 3);
        assert_eq!(result["k1"], json!("default"));
        assert_eq!(result["k2"], json!({"v": 2}));
        assert_eq!(result["k3"], json!("default"));
    }

    #[test]
    fn test_set_multiple_with_ttl() {
        let (mut cache, clock) = cache_with_clock();
        let values = HashMap::from([
            ("a".to_string(), json!(1)),
            ("b".to_string(), json!(2)),
        ]);

        assert!(cache.set_multiple(values, Some(30)));
        assert!(cache.has("a") && cache.has("b"));

        clock.advance(30);
        assert!(!cache.has("a"));
        assert!(!cache.has("b"));
    }

    #[test]
    fn test_set_multiple_attempts_all_after_failure() {
        let mut cache = MemoryCache::new();
        let values = HashMap::from([
            (String::new(), json!(0)),
            ("a".to_string(), json!(1)),
            ("b".to_string(), json!(2)),
        ]);

        assert!(!cache.set_multiple(values, None));
        assert!(cache.has("a"));
        assert!(cache.has("b"));
    }

    #[test]
    fn test_delete_multiple_is_conjunction() {
        let mut cache = MemoryCache::new();
        cache.set("a", json!(1), None);
        cache.set("b", json!(2), None);

        assert!(!cache.delete_multiple(&["a", "missing", "b"]));
        assert!(!cache.has("a"));
        assert!(!cache.has("b"));

        cache.set("c", json!(3), None);
        assert!(cache.delete_multiple(&["c"]));
    }
}
