//! Cache Module
//!
//! The backend-neutral cache contract and its three reference backends:
//! process-local memory, one-file-per-key on disk, and Redis.
//!
//! Every runtime operation degrades to a miss or `false` on failure. Only
//! construction is fallible (see [`crate::error::ConfigError`]).

mod clock;
mod entry;
mod file;
mod memory;
#[cfg(feature = "redis-backend")]
mod redis_backend;


use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{BackendKind, Config};
use crate::error::Result;

// Re-export public types
pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::CacheEntry;
pub use file::FileCache;
pub use memory::MemoryCache;
#[cfg(feature = "redis-backend")]
pub use redis_backend::RedisCache;

// == Public Constants ==
/// Suffix of every file written by [`FileCache`]
pub const FILE_SUFFIX: &str = ".cache";

/// Default key namespace used by the Redis backend
pub const DEFAULT_REDIS_PREFIX: &str = "db_cache:";

// == Cache Contract ==
/// Uniform contract implemented by every backend.
///
/// Receivers are `&mut self`: a backend is owned by one caller at a time and
/// carries no locking of its own.
pub trait Cache {
    /// Returns the stored value when present and unexpired.
    fn lookup(&mut self, key: &str) -> Option<Value>;

    /// Stores `value`; `ttl` of `None` keeps it until removed.
    ///
    /// Returns false only when the backend could not store it.
    fn set(&mut self, key: &str, value: Value, ttl: Option<u64>) -> bool;

    /// Existence check honouring expiration. An expired key is removed.
    fn has(&mut self, key: &str) -> bool;

    /// Returns false if the key was absent or could not be removed.
    fn delete(&mut self, key: &str) -> bool;

    /// Removes every entry in this backend's namespace.
    fn clear(&mut self) -> bool;

    /// Returns the stored value, or `default` on a miss.
    fn get(&mut self, key: &str, default: Value) -> Value {
        self.lookup(key).unwrap_or(default)
    }

    /// Looks up every key independently; the result holds all requested keys.
    fn get_multiple(&mut self, keys: &[&str], default: Value) -> HashMap<String, Value> {
        keys.iter()
            .map(|key| (key.to_string(), self.get(key, default.clone())))
            .collect()
    }

    /// Stores every pair. All writes are attempted even after a failure.
    fn set_multiple(&mut self, values: HashMap<String, Value>, ttl: Option<u64>) -> bool {
        let mut ok = true;
        for (key, value) in values {
            ok &= self.set(&key, value, ttl);
        }
        ok
    }

    /// Deletes every key. All deletes are attempted even after a failure.
    fn delete_multiple(&mut self, keys: &[&str]) -> bool {
        let mut ok = true;
        for key in keys {
            ok &= self.delete(key);
        }
        ok
    }
}

impl<C: Cache + ?Sized> Cache for Box<C> {
    fn lookup(&mut self, key: &str) -> Option<Value> {
        (**self).lookup(key)
    }

    fn set(&mut self, key: &str, value: Value, ttl: Option<u64>) -> bool {
        (**self).set(key, value, ttl)
    }

    fn has(&mut self, key: &str) -> bool {
        (**self).has(key)
    }

    fn delete(&mut self, key: &str) -> bool {
        (**self).delete(key)
    }

    fn clear(&mut self) -> bool {
        (**self).clear()
    }

    fn get(&mut self, key: &str, default: Value) -> Value {
        (**self).get(key, default)
    }

    fn get_multiple(&mut self, keys: &[&str], default: Value) -> HashMap<String, Value> {
        (**self).get_multiple(keys, default)
    }

    fn set_multiple(&mut self, values: HashMap<String, Value>, ttl: Option<u64>) -> bool {
        (**self).set_multiple(values, ttl)
    }

    fn delete_multiple(&mut self, keys: &[&str]) -> bool {
        (**self).delete_multiple(keys)
    }
}

// == Typed Access ==
/// Typed helpers over any [`Cache`].
///
/// A stored value that does not deserialize into `T` counts as a miss.
pub trait CacheExt: Cache {
    fn get_as<T: DeserializeOwned>(&mut self, key: &str) -> Option<T> {
        let value = self.lookup(key)?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(err) => {
                debug!(key, error = %err, "Cached value has unexpected shape, treating as miss");
                None
            }
        }
    }

    fn set_as<T: Serialize + ?Sized>(&mut self, key: &str, value: &T, ttl: Option<u64>) -> bool {
        match serde_json::to_value(value) {
            Ok(value) => self.set(key, value, ttl),
            Err(err) => {
                warn!(key, error = %err, "Failed to serialize value for cache");
                false
            }
        }
    }
}

impl<C: Cache + ?Sized> CacheExt for C {}

// == Key Validation ==
/// Keys must be non-empty.
pub(crate) fn is_valid_key(key: &str) -> bool {
    if key.is_empty() {
        debug!("Rejected empty cache key");
        return false;
    }
    true
}

// == Backend Factory ==
/// Opens the backend selected by `config`.
///
/// Errors are fatal for that backend only, so callers may fall back to another.
pub fn open_backend(config: &Config) -> Result<Box<dyn Cache>> {
    match config.backend {
        BackendKind::Memory => {
            info!("Using in-memory cache backend");
            Ok(Box::new(MemoryCache::new()))
        }
        BackendKind::File => {
            let cache = FileCache::new(&config.cache_dir)?;
            Ok(Box::new(cache))
        }
        #[cfg(feature = "redis-backend")]
        BackendKind::Redis => {
            let cache = RedisCache::connect(&config.redis)?;
            Ok(Box::new(cache))
        }
        #[cfg(not(feature = "redis-backend"))]
        BackendKind::Redis => Err(crate::error::ConfigError::BackendUnavailable(
            "redis (built without the redis-backend feature)".to_string(),
        )),
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct User {
        name: String,
        age: u32,
    }

    #[test]
    fn test_boxed_backend_forwards() {
        let mut cache: Box<dyn Cache> = Box::new(MemoryCache::new());

        assert!(cache.set("k", json!([1, 2, 3]), None));
        assert!(cache.has("k"));
        assert_eq!(cache.get("k", Value::Null), json!([1, 2, 3]));
        assert!(cache.delete("k"));
        assert_eq!(cache.get("k", json!("MISS")), json!("MISS"));
    }

    #[test]
    fn test_typed_round_trip() {
        let mut cache = MemoryCache::new();
        let user = User {
            name: "A".to_string(),
            age: 30,
        };

        assert!(cache.set_as("user:1", &user, None));
        assert_eq!(cache.get_as::<User>("user:1"), Some(user));
    }

    #[test]
    fn test_typed_shape_mismatch_is_miss() {
        let mut cache = MemoryCache::new();
        cache.set("user:1", json!("not a user"), None);

        assert_eq!(cache.get_as::<User>("user:1"), None);
    }

    #[test]
    fn test_open_memory_backend() {
        let config = Config::default();
        let mut cache = open_backend(&config).unwrap();
        assert!(cache.set("k", json!(true), None));
        assert_eq!(cache.get("k", json!(false)), json!(true));
    }

    #[test]
    fn test_open_file_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            backend: BackendKind::File,
            cache_dir: dir.path().join("nested"),
            ..Config::default()
        };

        let mut cache = open_backend(&config).unwrap();
        assert!(cache.set("k", json!(1), None));
        assert!(dir.path().join("nested").is_dir());
    }

    #[test]
    fn test_open_file_backend_rejects_file_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = Config {
            backend: BackendKind::File,
            cache_dir: file.path().to_path_buf(),
            ..Config::default()
        };

        let result = open_backend(&config);
        assert!(matches!(result, Err(ConfigError::NotADirectory { .. })));
    }

    #[test]
    fn test_empty_key_is_invalid() {
        assert!(!is_valid_key(""));
        assert!(is_valid_key("a"));
    }
}
