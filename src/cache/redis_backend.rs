//! Redis Cache Module
//!
//! Durable, network-shared backend over one long-lived Redis connection.
//! Keys are namespaced with a configurable prefix; TTLs are enforced by the
//! server (`SETEX`). Values are stored as JSON text.
//!
//! Single-key commands are atomic on the server. `set_multiple` without a TTL
//! is one `MSET` and therefore atomic; with a TTL it is a pipeline of `SETEX`
//! commands, which can leave some keys written and others not if the
//! connection drops mid-batch. `clear` scans the prefix and offers no isolation
//! from writers adding keys during the scan.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::thread;
use std::time::Duration;

use redis::{Client, Connection};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::{is_valid_key, Cache};
use crate::config::RedisConfig;
use crate::error::{ConfigError, OperationError, Result};

/// Keys fetched per SCAN round trip and deleted per DEL command during `clear`
const CLEAR_BATCH_SIZE: usize = 1000;

/// Longest TTL sent with `SETEX`. Redis rejects expirations whose millisecond
/// form overflows; anything beyond this is stored without expiry.
const MAX_SETEX_TTL: u64 = (i64::MAX as u64 / 1000) / 2;

type OpResult<T> = std::result::Result<T, OperationError>;

// == Redis Cache ==
/// Cache backed by a Redis server.
///
/// Owns its connection exclusively; use one instance per thread.
pub struct RedisCache {
    conn: Connection,
    prefix: String,
}

impl fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCache")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl RedisCache {
    // == Constructor ==
    /// Connects, authenticates and selects the database eagerly.
    ///
    /// Any failure here is a [`ConfigError`]; nothing is deferred to the
    /// first operation.
    pub fn connect(config: &RedisConfig) -> Result<Self> {
        let client =
            Client::open((config.host.as_str(), config.port)).map_err(ConfigError::Connection)?;

        let mut conn = match open_connection(&client, config) {
            Ok(conn) => conn,
            Err(err) if config.retry_interval > 0 => {
                warn!(
                    host = %config.host,
                    port = config.port,
                    retry_interval_ms = config.retry_interval,
                    error = %err,
                    "Redis connection failed, retrying once"
                );
                thread::sleep(Duration::from_millis(config.retry_interval));
                open_connection(&client, config).map_err(ConfigError::Connection)?
            }
            Err(err) => return Err(ConfigError::Connection(err)),
        };

        if let Some(password) = &config.password {
            redis::cmd("AUTH")
                .arg(password)
                .query::<()>(&mut conn)
                .map_err(ConfigError::Authentication)?;
        }

        if let Some(database) = config.database {
            redis::cmd("SELECT")
                .arg(database)
                .query::<()>(&mut conn)
                .map_err(|source| ConfigError::DatabaseSelection { database, source })?;
        }

        redis::cmd("PING")
            .query::<String>(&mut conn)
            .map_err(ConfigError::Connection)?;

        info!(
            host = %config.host,
            port = config.port,
            database = ?config.database,
            prefix = %config.prefix,
            "Redis cache connected"
        );

        Ok(Self {
            conn,
            prefix: config.prefix.clone(),
        })
    }

    /// Namespace prefix applied to every key.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    // == Fallible Operations ==
    fn try_lookup(&mut self, key: &str) -> OpResult<Option<Value>> {
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.namespaced(key))
            .query(&mut self.conn)?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn try_set(&mut self, key: &str, value: &Value, ttl: Option<u64>) -> OpResult<()> {
        let key = self.namespaced(key);
        match server_ttl(ttl) {
            None => {
                let payload = serde_json::to_string(value)?;
                redis::cmd("SET").arg(key).arg(payload).query::<()>(&mut self.conn)?;
            }
            // SETEX rejects 0; an already-expired write is a removal
            Some(0) => {
                redis::cmd("DEL").arg(key).query::<()>(&mut self.conn)?;
            }
            Some(ttl) => {
                let payload = serde_json::to_string(value)?;
                redis::cmd("SETEX")
                    .arg(key)
                    .arg(ttl)
                    .arg(payload)
                    .query::<()>(&mut self.conn)?;
            }
        }
        Ok(())
    }

    fn try_has(&mut self, key: &str) -> OpResult<bool> {
        let count: i64 = redis::cmd("EXISTS")
            .arg(self.namespaced(key))
            .query(&mut self.conn)?;
        Ok(count > 0)
    }

    fn try_delete(&mut self, keys: &[String]) -> OpResult<usize> {
        let removed: i64 = redis::cmd("DEL").arg(keys).query(&mut self.conn)?;
        Ok(usize::try_from(removed).unwrap_or(0))
    }

    fn try_clear(&mut self) -> OpResult<usize> {
        let pattern = format!("{}*", escape_glob(&self.prefix));
        let mut cursor: u64 = 0;
        let mut removed = 0usize;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(CLEAR_BATCH_SIZE)
                .query(&mut self.conn)?;

            for chunk in keys.chunks(CLEAR_BATCH_SIZE) {
                removed += self.try_delete(chunk)?;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(removed)
    }

    fn try_get_multiple(&mut self, keys: &[&str]) -> OpResult<Vec<Option<Value>>> {
        let namespaced: Vec<String> = keys.iter().map(|key| self.namespaced(key)).collect();
        let raw: Vec<Option<String>> = redis::cmd("MGET")
            .arg(namespaced.as_slice())
            .query(&mut self.conn)?;

        Ok(raw
            .into_iter()
            .zip(keys)
            .map(|(raw, key)| {
                raw.and_then(|raw| match serde_json::from_str(&raw) {
                    Ok(value) => Some(value),
                    Err(err) => {
                        warn!(key, error = %err, "Undecodable Redis value, treating as miss");
                        None
                    }
                })
            })
            .collect())
    }

    fn try_set_multiple(&mut self, pairs: &[(String, String)], ttl: Option<u64>) -> OpResult<()> {
        match server_ttl(ttl) {
            None => {
                let mut cmd = redis::cmd("MSET");
                for (key, payload) in pairs {
                    cmd.arg(self.namespaced(key)).arg(payload);
                }
                cmd.query::<()>(&mut self.conn)?;
            }
            Some(0) => {
                let keys: Vec<String> =
                    pairs.iter().map(|(key, _)| self.namespaced(key)).collect();
                self.try_delete(&keys)?;
            }
            Some(ttl) => {
                let mut pipe = redis::pipe();
                for (key, payload) in pairs {
                    pipe.cmd("SETEX")
                        .arg(self.namespaced(key))
                        .arg(ttl)
                        .arg(payload)
                        .ignore();
                }
                pipe.query::<()>(&mut self.conn)?;
            }
        }
        Ok(())
    }
}

fn open_connection(client: &Client, config: &RedisConfig) -> redis::RedisResult<Connection> {
    match config.connect_timeout() {
        Some(timeout) => client.get_connection_with_timeout(timeout),
        None => client.get_connection(),
    }
}

/// TTL as sent to the server; out-of-range TTLs mean no expiry.
fn server_ttl(ttl: Option<u64>) -> Option<u64> {
    ttl.filter(|ttl| *ttl <= MAX_SETEX_TTL)
}

/// Escapes glob metacharacters so a prefix matches literally in `SCAN MATCH`.
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl Cache for RedisCache {
    fn lookup(&mut self, key: &str) -> Option<Value> {
        if !is_valid_key(key) {
            return None;
        }
        match self.try_lookup(key) {
            Ok(value) => value,
            Err(err) => {
                warn!(key, error = %err, "Redis GET failed");
                None
            }
        }
    }

    fn set(&mut self, key: &str, value: Value, ttl: Option<u64>) -> bool {
        if !is_valid_key(key) {
            return false;
        }
        match self.try_set(key, &value, ttl) {
            Ok(()) => true,
            Err(err) => {
                warn!(key, error = %err, "Redis SET failed");
                false
            }
        }
    }

    fn has(&mut self, key: &str) -> bool {
        if !is_valid_key(key) {
            return false;
        }
        match self.try_has(key) {
            Ok(exists) => exists,
            Err(err) => {
                warn!(key, error = %err, "Redis EXISTS failed");
                false
            }
        }
    }

    fn delete(&mut self, key: &str) -> bool {
        if !is_valid_key(key) {
            return false;
        }
        let namespaced = [self.namespaced(key)];
        match self.try_delete(&namespaced) {
            Ok(removed) => removed > 0,
            Err(err) => {
                warn!(key, error = %err, "Redis DEL failed");
                false
            }
        }
    }

    /// Succeeds when every SCAN and DEL completed, however many keys matched.
    fn clear(&mut self) -> bool {
        match self.try_clear() {
            Ok(removed) => {
                info!(removed, prefix = %self.prefix, "Redis cache cleared");
                true
            }
            Err(err) => {
                warn!(prefix = %self.prefix, error = %err, "Redis clear failed");
                false
            }
        }
    }

    /// One `MGET` round trip, mapped back to keys by position.
    fn get_multiple(&mut self, keys: &[&str], default: Value) -> HashMap<String, Value> {
        let mut result: HashMap<String, Value> = keys
            .iter()
            .map(|key| (key.to_string(), default.clone()))
            .collect();

        let valid: Vec<&str> = keys.iter().copied().filter(|key| is_valid_key(key)).collect();
        if valid.is_empty() {
            return result;
        }

        match self.try_get_multiple(&valid) {
            Ok(values) => {
                for (key, value) in valid.into_iter().zip(values) {
                    if let Some(value) = value {
                        result.insert(key.to_string(), value);
                    }
                }
            }
            Err(err) => {
                warn!(keys = valid.len(), error = %err, "Redis MGET failed");
            }
        }
        result
    }

    /// `MSET` without a TTL; a non-atomic `SETEX` pipeline with one.
    fn set_multiple(&mut self, values: HashMap<String, Value>, ttl: Option<u64>) -> bool {
        let mut ok = true;
        let mut pairs = Vec::with_capacity(values.len());
        for (key, value) in values {
            if !is_valid_key(&key) {
                ok = false;
                continue;
            }
            match serde_json::to_string(&value) {
                Ok(payload) => pairs.push((key, payload)),
                Err(err) => {
                    warn!(key = %key, error = %err, "Failed to serialize value for Redis");
                    ok = false;
                }
            }
        }

        if pairs.is_empty() {
            return ok;
        }

        if let Err(err) = self.try_set_multiple(&pairs, ttl) {
            warn!(
                keys = pairs.len(),
                ttl = ?ttl,
                error = %err,
                "Redis bulk write failed, some keys may have been written"
            );
            ok = false;
        }
        ok
    }

    /// One `DEL` for all keys; true only if every requested key was removed.
    ///
    /// A key listed twice can only be removed once, so duplicates fail.
    fn delete_multiple(&mut self, keys: &[&str]) -> bool {
        let mut ok = true;
        let mut requested = 0usize;
        let mut distinct = HashSet::new();
        for key in keys {
            if is_valid_key(key) {
                requested += 1;
                distinct.insert(self.namespaced(key));
            } else {
                ok = false;
            }
        }

        if distinct.is_empty() {
            return ok;
        }

        let namespaced: Vec<String> = distinct.into_iter().collect();
        match self.try_delete(&namespaced) {
            Ok(removed) => {
                debug!(requested, removed, "Redis bulk delete");
                ok && removed == requested
            }
            Err(err) => {
                warn!(keys = namespaced.len(), error = %err, "Redis bulk DEL failed");
                false
            }
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Instant;

    /// Connects to the server named by REDIS_HOST/REDIS_PORT, or skips.
    fn live_cache(test: &str) -> Option<RedisCache> {
        let config = RedisConfig {
            prefix: format!("cache_layer_test:{}:{}:", test, std::process::id()),
            timeout: 1.0,
            ..RedisConfig::from_env()
        };
        match RedisCache::connect(&config) {
            Ok(mut cache) => {
                cache.clear();
                Some(cache)
            }
            Err(err) => {
                eprintln!("skipping {}: no Redis server ({})", test, err);
                None
            }
        }
    }

    fn closed_port_config() -> RedisConfig {
        RedisConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            timeout: 1.0,
            ..RedisConfig::default()
        }
    }

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("db_cache:"), "db_cache:");
        assert_eq!(escape_glob("a*b?[c]\\"), "a\\*b\\?\\[c\\]\\\\");
    }

    #[test]
    fn test_server_ttl_drops_out_of_range_expiry() {
        assert_eq!(server_ttl(None), None);
        assert_eq!(server_ttl(Some(0)), Some(0));
        assert_eq!(server_ttl(Some(60)), Some(60));
        assert_eq!(server_ttl(Some(MAX_SETEX_TTL)), Some(MAX_SETEX_TTL));
        assert_eq!(server_ttl(Some(MAX_SETEX_TTL + 1)), None);
        assert_eq!(server_ttl(Some(u64::MAX)), None);
    }

    #[test]
    fn test_huge_ttl_is_stored() {
        let Some(mut cache) = live_cache("huge_ttl") else {
            return;
        };

        assert!(cache.set("far", json!("v"), Some(u64::MAX)));
        assert_eq!(cache.lookup("far"), Some(json!("v")));
        assert!(cache.set_multiple(HashMap::from([("far2".to_string(), json!(1))]), Some(u64::MAX)));
        assert!(cache.has("far2"));
        cache.clear();
    }

    #[test]
    fn test_connect_refused_is_config_error() {
        let result = RedisCache::connect(&closed_port_config());
        assert!(matches!(result, Err(ConfigError::Connection(_))));
    }

    #[test]
    fn test_connect_retries_once_after_interval() {
        let config = RedisConfig {
            retry_interval: 200,
            ..closed_port_config()
        };

        let started = Instant::now();
        let result = RedisCache::connect(&config);
        assert!(matches!(result, Err(ConfigError::Connection(_))));
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[test]
    fn test_round_trip() {
        let Some(mut cache) = live_cache("round_trip") else {
            return;
        };

        assert!(cache.set("scalar", json!(7), None));
        assert!(cache.set("nested", json!({"a": [1, {"b": "c"}]}), None));
        assert!(cache.set("flag", json!(false), None));

        assert_eq!(cache.get("scalar", Value::Null), json!(7));
        assert_eq!(cache.get("nested", Value::Null), json!({"a": [1, {"b": "c"}]}));
        assert_eq!(cache.lookup("flag"), Some(json!(false)));
        assert_eq!(cache.get("missing", json!("MISS")), json!("MISS"));
        cache.clear();
    }

    #[test]
    fn test_prefix_namespacing() {
        let Some(mut cache) = live_cache("namespacing") else {
            return;
        };

        cache.set("k", json!(1), None);
        let raw: Option<String> = redis::cmd("GET")
            .arg(format!("{}k", cache.prefix()))
            .query(&mut cache.conn)
            .unwrap();
        assert_eq!(raw.as_deref(), Some("1"));
        cache.clear();
    }

    #[test]
    fn test_ttl_expiry() {
        let Some(mut cache) = live_cache("ttl") else {
            return;
        };

        assert!(cache.set("short", json!("v"), Some(1)));
        assert!(cache.has("short"));
        thread::sleep(Duration::from_millis(1500));
        assert!(!cache.has("short"));
        assert_eq!(cache.get("short", json!("MISS")), json!("MISS"));

        assert!(cache.set("zero", json!("v"), Some(0)));
        assert!(!cache.has("zero"));
    }

    #[test]
    fn test_bulk_operations() {
        let Some(mut cache) = live_cache("bulk") else {
            return;
        };

        let values = HashMap::from([
            ("a".to_string(), json!(1)),
            ("b".to_string(), json!({"x": 2})),
        ]);
        assert!(cache.set_multiple(values.clone(), None));

        let got = cache.get_multiple(&["a", "b", "c"], json!("default"));
        assert_eq!(got.len(), 3);
        assert_eq!(got["a"], json!(1));
        assert_eq!(got["b"], json!({"x": 2}));
        assert_eq!(got["c"], json!("default"));

        assert!(cache.set_multiple(values, Some(60)));
        assert!(cache.has("a") && cache.has("b"));

        assert!(!cache.delete_multiple(&["a", "b", "c"]));
        assert!(!cache.has("a") && !cache.has("b"));

        cache.set("d", json!(4), None);
        assert!(!cache.delete_multiple(&["d", "d"]));
        assert!(!cache.has("d"));

        cache.set("e", json!(5), None);
        cache.set("f", json!(6), None);
        assert!(cache.delete_multiple(&["e", "f"]));
    }

    #[test]
    fn test_delete_and_clear() {
        let Some(mut cache) = live_cache("clear") else {
            return;
        };

        cache.set("a", json!(1), None);
        cache.set("b", json!(2), Some(60));
        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));

        assert!(cache.clear());
        assert!(!cache.has("b"));
        // Nothing left to remove still counts as success
        assert!(cache.clear());
    }

    #[test]
    fn test_undecodable_value_is_miss() {
        let Some(mut cache) = live_cache("corrupt") else {
            return;
        };

        redis::cmd("SET")
            .arg(format!("{}bad", cache.prefix()))
            .arg("{not json")
            .query::<()>(&mut cache.conn)
            .unwrap();
        assert_eq!(cache.get("bad", json!("MISS")), json!("MISS"));
        assert_eq!(cache.get_multiple(&["bad"], json!("MISS"))["bad"], json!("MISS"));
        cache.clear();
    }
}
