//! Configuration Module
//!
//! Handles loading backend and query-cache settings from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::DEFAULT_REDIS_PREFIX;
use crate::error::ConfigError;

// == Backend Kind ==
/// Which backend [`crate::cache::open_backend`] constructs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Memory,
    File,
    Redis,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "array" => Ok(Self::Memory),
            "file" => Ok(Self::File),
            "redis" => Ok(Self::Redis),
            _ => Err(ConfigError::InvalidValue {
                name: "CACHE_BACKEND",
                value: s.to_string(),
            }),
        }
    }
}

// == Redis Config ==
/// Connection settings for the Redis backend.
#[derive(Debug, Clone, PartialEq)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    /// Connect timeout in seconds, 0 = no timeout
    pub timeout: f64,
    /// Delay in milliseconds before the single reconnect attempt, 0 = none
    pub retry_interval: u64,
    pub password: Option<String>,
    /// Database index selected after connecting
    pub database: Option<i64>,
    /// Namespace prefix for every key
    pub prefix: String,
}

impl RedisConfig {
    /// Loads Redis settings from environment variables.
    ///
    /// # Environment Variables
    /// - `REDIS_HOST` (default: 127.0.0.1)
    /// - `REDIS_PORT` (default: 6379)
    /// - `REDIS_TIMEOUT` - seconds (default: 0)
    /// - `REDIS_RETRY_INTERVAL` - milliseconds (default: 0)
    /// - `REDIS_PASSWORD` (optional)
    /// - `REDIS_DATABASE` (optional)
    /// - `REDIS_PREFIX` (default: db_cache:)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env::var("REDIS_HOST").unwrap_or(defaults.host),
            port: parse_var("REDIS_PORT").unwrap_or(defaults.port),
            timeout: parse_var("REDIS_TIMEOUT").unwrap_or(defaults.timeout),
            retry_interval: parse_var("REDIS_RETRY_INTERVAL").unwrap_or(defaults.retry_interval),
            password: env::var("REDIS_PASSWORD").ok().filter(|p| !p.is_empty()),
            database: parse_var("REDIS_DATABASE"),
            prefix: env::var("REDIS_PREFIX").unwrap_or(defaults.prefix),
        }
    }

    /// Connect timeout, or None when unset, zero or not a valid duration.
    pub fn connect_timeout(&self) -> Option<Duration> {
        if self.timeout > 0.0 {
            Duration::try_from_secs_f64(self.timeout).ok()
        } else {
            None
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            timeout: 0.0,
            retry_interval: 0,
            password: None,
            database: None,
            prefix: DEFAULT_REDIS_PREFIX.to_string(),
        }
    }
}

// == Config ==
/// Cache layer configuration.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Backend to construct
    pub backend: BackendKind,
    /// Directory for the file backend
    pub cache_dir: PathBuf,
    /// Settings for the Redis backend
    pub redis: RedisConfig,
    /// Whether the query cache starts enabled
    pub query_cache_enabled: bool,
    /// Default TTL in seconds for query results, None = indefinite
    pub query_default_ttl: Option<u64>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_BACKEND` - memory, file or redis (default: memory)
    /// - `CACHE_DIR` - file backend directory (default: <temp dir>/cache)
    /// - `QUERY_CACHE_ENABLED` - true/false (default: true)
    /// - `QUERY_CACHE_TTL` - seconds, 0 = indefinite (default: indefinite)
    /// - the `REDIS_*` variables read by [`RedisConfig::from_env`]
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let backend = match env::var("CACHE_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.backend,
        };

        Ok(Self {
            backend,
            cache_dir: env::var("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            redis: RedisConfig::from_env(),
            query_cache_enabled: env::var("QUERY_CACHE_ENABLED")
                .ok()
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.query_cache_enabled),
            query_default_ttl: parse_var::<u64>("QUERY_CACHE_TTL").filter(|ttl| *ttl > 0),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            cache_dir: env::temp_dir().join("cache"),
            redis: RedisConfig::default(),
            query_cache_enabled: true,
            query_default_ttl: None,
        }
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
