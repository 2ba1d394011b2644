//! Cache Layer - pluggable caching with a query-result cache on top
//!
//! One [`cache::Cache`] contract, three backends with different durability
//! (process memory, one file per key, Redis), and a [`query::QueryCache`]
//! that derives deterministic keys from SQL text and bindings.
//!
//! Runtime cache failures never surface as errors: they read as misses or
//! `false`. Only backend construction returns [`error::ConfigError`].

pub mod cache;
pub mod config;
pub mod error;
pub mod query;

pub use cache::{open_backend, Cache, CacheExt, FileCache, MemoryCache};
#[cfg(feature = "redis-backend")]
pub use cache::RedisCache;
pub use config::{BackendKind, Config, RedisConfig};
pub use error::ConfigError;
pub use query::{Query, QueryCache, SqlQuery};
