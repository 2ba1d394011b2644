//! Query Cache Module
//!
//! Caches query results on any [`crate::cache::Cache`] backend, keyed by a
//! digest of the query's SQL and bindings.

mod cache;
mod key;
mod stats;

pub use cache::QueryCache;
pub use key::{query_key, Query, SqlQuery, QUERY_KEY_PREFIX};
pub use stats::QueryCacheStats;
