//! Error types for the cache layer
//!
//! Two tiers, both built on thiserror:
//! - [`ConfigError`] is returned by backend constructors and stops initialization.
//! - [`OperationError`] stays inside the crate; the cache contract turns it into
//!   `false` or a default value after logging it.

use std::path::PathBuf;

use thiserror::Error;

// == Config Error Enum ==
/// Fatal error raised while constructing a backend.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Cache directory is missing and could not be created
    #[error("Cannot create cache directory {path}: {source}")]
    CacheDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Cache path exists but is not a directory
    #[error("Cache path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// Cache directory exists but files cannot be created in it
    #[error("Cache directory is not writable {path}: {source}")]
    DirectoryNotWritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not reach the Redis server
    #[cfg(feature = "redis-backend")]
    #[error("Redis connection failed: {0}")]
    Connection(#[source] redis::RedisError),

    /// Redis rejected the configured password
    #[cfg(feature = "redis-backend")]
    #[error("Redis authentication failed: {0}")]
    Authentication(#[source] redis::RedisError),

    /// Redis rejected the configured database index
    #[cfg(feature = "redis-backend")]
    #[error("Redis database {database} could not be selected: {source}")]
    DatabaseSelection {
        database: i64,
        #[source]
        source: redis::RedisError,
    },

    /// The requested backend was not compiled in
    #[error("Cache backend unavailable: {0}")]
    BackendUnavailable(String),

    /// An explicitly configured value could not be understood
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
}

// == Operation Error Enum ==
/// Soft failure of a single cache operation.
///
/// Never escapes the public contract.
#[derive(Error, Debug)]
pub(crate) enum OperationError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "redis-backend")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

// == Result Type Alias ==
/// Convenience Result type for backend construction.
pub type Result<T> = std::result::Result<T, ConfigError>;
