//! Cache Layer probe
//!
//! Opens the configured backend and checks a query cache round trip against it.

use anyhow::{bail, Context, Result};
use serde_json::json;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cache_layer::{open_backend, Cache, Config, MemoryCache, QueryCache, SqlQuery};

/// Probe entry point.
///
/// # Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Open the configured backend, falling back to memory if it fails
/// 4. Store, read back and delete a probe query result
fn main() -> Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cache_layer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Invalid cache configuration")?;
    info!(
        "Configuration loaded: backend={:?}, cache_dir={}, query_cache_enabled={}, query_default_ttl={:?}",
        config.backend,
        config.cache_dir.display(),
        config.query_cache_enabled,
        config.query_default_ttl
    );

    let backend: Box<dyn Cache> = match open_backend(&config) {
        Ok(backend) => backend,
        Err(err) => {
            warn!(error = %err, "Configured backend unavailable, falling back to memory");
            Box::new(MemoryCache::new())
        }
    };

    let mut cache = QueryCache::from_config(backend, &config);
    if !cache.is_enabled() {
        info!("Query cache disabled, nothing to probe");
        return Ok(());
    }

    let probe = SqlQuery::new("SELECT :probe AS probe").bind("probe", std::process::id());
    let expected = json!({"probe": std::process::id(), "ok": true});

    if !cache.set_with_ttl(&probe, expected.clone(), Some(60)) {
        error!("Probe write failed");
        bail!("cache backend rejected the probe write");
    }

    let found = cache.get(&probe);
    cache.delete(&probe);

    if found.as_ref() != Some(&expected) {
        error!(?found, "Probe read back a different value");
        bail!("cache round trip mismatch");
    }

    info!(key = %cache.key_for(&probe), "Cache round trip OK");
    Ok(())
}
