//! File Cache Module
//!
//! Durable single-host backend. Each key maps to one file named
//! `<sha256(key) hex>.cache` in a flat directory, holding the JSON form of a
//! [`CacheEntry`].
//!
//! There is no file locking. Concurrent writers to one key race (last write
//! wins), and a lazy-expiry delete can remove a file another writer just
//! replaced.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::cache::clock::{system_clock, Clock};
use crate::cache::entry::CacheEntry;
use crate::cache::{is_valid_key, Cache, FILE_SUFFIX};
use crate::error::{ConfigError, OperationError, Result};

// == File Cache ==
/// One-file-per-key cache rooted at a directory.
#[derive(Debug)]
pub struct FileCache {
    /// Directory holding the cache files
    dir: PathBuf,
    /// Time source for expiry checks
    clock: Arc<dyn Clock>,
}

impl FileCache {
    // == Constructor ==
    /// Opens (creating if needed) a cache directory on the system clock.
    ///
    /// Fails when the directory cannot be created or is not writable.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        Self::with_clock(dir, system_clock())
    }

    /// Opens a cache directory on the given clock.
    pub fn with_clock(dir: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        prepare_directory(&dir)?;

        info!(cache_dir = %dir.display(), "File cache initialized");
        Ok(Self { dir, clock })
    }

    /// Directory holding the cache files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `key`, whether or not it exists.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir.join(format!("{}{}", hex::encode(digest), FILE_SUFFIX))
    }

    // == Internal Helpers ==
    /// Reads the entry stored for `key`; `Ok(None)` when there is no file.
    fn read_entry(&self, key: &str) -> std::result::Result<Option<CacheEntry>, OperationError> {
        let bytes = match fs::read(self.path_for(key)) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let entry: CacheEntry = serde_json::from_slice(&bytes)?;
        Ok(Some(entry))
    }

    fn write_entry(&self, entry: &CacheEntry) -> std::result::Result<(), OperationError> {
        let bytes = serde_json::to_vec(entry)?;
        fs::write(self.path_for(&entry.key), bytes)?;
        Ok(())
    }

    fn remove_file(&self, key: &str) -> std::result::Result<bool, OperationError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Returns the live entry for `key`, deleting its file if it has expired.
    fn live_entry(&self, key: &str) -> Option<CacheEntry> {
        if !is_valid_key(key) {
            return None;
        }

        let entry = match self.read_entry(key) {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(err) => {
                warn!(key, error = %err, "Unreadable cache file, treating as miss");
                return None;
            }
        };

        // Digest collision or a foreign file under our name
        if entry.key != key {
            debug!(key, stored_key = %entry.key, "Cache file belongs to another key");
            return None;
        }

        if entry.is_expired(self.clock.now()) {
            debug!(key, "File cache entry expired, removing");
            if let Err(err) = self.remove_file(key) {
                warn!(key, error = %err, "Failed to remove expired cache file");
            }
            return None;
        }

        Some(entry)
    }
}

/// Ensures `dir` exists, is a directory and accepts new files.
fn prepare_directory(dir: &Path) -> Result<()> {
    if dir.exists() && !dir.is_dir() {
        return Err(ConfigError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }

    fs::create_dir_all(dir).map_err(|source| ConfigError::CacheDirectory {
        path: dir.to_path_buf(),
        source,
    })?;

    // Probe file is removed when dropped
    tempfile::Builder::new()
        .prefix(".write-probe")
        .tempfile_in(dir)
        .map_err(|source| ConfigError::DirectoryNotWritable {
            path: dir.to_path_buf(),
            source,
        })?;

    Ok(())
}

impl Cache for FileCache {
    fn lookup(&mut self, key: &str) -> Option<Value> {
        let entry = self.live_entry(key);
        if entry.is_some() {
            debug!(key, "File cache HIT");
        } else {
            debug!(key, "File cache MISS");
        }
        entry.map(|entry| entry.value)
    }

    fn set(&mut self, key: &str, value: Value, ttl: Option<u64>) -> bool {
        if !is_valid_key(key) {
            return false;
        }

        let entry = CacheEntry::new(key, value, ttl, self.clock.now());
        match self.write_entry(&entry) {
            Ok(()) => true,
            Err(err) => {
                warn!(key, error = %err, "Failed to write cache file");
                false
            }
        }
    }

    fn has(&mut self, key: &str) -> bool {
        self.live_entry(key).is_some()
    }

    /// The file is unlinked even when its entry is expired or unreadable, but
    /// only a live entry counts as deleted.
    fn delete(&mut self, key: &str) -> bool {
        if !is_valid_key(key) {
            return false;
        }

        let live = match self.read_entry(key) {
            Ok(Some(entry)) => entry.key == key && !entry.is_expired(self.clock.now()),
            Ok(None) => false,
            Err(err) => {
                debug!(key, error = %err, "Deleting unreadable cache file");
                false
            }
        };

        match self.remove_file(key) {
            Ok(removed) => removed && live,
            Err(err) => {
                warn!(key, error = %err, "Failed to delete cache file");
                false
            }
        }
    }

    fn clear(&mut self) -> bool {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(cache_dir = %self.dir.display(), error = %err, "Failed to list cache directory");
                return false;
            }
        };

        let mut ok = true;
        let mut removed = 0usize;
        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(err) => {
                    warn!(error = %err, "Failed to read cache directory entry");
                    ok = false;
                    continue;
                }
            };

            let is_cache_file = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(FILE_SUFFIX));
            if !is_cache_file || !path.is_file() {
                continue;
            }

            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Failed to remove cache file");
                    ok = false;
                }
            }
        }

        info!(removed, "File cache cleared");
        ok
    }
}
