//! Content-addressed response cache on local disk.
//!
//! Each key is hashed with SHA-256 and stored as `<digest>.json` holding the
//! time it was written and the raw payload. Keys may carry credentials, so
//! log lines name the entry file instead. The cache is an optimization:
//! read and write failures are logged and reported as misses, never raised.

use crate::config::CacheConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Outcome of a cache read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// Fresh entry found
    Hit(String),
    /// No entry, or the entry is older than the TTL
    Miss,
    /// Entry exists but could not be read; already logged
    Error(String),
}

/// On-disk layout of one cache file
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheEntry {
    pub stored_at: DateTime<Utc>,
    pub payload: String,
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
    ttl: Option<Duration>,
}

impl CacheStore {
    /// Open a cache rooted at `dir`. `ttl = None` disables expiry.
    pub fn new(dir: impl Into<PathBuf>, ttl: Option<Duration>) -> Self {
        let dir = dir.into();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!("Failed to create cache directory {:?}: {}", dir, e);
        }
        Self { dir, ttl }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.dir.clone(), config.ttl())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File that holds the entry for `key`
    pub fn entry_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir.join(format!("{digest:x}.json"))
    }

    pub async fn get(&self, key: &str) -> CacheLookup {
        let path = self.entry_path(key);

        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return CacheLookup::Miss,
            Err(e) => {
                warn!("Failed reading cache entry {}: {}", path.display(), e);
                return CacheLookup::Error(e.to_string());
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Corrupt cache entry {}: {}", path.display(), e);
                return CacheLookup::Error(e.to_string());
            }
        };

        if self.is_expired(&entry) {
            debug!("Cache expired: {}", path.display());
            return CacheLookup::Miss;
        }

        debug!("Cache hit: {}", path.display());
        CacheLookup::Hit(entry.payload)
    }

    /// Store `payload` under `key`. Failures are logged and dropped.
    pub async fn put(&self, key: &str, payload: &str) {
        let path = self.entry_path(key);
        let entry = CacheEntry {
            stored_at: Utc::now(),
            payload: payload.to_string(),
        };

        let body = match serde_json::to_vec(&entry) {
            Ok(body) => body,
            Err(e) => {
                error!("Failed encoding cache entry {}: {}", path.display(), e);
                return;
            }
        };

        // Readers must never observe a half-written file
        let tmp = path.with_extension("json.tmp");
        if let Err(e) = tokio::fs::write(&tmp, &body).await {
            error!("Failed writing cache entry {}: {}", path.display(), e);
            return;
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            error!("Failed writing cache entry {}: {}", path.display(), e);
            let _ = tokio::fs::remove_file(&tmp).await;
        }
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        let Some(ttl) = self.ttl else {
            return false;
        };
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return false;
        };
        Utc::now().signed_duration_since(entry.stored_at) > ttl
    }
}
