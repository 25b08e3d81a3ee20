//! Cache gate and cache writer
//!
//! The gate decides, per key, whether content comes from the local cache or
//! from the network. It only probes the filesystem. Writing is the caller's
//! job and goes through [`CacheWriter`], which replaces files atomically so a
//! reader never observes a partial page.

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::codec::{ResourceLocator, UrlCodec};
use crate::error::{LocatorError, PersistError};
use crate::key::EntityKey;

/// Decides between a cached and a remote fetch for a key
#[derive(Debug, Clone)]
pub struct CacheGate {
    codec: Arc<UrlCodec>,
}

impl CacheGate {
    pub fn new(codec: Arc<UrlCodec>) -> Self {
        Self { codec }
    }

    pub fn codec(&self) -> &UrlCodec {
        &self.codec
    }

    /// Return the local locator when a cache file exists for `key`, the
    /// remote locator otherwise
    pub fn resolve_fetch_target(&self, key: &EntityKey) -> Result<ResourceLocator, LocatorError> {
        let local = self.codec.local_path(key)?;
        if local.is_file() {
            tracing::debug!(key = %key, path = %local.display(), "cache hit");
            Ok(ResourceLocator::local(&local))
        } else {
            let remote = self.codec.encode_remote(key)?;
            tracing::debug!(key = %key, url = %remote, "cache miss");
            Ok(remote)
        }
    }

    /// Whether a cache file exists for `key`
    pub fn is_cached(&self, key: &EntityKey) -> bool {
        self.codec
            .local_path(key)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Writes fetched pages into the cache
#[derive(Debug, Clone)]
pub struct CacheWriter {
    codec: Arc<UrlCodec>,
}

impl CacheWriter {
    pub fn new(codec: Arc<UrlCodec>) -> Self {
        Self { codec }
    }

    /// Store `body` as the cache file for `key` and return its path
    ///
    /// Concurrent writers of the same key race safely: each writes its own
    /// temporary file and the last rename wins.
    pub async fn persist(&self, key: &EntityKey, body: &[u8]) -> Result<PathBuf, PersistError> {
        let path = self.codec.local_path(key).map_err(|e| PersistError {
            path: self.codec.cache_dir().to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
        })?;
        write_atomic(&path, body).await?;
        tracing::info!(key = %key, path = %path.display(), bytes = body.len(), "cached page");
        Ok(path)
    }
}

/// Write `body` to a sibling temporary file, then rename it over `path`
pub async fn write_atomic(path: &Path, body: &[u8]) -> Result<(), PersistError> {
    let err = |source| PersistError {
        path: path.to_path_buf(),
        source,
    };
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(parent).await.map_err(err)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(
        ".{}.{}.{}.tmp",
        file_name,
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    if let Err(e) = tokio::fs::write(&tmp, body).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(err(e));
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(err(e));
    }
    Ok(())
}
