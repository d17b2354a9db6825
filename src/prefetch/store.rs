//! Persistent storage for downloaded resources.
//!
//! # File Layout
//! ```text
//! {root}/{cache_name}/{sha256(url)}
//! ```
//!
//! The URL is hashed to get a file name that is safe on every platform.
//! Writes go to a temporary file and are renamed into place, so re-storing
//! the same URL replaces the entry atomically.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::prefetch::messages::CacheName;

/// Extension prefix of files still being written.
const TMP_PREFIX: &str = "tmp-";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Named binary caches addressed by request URL.
#[async_trait]
pub trait TileStore: Send + Sync {
    /// Store `data` under `url`, replacing any previous entry.
    async fn put(&self, cache: CacheName, url: &str, data: Bytes) -> Result<(), StoreError>;

    async fn get(&self, cache: CacheName, url: &str) -> Result<Option<Bytes>, StoreError>;

    /// Remove every entry of one named cache.
    async fn clear(&self, cache: CacheName) -> Result<(), StoreError>;

    /// Bytes held by one named cache.
    async fn size(&self, cache: CacheName) -> Result<u64, StoreError>;

    /// Bytes held across all named caches.
    async fn total_size(&self) -> Result<u64, StoreError> {
        let mut total = 0;
        for cache in CacheName::ALL {
            total += self.size(cache).await?;
        }
        Ok(total)
    }
}

/// Process-local store, used by tests and as a fallback when no cache
/// directory is configured.
#[derive(Debug, Default)]
pub struct MemoryTileStore {
    entries: DashMap<(CacheName, String), Bytes>,
}

impl MemoryTileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, cache: CacheName) -> usize {
        self.entries.iter().filter(|e| e.key().0 == cache).count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl TileStore for MemoryTileStore {
    async fn put(&self, cache: CacheName, url: &str, data: Bytes) -> Result<(), StoreError> {
        self.entries.insert((cache, url.to_string()), data);
        Ok(())
    }

    async fn get(&self, cache: CacheName, url: &str) -> Result<Option<Bytes>, StoreError> {
        Ok(self.entries.get(&(cache, url.to_string())).map(|e| e.value().clone()))
    }

    async fn clear(&self, cache: CacheName) -> Result<(), StoreError> {
        self.entries.retain(|(name, _), _| *name != cache);
        Ok(())
    }

    async fn size(&self, cache: CacheName) -> Result<u64, StoreError> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.key().0 == cache)
            .map(|e| e.value().len() as u64)
            .sum())
    }
}

/// One directory per named cache under `root`.
#[derive(Debug, Clone)]
pub struct DiskTileStore {
    root: PathBuf,
}

impl DiskTileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn dir(&self, cache: CacheName) -> PathBuf {
        self.root.join(cache.as_str())
    }

    fn is_partial(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.starts_with(TMP_PREFIX))
    }

    fn path_for(&self, cache: CacheName, url: &str) -> PathBuf {
        let digest = Sha256::digest(url.as_bytes());
        self.dir(cache).join(format!("{:x}", digest))
    }
}

#[async_trait]
impl TileStore for DiskTileStore {
    async fn put(&self, cache: CacheName, url: &str, data: Bytes) -> Result<(), StoreError> {
        let dir = self.dir(cache);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::io(&dir, e))?;

        let path = self.path_for(cache, url);
        let tmp = path.with_extension(format!("{}{}", TMP_PREFIX, uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, &data)
            .await
            .map_err(|e| StoreError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::io(&path, e))
    }

    async fn get(&self, cache: CacheName, url: &str) -> Result<Option<Bytes>, StoreError> {
        let path = self.path_for(cache, url);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    async fn clear(&self, cache: CacheName) -> Result<(), StoreError> {
        let dir = self.dir(cache);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&dir, e)),
        }
    }

    async fn size(&self, cache: CacheName) -> Result<u64, StoreError> {
        let dir = self.dir(cache);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(StoreError::io(&dir, e)),
        };

        let mut total = 0;
        while let Some(entry) = entries.next_entry().await.map_err(|e| StoreError::io(&dir, e))? {
            let path = entry.path();
            if Self::is_partial(&path) {
                continue;
            }
            let metadata = entry.metadata().await.map_err(|e| StoreError::io(&path, e))?;
            if metadata.is_file() {
                total += metadata.len();
            }
        }
        Ok(total)
    }
}
