//! Cache backing stores

use crate::error::{PipelineError, StorageError};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// A stored cache payload with its write timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// Key/value backing for the TTL cache
///
/// Implementations must be safe to share between tasks. `get` reports undecodable
/// records as [`PipelineError::CacheCorruption`].
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, PipelineError>;

    /// Insert or overwrite
    fn put(&self, entry: CacheEntry) -> Result<(), PipelineError>;

    /// Returns whether an entry was removed
    fn invalidate(&self, key: &str) -> Result<bool, PipelineError>;

    fn keys(&self) -> Result<Vec<String>, PipelineError>;
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, PipelineError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, entry: CacheEntry) -> Result<(), PipelineError> {
        self.entries.write().insert(entry.key.clone(), entry);
        Ok(())
    }

    fn invalidate(&self, key: &str) -> Result<bool, PipelineError> {
        Ok(self.entries.write().remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>, PipelineError> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}

/// Sled-backed store, shared across process restarts
pub struct SledCacheStore {
    tree: sled::Tree,
}

impl SledCacheStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        let db = sled::open(path).map_err(StorageError::from)?;
        Self::from_db(&db)
    }

    pub fn from_db(db: &sled::Db) -> Result<Self, PipelineError> {
        let tree = db.open_tree("cache").map_err(StorageError::from)?;
        Ok(Self { tree })
    }

    /// Write raw bytes under a key, bypassing encoding
    #[cfg(test)]
    pub(crate) fn put_raw(&self, key: &str, bytes: &[u8]) -> Result<(), PipelineError> {
        self.tree
            .insert(key.as_bytes(), bytes)
            .map_err(StorageError::from)?;
        Ok(())
    }
}

impl CacheStore for SledCacheStore {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, PipelineError> {
        match self.tree.get(key.as_bytes()).map_err(StorageError::from)? {
            Some(bytes) => {
                let entry: CacheEntry =
                    bincode::deserialize(&bytes).map_err(|e| PipelineError::CacheCorruption {
                        key: key.to_string(),
                        reason: e.to_string(),
                    })?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    fn put(&self, entry: CacheEntry) -> Result<(), PipelineError> {
        let bytes = bincode::serialize(&entry).map_err(StorageError::from)?;
        self.tree
            .insert(entry.key.as_bytes(), bytes)
            .map_err(StorageError::from)?;
        Ok(())
    }

    fn invalidate(&self, key: &str) -> Result<bool, PipelineError> {
        let removed = self
            .tree
            .remove(key.as_bytes())
            .map_err(StorageError::from)?;
        Ok(removed.is_some())
    }

    fn keys(&self) -> Result<Vec<String>, PipelineError> {
        let mut keys = Vec::new();
        for key in self.tree.iter().keys() {
            let key = key.map_err(StorageError::from)?;
            keys.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(keys)
    }
}
