#![forbid(unsafe_code)]

//! Persistence facade over a pluggable key-value record store.

use std::sync::Arc;
use std::time::Duration;

use fermata_core::ResourceKey;

use crate::error::StoreResult;
use crate::record::CacheRecord;

/// Generic key-value store of cache records.
///
/// `set` replaces the whole record for a key atomically (last-writer-wins
/// at record granularity; the engine serializes writers per resource key).
/// Implementations may honor `expiry` however suits them; [`MemStore`]
/// drops expired entries lazily on `get`.
///
/// [`MemStore`]: crate::MemStore
pub trait StoreBackend: Send + Sync {
    /// # Errors
    ///
    /// [`StoreError::Unavailable`](crate::StoreError::Unavailable) on
    /// backend I/O failure.
    fn get(&self, key: &ResourceKey) -> StoreResult<Option<CacheRecord>>;

    /// # Errors
    ///
    /// [`StoreError::Unavailable`](crate::StoreError::Unavailable) on
    /// backend I/O failure.
    fn set(
        &self,
        key: &ResourceKey,
        record: CacheRecord,
        expiry: Option<Duration>,
    ) -> StoreResult<()>;

    /// # Errors
    ///
    /// [`StoreError::Unavailable`](crate::StoreError::Unavailable) on
    /// backend I/O failure.
    fn delete(&self, key: &ResourceKey) -> StoreResult<()>;
}

/// Load/save facade the engine talks to.
///
/// Owns the default expiry policy; callers may override per write.
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn StoreBackend>,
    default_expiry: Option<Duration>,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn StoreBackend>, default_expiry: Option<Duration>) -> Self {
        Self {
            backend,
            default_expiry,
        }
    }

    /// # Errors
    ///
    /// Propagates backend failure; callers decide whether to fail open.
    pub fn load(&self, key: &ResourceKey) -> StoreResult<Option<CacheRecord>> {
        self.backend.get(key)
    }

    /// Replace the record for `key`. `expiry` falls back to the store's
    /// default when `None`.
    ///
    /// # Errors
    ///
    /// Propagates backend failure.
    pub fn save(
        &self,
        key: &ResourceKey,
        record: CacheRecord,
        expiry: Option<Duration>,
    ) -> StoreResult<()> {
        self.backend.set(key, record, expiry.or(self.default_expiry))
    }

    /// # Errors
    ///
    /// Propagates backend failure.
    pub fn remove(&self, key: &ResourceKey) -> StoreResult<()> {
        self.backend.delete(key)
    }
}
