#![forbid(unsafe_code)]

//! In-memory store backend.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use fermata_core::ResourceKey;

use crate::error::StoreResult;
use crate::record::CacheRecord;
use crate::store::StoreBackend;

struct Entry {
    record: CacheRecord,
    deadline: Option<Instant>,
}

/// In-memory [`StoreBackend`] keyed by [`ResourceKey`].
///
/// Expiry is lazy: an entry past its deadline is dropped on the next `get`.
/// There is no background sweeper; eviction pressure is an external policy.
#[derive(Default)]
pub struct MemStore {
    entries: DashMap<ResourceKey, Entry>,
}

impl MemStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (non-expired) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|e| e.deadline.is_none_or(|d| d > now))
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StoreBackend for MemStore {
    fn get(&self, key: &ResourceKey) -> StoreResult<Option<CacheRecord>> {
        if let Some(entry) = self.entries.get(key) {
            if entry.deadline.is_some_and(|d| d <= Instant::now()) {
                drop(entry);
                self.entries.remove(key);
                return Ok(None);
            }
            return Ok(Some(entry.record.clone()));
        }
        Ok(None)
    }

    fn set(
        &self,
        key: &ResourceKey,
        record: CacheRecord,
        expiry: Option<Duration>,
    ) -> StoreResult<()> {
        let deadline = expiry.map(|ttl| Instant::now() + ttl);
        self.entries.insert(key.clone(), Entry { record, deadline });
        Ok(())
    }

    fn delete(&self, key: &ResourceKey) -> StoreResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}
