#![forbid(unsafe_code)]

//! # fermata-store
//!
//! Per-resource cache records and their persistence facade.
//!
//! A [`CacheRecord`] tracks which byte ranges of a resource are cached and
//! owns their bytes: sparse chunks while partial, one contiguous blob once
//! every byte of `[0, total_length)` has been observed. [`CacheStore`] loads
//! and saves records through a pluggable [`StoreBackend`]; [`MemStore`] is
//! the in-memory backend with lazy expiry.

mod error;
mod mem;
mod record;
mod sparse;
mod store;

pub use error::{StoreError, StoreResult};
pub use mem::MemStore;
pub use record::{CacheRecord, RecordView};
pub use sparse::SparseBytes;
pub use store::{CacheStore, StoreBackend};
