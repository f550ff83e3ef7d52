#![forbid(unsafe_code)]

use thiserror::Error;

/// Store and record errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The underlying key-value store failed. The engine treats the
    /// resource as uncached for the operation rather than failing it.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Merge called with a byte buffer that does not match its range.
    #[error("merge length mismatch: range wants {expected} bytes, got {actual}")]
    LengthMismatch { expected: u64, actual: u64 },

    /// A later content-info observation reported a different total length;
    /// the cached partial data is stale and must be discarded.
    #[error("resource metadata conflict: cached total length {known}, observed {observed}")]
    MetadataConflict { known: u64, observed: u64 },
}

pub type StoreResult<T> = Result<T, StoreError>;
