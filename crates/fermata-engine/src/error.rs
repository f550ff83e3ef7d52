#![forbid(unsafe_code)]

use fermata_net::NetError;
use thiserror::Error;

/// Centralized error type for the cache engine.
#[derive(Debug, Error, Clone)]
pub enum CacheError {
    /// Zero-length or otherwise unservable range, rejected before any
    /// network or store work.
    #[error("invalid range: offset {start}, length {length}")]
    InvalidRange { start: u64, length: u64 },
    #[error(transparent)]
    Net(#[from] NetError),
    #[error("store failure: {0}")]
    Store(String),
    #[error("request cancelled")]
    Cancelled,
}

pub type CacheResult<T> = Result<T, CacheError>;
