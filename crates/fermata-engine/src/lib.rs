#![forbid(unsafe_code)]

//! # fermata-engine
//!
//! The cache-first range engine: [`RangeCacheEngine`] plans each request
//! against the cached coverage of the resource, fetches only the holes
//! ([`FetchCoalescer`] shares in-flight fetches across requests), streams
//! bytes in ascending offset order, and merges fetched spans back into the
//! store for the next request.

mod coalescer;
mod engine;
mod error;
mod stream;

pub use coalescer::{FetchCoalescer, FetchEvent, FetchHandle};
pub use engine::RangeCacheEngine;
pub use error::{CacheError, CacheResult};
pub use stream::DataStream;
