#![forbid(unsafe_code)]

//! # fermata
//!
//! A range-aware cache for progressive media playback. Players ask for byte
//! ranges of remote resources; fermata serves what it has cached, fetches
//! only the holes, coalesces concurrent fetches of the same span into one
//! network request, and remembers every byte for the next request.
//!
//! ```no_run
//! use fermata::{ByteRange, MediaCache};
//! use url::Url;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = MediaCache::new();
//! let url = Url::parse("https://cdn.example.com/track.mp3")?;
//!
//! let info = cache.content_info(&url).await?;
//! let stream = cache.request_range(&url, ByteRange::new(0, 64 * 1024)).await?;
//! let first_chunk = stream.collect().await?;
//! # let _ = (info, first_chunk);
//! # Ok(())
//! # }
//! ```

mod cache;

pub use cache::{CacheOptions, MediaCache, MediaCacheBuilder};

pub use fermata_core::{
    ByteRange, ContentInfo, CoreError, RangeSet, ResourceKey, rewrite,
};
pub use fermata_engine::{CacheError, CacheResult, DataStream, FetchCoalescer, RangeCacheEngine};
pub use fermata_net::{HttpClient, Net, NetError, NetOptions, RangeSpec};
pub use fermata_store::{CacheRecord, CacheStore, MemStore, RecordView, StoreBackend, StoreError};
