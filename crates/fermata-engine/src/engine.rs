#![forbid(unsafe_code)]

//! The range cache orchestrator: cache-first range requests with gap
//! fetching, merge-back, and per-resource serialization.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use fermata_core::{ByteRange, ContentInfo, ResourceKey, rewrite};
use fermata_net::{Net, NetError};
use fermata_store::{CacheRecord, CacheStore, StoreError};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::coalescer::{FetchCoalescer, FetchEvent, FetchHandle};
use crate::error::{CacheError, CacheResult};
use crate::stream::DataStream;

/// One planned slice of a range request, ascending by offset.
enum Segment {
    /// Snapshot of already-cached bytes.
    Cached(Bytes),
    /// A hole to fetch; the handle was registered while planning, under the
    /// resource's domain, so concurrent planners share the fetch.
    Gap { range: ByteRange, handle: FetchHandle },
}

/// Range-aware cache engine.
///
/// Serves byte ranges of remote resources cache-first: cached spans come
/// from the store, holes are fetched (coalesced with any concurrent fetch of
/// the same span) and merged back for the next request. All mutations of one
/// resource's record are serialized on a per-key async mutex; distinct
/// resources never contend.
///
/// Accepts both original and intercepted URLs; intercepted ones are restored
/// before keying and fetching, so both name the same cache entry.
#[derive(Clone)]
pub struct RangeCacheEngine {
    store: CacheStore,
    coalescer: FetchCoalescer,
    domains: Arc<DashMap<ResourceKey, Arc<Mutex<()>>>>,
}

impl RangeCacheEngine {
    pub fn new(net: Arc<dyn Net>, store: CacheStore) -> Self {
        Self {
            store,
            coalescer: FetchCoalescer::new(net),
            domains: Arc::new(DashMap::new()),
        }
    }

    /// Content info for the resource at `url`, cached after the first probe.
    ///
    /// A probe observing a `total_length` that contradicts the cached one
    /// means the resource changed upstream: the stale record (bytes and all)
    /// is discarded and the fresh info is returned.
    ///
    /// # Errors
    ///
    /// [`CacheError::Net`] when the probe fails, [`CacheError::Store`] when
    /// the record cannot be updated.
    pub async fn content_info(&self, url: &Url) -> CacheResult<ContentInfo> {
        let origin = rewrite::to_original(url);
        let key = ResourceKey::from_url(&origin);

        {
            let domain = self.domain(&key);
            let _guard = domain.lock().await;
            if let Ok(Some(record)) = self.store.load(&key)
                && let Some(info) = record.content_info()
            {
                tracing::debug!(%key, "content info served from cache");
                return Ok(info);
            }
        }

        // Probe outside the domain so slow HEADs don't block merges.
        let info = self.coalescer.content_info(&key, &origin).await?;

        let domain = self.domain(&key);
        let _guard = domain.lock().await;
        let mut record = self.load_or_empty(&key);
        match record.record_content_info(&info) {
            Ok(()) => {}
            Err(StoreError::MetadataConflict { known, observed }) => {
                tracing::warn!(
                    %key,
                    known,
                    observed,
                    "resource changed upstream; discarding cached bytes"
                );
                record = CacheRecord::new_partial();
                record
                    .record_content_info(&info)
                    .map_err(|e| CacheError::Store(e.to_string()))?;
            }
            Err(other) => return Err(CacheError::Store(other.to_string())),
        }
        if let Err(error) = self.store.save(&key, record, None) {
            tracing::warn!(%key, %error, "failed to persist content info");
        }

        Ok(info)
    }

    /// Request `range` of the resource at `url`.
    ///
    /// Fully cached ranges are served synchronously; otherwise the returned
    /// stream interleaves cached spans with freshly fetched gaps, strictly
    /// ascending, and each completed gap is merged back into the cache.
    /// When the total length is known, the range is clipped to it.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidRange`] for zero-length ranges and ranges
    /// entirely past the end of the resource. Fetch and store failures
    /// arrive as the stream's terminal item.
    pub async fn request_range(&self, url: &Url, range: ByteRange) -> CacheResult<DataStream> {
        if range.is_empty() {
            return Err(CacheError::InvalidRange {
                start: range.start,
                length: range.length,
            });
        }

        let origin = rewrite::to_original(url);
        let key = ResourceKey::from_url(&origin);
        let domain = self.domain(&key);

        let segments = {
            let _guard = domain.lock().await;
            let record = self.load_or_empty(&key);

            let range = match record.total_length() {
                Some(total) => {
                    let clipped = ByteRange::from_bounds(range.start, range.end().min(total));
                    if clipped.is_empty() {
                        return Err(CacheError::InvalidRange {
                            start: range.start,
                            length: range.length,
                        });
                    }
                    clipped
                }
                None => range,
            };

            if let Some(bytes) = record.read_range(range) {
                tracing::debug!(%key, %range, "served from cache");
                return Ok(DataStream::from_cached(bytes));
            }

            self.plan_segments(&key, &origin, &record, range)?
        };

        let gaps = segments
            .iter()
            .filter(|s| matches!(s, Segment::Gap { .. }))
            .count();
        tracing::debug!(%key, %range, gaps, "fetching gaps");

        let (tx, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let driver = Driver {
            key,
            domain,
            store: self.store.clone(),
            tx,
            cancel: cancel.clone(),
        };
        tokio::spawn(driver.run(segments));

        Ok(DataStream::new(rx, cancel))
    }

    /// Drop the cached record for the resource at `url`.
    ///
    /// # Errors
    ///
    /// [`CacheError::Store`] on backend failure.
    pub async fn evict(&self, url: &Url) -> CacheResult<()> {
        let origin = rewrite::to_original(url);
        let key = ResourceKey::from_url(&origin);
        let domain = self.domain(&key);
        {
            let _guard = domain.lock().await;
            self.store
                .remove(&key)
                .map_err(|e| CacheError::Store(e.to_string()))?;
        }
        drop(domain);
        // Release the key's mutex slot so the map doesn't grow by one entry
        // per resource ever touched. Only an unshared slot is dropped; a
        // concurrent holder keeps its clone and a fresh slot appears on the
        // next access.
        self.domains
            .remove_if(&key, |_, slot| Arc::strong_count(slot) == 1);
        Ok(())
    }

    /// Alternating cached/gap segments covering `range`, ascending. Gap
    /// handles are registered here, while the caller holds the domain.
    fn plan_segments(
        &self,
        key: &ResourceKey,
        origin: &Url,
        record: &CacheRecord,
        range: ByteRange,
    ) -> CacheResult<Vec<Segment>> {
        let mut segments = Vec::new();
        let mut cursor = range.start;
        for gap in record.gaps(range) {
            if gap.start > cursor {
                segments.push(self.cached_segment(record, cursor, gap.start)?);
            }
            segments.push(Segment::Gap {
                range: gap,
                handle: self.coalescer.fetch(key, origin, gap),
            });
            cursor = gap.end();
        }
        if cursor < range.end() {
            segments.push(self.cached_segment(record, cursor, range.end())?);
        }
        Ok(segments)
    }

    fn cached_segment(&self, record: &CacheRecord, start: u64, end: u64) -> CacheResult<Segment> {
        let span = ByteRange::from_bounds(start, end);
        record
            .read_range(span)
            .map(Segment::Cached)
            // Spans between gaps are covered by construction.
            .ok_or_else(|| CacheError::Store("coverage set and stored chunks disagree".into()))
    }

    fn domain(&self, key: &ResourceKey) -> Arc<Mutex<()>> {
        self.domains.entry(key.clone()).or_default().clone()
    }

    fn load_or_empty(&self, key: &ResourceKey) -> CacheRecord {
        match self.store.load(key) {
            Ok(Some(record)) => record,
            Ok(None) => CacheRecord::new_partial(),
            Err(error) => {
                tracing::warn!(%key, %error, "store unavailable; treating resource as uncached");
                CacheRecord::new_partial()
            }
        }
    }
}

/// Flushes one request's segments in ascending order and merges completed
/// gaps back into the store.
struct Driver {
    key: ResourceKey,
    domain: Arc<Mutex<()>>,
    store: CacheStore,
    tx: mpsc::Sender<CacheResult<Bytes>>,
    cancel: CancellationToken,
}

impl Driver {
    async fn run(self, segments: Vec<Segment>) {
        for segment in segments {
            match segment {
                Segment::Cached(bytes) => {
                    if self.send(Ok(bytes)).await.is_err() {
                        return;
                    }
                }
                Segment::Gap { range, mut handle } => {
                    let mut buf = BytesMut::with_capacity(range.length as usize);
                    let failure = loop {
                        tokio::select! {
                            () = self.cancel.cancelled() => {
                                let _ = self.tx.try_send(Err(CacheError::Cancelled));
                                return;
                            }
                            event = handle.next_event() => match event {
                                FetchEvent::Chunk(chunk) => {
                                    buf.extend_from_slice(&chunk);
                                    if self.send(Ok(chunk)).await.is_err() {
                                        return;
                                    }
                                }
                                FetchEvent::Complete => {
                                    if buf.len() as u64 == range.length {
                                        break None;
                                    }
                                    break Some(NetError::ShortBody {
                                        expected: range.length,
                                        got: buf.len() as u64,
                                    });
                                }
                                FetchEvent::Failed(error) => break Some(error),
                            }
                        }
                    };

                    if let Some(error) = failure {
                        tracing::warn!(key = %self.key, %range, %error, "gap fetch failed");
                        let _ = self.send(Err(CacheError::Net(error))).await;
                        return;
                    }
                    self.merge_gap(range, buf.freeze()).await;
                }
            }
        }
        tracing::debug!(key = %self.key, "range request completed");
    }

    /// Merge fetched gap bytes under the resource's domain, re-loading the
    /// record so concurrent merges are preserved. Merging a span another
    /// request already covered is a safe rewrite of identical bytes.
    async fn merge_gap(&self, range: ByteRange, bytes: Bytes) {
        let _guard = self.domain.lock().await;
        let mut record = match self.store.load(&self.key) {
            Ok(Some(record)) => record,
            Ok(None) => CacheRecord::new_partial(),
            Err(error) => {
                tracing::warn!(key = %self.key, %error, "store unavailable; merge starts fresh");
                CacheRecord::new_partial()
            }
        };
        if let Err(error) = record.merge(range, bytes) {
            tracing::warn!(key = %self.key, %range, %error, "merge rejected; bytes not cached");
            return;
        }
        if let Err(error) = self.store.save(&self.key, record, None) {
            tracing::warn!(key = %self.key, %error, "failed to persist merged gap");
        }
    }

    async fn send(&self, item: CacheResult<Bytes>) -> Result<(), ()> {
        tokio::select! {
            () = self.cancel.cancelled() => Err(()),
            sent = self.tx.send(item) => sent.map_err(|_| ()),
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use fermata_net::{ByteStream, NetResult, RangeSpec};
    use fermata_store::MemStore;

    use super::*;

    struct StaticNet;

    #[async_trait]
    impl Net for StaticNet {
        async fn content_info(&self, _url: &Url) -> NetResult<ContentInfo> {
            Ok(ContentInfo::new(100).with_range_support(true))
        }

        async fn fetch_range(
            &self,
            _url: &Url,
            _range: Option<RangeSpec>,
        ) -> NetResult<ByteStream> {
            Ok(Box::pin(futures::stream::empty::<Result<Bytes, NetError>>()))
        }
    }

    fn engine() -> RangeCacheEngine {
        RangeCacheEngine::new(
            Arc::new(StaticNet),
            CacheStore::new(Arc::new(MemStore::new()), None),
        )
    }

    #[tokio::test]
    async fn evict_releases_the_resource_domain() {
        let engine = engine();
        let url = Url::parse("https://cdn.example.com/a.mp3").unwrap();

        engine.content_info(&url).await.unwrap();
        assert_eq!(engine.domains.len(), 1);

        engine.evict(&url).await.unwrap();
        assert!(engine.domains.is_empty());
    }

    #[tokio::test]
    async fn evicted_resources_do_not_accumulate_domains() {
        let engine = engine();
        for i in 0..32 {
            let url = Url::parse(&format!("https://cdn.example.com/{i}.mp3")).unwrap();
            engine.content_info(&url).await.unwrap();
            engine.evict(&url).await.unwrap();
        }
        assert!(engine.domains.is_empty());
    }
}
