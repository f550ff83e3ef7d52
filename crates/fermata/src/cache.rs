#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use fermata_core::{ByteRange, ContentInfo, CoreResult, rewrite};
use fermata_engine::{CacheResult, DataStream, RangeCacheEngine};
use fermata_net::{HttpClient, Net, NetOptions};
use fermata_store::{CacheStore, MemStore, StoreBackend};
use url::Url;

/// Cache-wide configuration.
#[derive(Clone, Debug)]
pub struct CacheOptions {
    /// Scheme given to intercepted URLs handed to the player.
    pub intercept_scheme: String,
    /// TTL applied to every cache write; `None` keeps records until evicted.
    pub default_expiry: Option<Duration>,
    pub net: NetOptions,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            intercept_scheme: rewrite::DEFAULT_INTERCEPT_SCHEME.to_string(),
            default_expiry: None,
            net: NetOptions::default(),
        }
    }
}

/// Builder for [`MediaCache`]; swap the network or store seam for tests or
/// alternative backends.
#[derive(Default)]
pub struct MediaCacheBuilder {
    options: CacheOptions,
    backend: Option<Arc<dyn StoreBackend>>,
    net: Option<Arc<dyn Net>>,
}

impl MediaCacheBuilder {
    #[must_use]
    pub fn options(mut self, options: CacheOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn backend(mut self, backend: Arc<dyn StoreBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    #[must_use]
    pub fn net(mut self, net: Arc<dyn Net>) -> Self {
        self.net = Some(net);
        self
    }

    #[must_use]
    pub fn build(self) -> MediaCache {
        let net = self
            .net
            .unwrap_or_else(|| Arc::new(HttpClient::new(self.options.net.clone())));
        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(MemStore::new()));
        let store = CacheStore::new(backend, self.options.default_expiry);
        MediaCache {
            engine: RangeCacheEngine::new(net, store),
            intercept_scheme: self.options.intercept_scheme,
        }
    }
}

/// Range-aware media cache.
///
/// Byte ranges of remote resources are served cache-first; holes are fetched
/// over HTTP (one network request per hole, shared across concurrent
/// consumers) and kept for the next request. URLs rewritten with
/// [`intercept_url`](Self::intercept_url) and original URLs address the same
/// cache entries.
#[derive(Clone)]
pub struct MediaCache {
    engine: RangeCacheEngine,
    intercept_scheme: String,
}

impl Default for MediaCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaCache {
    /// Cache with default options: HTTP networking, in-memory store, no
    /// expiry.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    #[must_use]
    pub fn builder() -> MediaCacheBuilder {
        MediaCacheBuilder::default()
    }

    /// Rewrite `url` onto the cache's intercept scheme, for handing to a
    /// player whose resource loading should be routed through this cache.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidUrl`](fermata_core::CoreError::InvalidUrl) when
    /// the URL cannot carry the scheme swap.
    pub fn intercept_url(&self, url: &Url) -> CoreResult<Url> {
        rewrite::to_intercept(url, &self.intercept_scheme)
    }

    /// Resource metadata (length, mime, range support), probed once and
    /// cached.
    ///
    /// # Errors
    ///
    /// See [`RangeCacheEngine::content_info`].
    pub async fn content_info(&self, url: &Url) -> CacheResult<ContentInfo> {
        self.engine.content_info(url).await
    }

    /// Stream `range` of the resource at `url`, cache-first.
    ///
    /// # Errors
    ///
    /// See [`RangeCacheEngine::request_range`].
    pub async fn request_range(&self, url: &Url, range: ByteRange) -> CacheResult<DataStream> {
        self.engine.request_range(url, range).await
    }

    /// Drop everything cached for the resource at `url`.
    ///
    /// # Errors
    ///
    /// See [`RangeCacheEngine::evict`].
    pub async fn evict(&self, url: &Url) -> CacheResult<()> {
        self.engine.evict(url).await
    }
}
