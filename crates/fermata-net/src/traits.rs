#![forbid(unsafe_code)]

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use fermata_core::ContentInfo;
use futures::Stream;
use url::Url;

use crate::error::NetError;
use crate::types::RangeSpec;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, NetError>> + Send>>;

/// Range-capable fetch client, the cache engine's only view of the network.
#[async_trait]
pub trait Net: Send + Sync {
    /// Probe resource metadata (HEAD).
    async fn content_info(&self, url: &Url) -> Result<ContentInfo, NetError>;

    /// Stream bytes from a URL. `None` fetches the whole resource.
    async fn fetch_range(&self, url: &Url, range: Option<RangeSpec>)
    -> Result<ByteStream, NetError>;
}
