#![forbid(unsafe_code)]

use async_trait::async_trait;
use fermata_core::ContentInfo;
use futures::TryStreamExt;
use reqwest::Client;
use url::Url;

use crate::{
    error::{NetError, NetResult},
    info::{content_range_start, parse_content_info},
    traits::{ByteStream, Net},
    types::{Headers, NetOptions, RangeSpec},
};

/// Reqwest-backed [`Net`] implementation.
#[derive(Clone, Debug)]
pub struct HttpClient {
    inner: Client,
    options: NetOptions,
}

impl HttpClient {
    /// # Panics
    ///
    /// Panics if the `reqwest::Client` builder fails to build.
    #[must_use]
    pub fn new(options: NetOptions) -> Self {
        let inner = Client::builder()
            .pool_max_idle_per_host(options.pool_max_idle_per_host)
            .build()
            .expect("failed to build reqwest client");
        Self { inner, options }
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(NetOptions::default())
    }
}

#[async_trait]
impl Net for HttpClient {
    async fn content_info(&self, url: &Url) -> NetResult<ContentInfo> {
        let req = self
            .inner
            .head(url.clone())
            .timeout(self.options.request_timeout);

        let resp = req.send().await.map_err(NetError::from)?;
        let status = resp.status();

        if !status.is_success() {
            return Err(NetError::http_status(status.as_u16(), url.to_string()));
        }

        let mut headers = Headers::new();
        for (name, value) in resp.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.as_str(), v);
            }
        }

        let info = parse_content_info(&headers)?;
        tracing::debug!(
            url = %url,
            total_length = info.total_length,
            supports_ranges = info.supports_ranges,
            "content-info probe"
        );
        Ok(info)
    }

    async fn fetch_range(&self, url: &Url, range: Option<RangeSpec>) -> NetResult<ByteStream> {
        let mut req = self.inner.get(url.clone());
        if let Some(range) = range {
            req = req.header("Range", range.to_header_value());
        }
        // No timeout on the body: range downloads may take arbitrary time.

        let resp = req.send().await.map_err(NetError::from)?;
        let status = resp.status();

        if let Some(range) = range {
            // A server that ignores `Range` answers 200 with the full body.
            // Accepting that here would file bytes from offset 0 under the
            // requested offsets, so only 206 with a matching start passes.
            if status.as_u16() != 206 {
                if status.is_success() {
                    return Err(NetError::InvalidResponse(format!(
                        "ranged request answered with {} instead of 206 by {url}",
                        status.as_u16()
                    )));
                }
                return Err(NetError::http_status(status.as_u16(), url.to_string()));
            }
            let served_start = resp
                .headers()
                .get("content-range")
                .and_then(|v| v.to_str().ok())
                .and_then(content_range_start);
            if let Some(served) = served_start
                && served != range.start
            {
                return Err(NetError::InvalidResponse(format!(
                    "Content-Range starts at {served}, requested {}",
                    range.start
                )));
            }
        } else if !status.is_success() {
            return Err(NetError::http_status(status.as_u16(), url.to_string()));
        }

        let stream = resp.bytes_stream().map_err(NetError::from);
        Ok(Box::pin(stream))
    }
}
