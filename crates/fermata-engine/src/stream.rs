#![forbid(unsafe_code)]

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::CacheResult;

/// Ordered byte delivery for one range request.
///
/// Chunks arrive in ascending offset order and concatenate to exactly the
/// requested range; an `Err` item is terminal. Dropping the stream cancels
/// the request: undelivered bytes are discarded, already-merged bytes stay
/// cached.
pub struct DataStream {
    rx: mpsc::Receiver<CacheResult<Bytes>>,
    cancel: CancellationToken,
}

impl DataStream {
    pub(crate) fn new(rx: mpsc::Receiver<CacheResult<Bytes>>, cancel: CancellationToken) -> Self {
        Self { rx, cancel }
    }

    /// Stream that yields `bytes` as a single chunk, for cache hits.
    pub(crate) fn from_cached(bytes: Bytes) -> Self {
        let (tx, rx) = mpsc::channel(1);
        // A fresh channel with capacity one always accepts the send.
        let _ = tx.try_send(Ok(bytes));
        Self {
            rx,
            cancel: CancellationToken::new(),
        }
    }

    /// Cancel the request without dropping the stream. Any in-flight fetch
    /// whose last consumer this was is cancelled too.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Drain the stream into one buffer.
    ///
    /// # Errors
    ///
    /// The stream's terminal [`CacheError`](crate::CacheError), if it
    /// failed.
    pub async fn collect(mut self) -> CacheResult<Bytes> {
        let mut out = BytesMut::new();
        while let Some(item) = self.rx.recv().await {
            out.extend_from_slice(&item?);
        }
        Ok(out.freeze())
    }
}

impl Stream for DataStream {
    type Item = CacheResult<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for DataStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
