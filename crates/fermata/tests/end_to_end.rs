use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Router,
    extract::State,
    http::{HeaderMap, Method, StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use bytes::Bytes;
use fermata::{ByteRange, CacheError, MediaCache, MemStore, ResourceKey, StoreBackend};
use rstest::rstest;
use tokio::net::TcpListener;
use url::Url;

const TRACK_LEN: usize = 4096;

#[derive(Clone)]
struct TrackState {
    body: Bytes,
    /// Byte ranges served to GET requests carrying a `Range` header.
    served: Arc<Mutex<Vec<(usize, usize)>>>,
}

impl TrackState {
    fn new() -> Self {
        let body: Bytes = (0..TRACK_LEN)
            .map(|i| (i % 251) as u8)
            .collect::<Vec<_>>()
            .into();
        Self {
            body,
            served: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn served(&self) -> Vec<(usize, usize)> {
        self.served.lock().unwrap().clone()
    }
}

async fn track(
    State(state): State<TrackState>,
    method: Method,
    headers: HeaderMap,
) -> impl IntoResponse {
    let mut resp_headers = HeaderMap::new();
    resp_headers.insert(header::CONTENT_TYPE, "audio/mpeg".parse().unwrap());
    resp_headers.insert(header::ACCEPT_RANGES, "bytes".parse().unwrap());

    let Some(range) = headers.get(header::RANGE) else {
        return (
            StatusCode::OK,
            resp_headers,
            state.body.clone(),
        )
            .into_response();
    };

    let spec = range.to_str().unwrap().strip_prefix("bytes=").unwrap();
    let (start, end) = spec.split_once('-').unwrap();
    let start: usize = start.parse().unwrap();
    let end = end
        .parse::<usize>()
        .map_or(state.body.len(), |e| (e + 1).min(state.body.len()));

    if method == Method::GET {
        state.served.lock().unwrap().push((start, end));
    }

    resp_headers.insert(
        header::CONTENT_RANGE,
        format!("bytes {}-{}/{}", start, end - 1, state.body.len())
            .parse()
            .unwrap(),
    );
    (
        StatusCode::PARTIAL_CONTENT,
        resp_headers,
        state.body.slice(start..end),
    )
        .into_response()
}

// Serves every request as if the `Range` header were absent: 200, full body.
async fn legacy_track(State(state): State<TrackState>) -> impl IntoResponse {
    let mut resp_headers = HeaderMap::new();
    resp_headers.insert(header::CONTENT_TYPE, "audio/mpeg".parse().unwrap());
    (StatusCode::OK, resp_headers, state.body.clone())
}

struct TestServer {
    base_url: Url,
    state: TrackState,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    async fn start() -> Self {
        let state = TrackState::new();
        let router = Router::new()
            .route("/track.mp3", get(track))
            .route("/legacy.mp3", get(legacy_track))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let server = axum::serve(listener, router).with_graceful_shutdown(async {
            shutdown_rx.await.ok();
        });
        tokio::spawn(async move {
            server.await.unwrap();
        });

        tokio::time::sleep(Duration::from_millis(50)).await;

        Self {
            base_url: Url::parse(&format!("http://{addr}")).unwrap(),
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    fn track_url(&self) -> Url {
        self.base_url.join("/track.mp3").unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

#[rstest]
#[timeout(Duration::from_secs(10))]
#[tokio::test(flavor = "multi_thread")]
async fn progressive_playback_hits_the_network_once_per_gap() {
    let server = TestServer::start().await;
    let cache = MediaCache::new();
    let url = server.track_url();

    let info = cache.content_info(&url).await.unwrap();
    assert_eq!(info.total_length, TRACK_LEN as u64);
    assert_eq!(info.mime.as_deref(), Some("audio/mpeg"));
    assert!(info.supports_ranges);

    // Play from the start.
    let opening = cache
        .request_range(&url, ByteRange::new(0, 1024))
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(opening, server.state.body.slice(0..1024));

    // Seek ahead, overlapping the cached prefix: only the tail is fetched.
    let seek = cache
        .request_range(&url, ByteRange::new(512, 1536))
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(seek, server.state.body.slice(512..2048));

    // Replay the opening entirely from cache.
    let replay = cache
        .request_range(&url, ByteRange::new(0, 2048))
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(replay, server.state.body.slice(0..2048));

    assert_eq!(server.state.served(), vec![(0, 1024), (1024, 2048)]);
}

#[rstest]
#[timeout(Duration::from_secs(10))]
#[tokio::test(flavor = "multi_thread")]
async fn full_coverage_promotes_and_stops_fetching() {
    let server = TestServer::start().await;
    let backend = Arc::new(MemStore::new());
    let cache = MediaCache::builder().backend(backend.clone()).build();
    let url = server.track_url();

    cache.content_info(&url).await.unwrap();
    let whole = cache
        .request_range(&url, ByteRange::new(0, TRACK_LEN as u64))
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(whole, server.state.body);

    let record = backend
        .get(&ResourceKey::from_url(&url))
        .unwrap()
        .unwrap();
    assert!(record.is_complete());

    let tail = cache
        .request_range(&url, ByteRange::new(3000, 500))
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(tail, server.state.body.slice(3000..3500));

    assert_eq!(server.state.served(), vec![(0, TRACK_LEN)]);
}

#[rstest]
#[timeout(Duration::from_secs(10))]
#[tokio::test(flavor = "multi_thread")]
async fn intercepted_url_shares_the_cache_entry() {
    let server = TestServer::start().await;
    let cache = MediaCache::new();
    let url = server.track_url();

    let first = cache
        .request_range(&url, ByteRange::new(0, 256))
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(first, server.state.body.slice(0..256));

    // The player-facing URL routes to the same cached bytes.
    let intercepted = cache.intercept_url(&url).unwrap();
    assert_ne!(intercepted.scheme(), url.scheme());

    let second = cache
        .request_range(&intercepted, ByteRange::new(0, 256))
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(second, server.state.body.slice(0..256));

    assert_eq!(server.state.served(), vec![(0, 256)]);
}

// A seek against a host that ignores `Range` must surface an error instead
// of handing back bytes from offset 0 labelled with the requested offsets.
#[rstest]
#[timeout(Duration::from_secs(10))]
#[tokio::test(flavor = "multi_thread")]
async fn seek_against_range_ignoring_host_fails() {
    let server = TestServer::start().await;
    let cache = MediaCache::new();
    let url = server.base_url.join("/legacy.mp3").unwrap();

    let result = cache
        .request_range(&url, ByteRange::new(10, 10))
        .await
        .unwrap()
        .collect()
        .await;

    match result {
        Err(CacheError::Net(_)) => {}
        other => panic!("expected a network error, got {other:?}"),
    }
}
