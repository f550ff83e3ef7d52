#![forbid(unsafe_code)]

//! Fetch coalescing: one network request per in-flight `(key, range)`.
//!
//! A fetch for a range that equals or contains a newly requested range is
//! shared instead of duplicated: the new caller attaches as a waiter and the
//! pump task slices every chunk to each waiter's sub-range. Bytes the fetch
//! delivered before the waiter attached are replayed from a backlog, so a
//! late waiter still sees its full sub-range. Content-info probes are
//! deduplicated per key the same way.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use fermata_core::{ByteRange, ContentInfo, ResourceKey};
use fermata_net::{Net, NetError, RangeSpec};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use url::Url;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct FetchKey {
    key: ResourceKey,
    range: ByteRange,
}

/// What a waiter observes from its fetch, in order: zero or more `Chunk`s
/// covering its sub-range ascending, then exactly one terminal event.
#[derive(Debug)]
pub enum FetchEvent {
    Chunk(Bytes),
    Complete,
    Failed(NetError),
}

struct Waiter {
    range: ByteRange,
    tx: mpsc::UnboundedSender<FetchEvent>,
}

struct InFlight {
    range: ByteRange,
    /// Identity guard: a replaced map slot must not be touched by the
    /// previous occupant's pump or waiters.
    generation: u64,
    /// Backlog of bytes delivered so far, for replay to late waiters.
    delivered: BytesMut,
    waiters: HashMap<u64, Waiter>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Registry {
    fetches: HashMap<FetchKey, InFlight>,
    probes: HashMap<ResourceKey, Vec<oneshot::Sender<Result<ContentInfo, NetError>>>>,
    /// Source of waiter and generation ids; never reused.
    next_id: u64,
}

impl Registry {
    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// Deduplicates range fetches and content-info probes across callers.
///
/// Cheap to clone; clones share the in-flight registry.
#[derive(Clone)]
pub struct FetchCoalescer {
    net: Arc<dyn Net>,
    registry: Arc<Mutex<Registry>>,
}

impl FetchCoalescer {
    pub fn new(net: Arc<dyn Net>) -> Self {
        Self {
            net,
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    /// Fetch `range` of the resource at `url`, joining an in-flight fetch
    /// whose range contains it when one exists.
    ///
    /// Registration is atomic with respect to concurrent calls: two callers
    /// asking for the same range while neither fetch has started still end
    /// up sharing one network request. The range is fetched exactly as
    /// given; widening decisions belong to the caller.
    pub fn fetch(&self, key: &ResourceKey, url: &Url, range: ByteRange) -> FetchHandle {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut reg = self.registry.lock();
        let waiter_id = reg.allocate_id();

        let joined = reg.fetches.iter_mut().find(|(fk, entry)| {
            fk.key == *key
                && fk.range.start <= range.start
                && range.end() <= fk.range.end()
                && !entry.cancel.is_cancelled()
        });
        if let Some((fetch_key, entry)) = joined {
            let backlog = ByteRange::new(entry.range.start, entry.delivered.len() as u64);
            if let Some(overlap) = backlog.intersect(&range) {
                let at = (overlap.start - entry.range.start) as usize;
                let replay =
                    Bytes::copy_from_slice(&entry.delivered[at..at + overlap.length as usize]);
                let _ = tx.send(FetchEvent::Chunk(replay));
            }
            entry.waiters.insert(waiter_id, Waiter { range, tx });
            let fetch_key = fetch_key.clone();
            tracing::debug!(%key, %range, shared = %fetch_key.range, "joined in-flight fetch");
            return FetchHandle {
                fetch_key,
                waiter_id,
                range,
                rx,
                registry: Arc::clone(&self.registry),
            };
        }

        let fetch_key = FetchKey {
            key: key.clone(),
            range,
        };
        let generation = reg.allocate_id();
        let cancel = CancellationToken::new();
        let mut waiters = HashMap::new();
        waiters.insert(waiter_id, Waiter { range, tx });
        reg.fetches.insert(
            fetch_key.clone(),
            InFlight {
                range,
                generation,
                delivered: BytesMut::new(),
                waiters,
                cancel: cancel.clone(),
            },
        );
        drop(reg);

        tracing::debug!(%key, %range, "dispatching range fetch");
        tokio::spawn(pump(
            Arc::clone(&self.net),
            url.clone(),
            fetch_key.clone(),
            generation,
            Arc::clone(&self.registry),
            cancel,
        ));

        FetchHandle {
            fetch_key,
            waiter_id,
            range,
            rx,
            registry: Arc::clone(&self.registry),
        }
    }

    /// Probe content info for `key`, sharing one in-flight HEAD per key.
    ///
    /// # Errors
    ///
    /// Propagates the probe's [`NetError`] to every caller sharing it.
    pub async fn content_info(
        &self,
        key: &ResourceKey,
        url: &Url,
    ) -> Result<ContentInfo, NetError> {
        let (tx, rx) = oneshot::channel();
        let dispatch = {
            let mut reg = self.registry.lock();
            match reg.probes.entry(key.clone()) {
                Entry::Occupied(mut occupied) => {
                    occupied.get_mut().push(tx);
                    false
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(vec![tx]);
                    true
                }
            }
        };

        if dispatch {
            tracing::debug!(%key, "dispatching content-info probe");
            let net = Arc::clone(&self.net);
            let url = url.clone();
            let key = key.clone();
            let registry = Arc::clone(&self.registry);
            tokio::spawn(async move {
                let result = net.content_info(&url).await;
                let waiters = registry.lock().probes.remove(&key).unwrap_or_default();
                for waiter in waiters {
                    let _ = waiter.send(result.clone());
                }
            });
        }

        rx.await
            .map_err(|_| NetError::http("content-info probe task dropped"))?
    }

    /// Number of in-flight range fetches, across all resources.
    #[must_use]
    pub fn inflight_fetches(&self) -> usize {
        self.registry.lock().fetches.len()
    }
}

/// Receiving side of one waiter's share of a fetch.
///
/// Dropping the handle detaches the waiter; when the last waiter of a fetch
/// detaches, the fetch itself is cancelled.
pub struct FetchHandle {
    fetch_key: FetchKey,
    waiter_id: u64,
    range: ByteRange,
    rx: mpsc::UnboundedReceiver<FetchEvent>,
    registry: Arc<Mutex<Registry>>,
}

impl FetchHandle {
    /// The sub-range this handle receives. The underlying fetch may span
    /// more; chunks arriving here are already sliced to this range.
    #[must_use]
    pub fn range(&self) -> ByteRange {
        self.range
    }

    /// Next event from the fetch. A closed channel without a terminal event
    /// means the pump task vanished and is reported as a failure.
    pub async fn next_event(&mut self) -> FetchEvent {
        match self.rx.recv().await {
            Some(event) => event,
            None => FetchEvent::Failed(NetError::http("fetch task dropped")),
        }
    }
}

impl Drop for FetchHandle {
    fn drop(&mut self) {
        let mut reg = self.registry.lock();
        if let Some(entry) = reg.fetches.get_mut(&self.fetch_key)
            && entry.waiters.remove(&self.waiter_id).is_some()
            && entry.waiters.is_empty()
        {
            // Last waiter gone; the pump removes the entry on cancellation.
            entry.cancel.cancel();
        }
    }
}

async fn pump(
    net: Arc<dyn Net>,
    url: Url,
    fetch_key: FetchKey,
    generation: u64,
    registry: Arc<Mutex<Registry>>,
    cancel: CancellationToken,
) {
    let range = fetch_key.range;
    let spec = RangeSpec::from_bounds(range.start, range.end());
    let mut stream = match net.fetch_range(&url, Some(spec)).await {
        Ok(stream) => stream,
        Err(error) => {
            finish(&registry, &fetch_key, generation, Err(error));
            return;
        }
    };

    let mut pos = range.start;
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                tracing::debug!(%range, "range fetch cancelled");
                remove_entry(&registry, &fetch_key, generation);
                return;
            }
            item = stream.next() => match item {
                Some(Ok(chunk)) => {
                    // Clip over-delivery; a server may round up past the
                    // requested end.
                    let take = (chunk.len() as u64).min(range.end().saturating_sub(pos));
                    if take > 0 {
                        deliver(&registry, &fetch_key, generation, pos, chunk.slice(..take as usize));
                        pos += take;
                    }
                    if pos >= range.end() {
                        break;
                    }
                }
                Some(Err(error)) => {
                    finish(&registry, &fetch_key, generation, Err(error));
                    return;
                }
                None => break,
            }
        }
    }

    let result = if pos < range.end() {
        Err(NetError::ShortBody {
            expected: range.length,
            got: pos - range.start,
        })
    } else {
        Ok(())
    };
    finish(&registry, &fetch_key, generation, result);
}

/// Append `chunk` (absolute offset `pos`) to the backlog and fan it out,
/// sliced to each waiter's sub-range. Waiters whose channel has closed are
/// dropped; the fetch is cancelled when none remain.
fn deliver(
    registry: &Mutex<Registry>,
    fetch_key: &FetchKey,
    generation: u64,
    pos: u64,
    chunk: Bytes,
) {
    let mut reg = registry.lock();
    let Some(entry) = reg.fetches.get_mut(fetch_key) else {
        return;
    };
    if entry.generation != generation {
        return;
    }

    entry.delivered.extend_from_slice(&chunk);

    let span = ByteRange::new(pos, chunk.len() as u64);
    entry.waiters.retain(|_, waiter| {
        let Some(overlap) = span.intersect(&waiter.range) else {
            return true;
        };
        let at = (overlap.start - pos) as usize;
        waiter
            .tx
            .send(FetchEvent::Chunk(chunk.slice(at..at + overlap.length as usize)))
            .is_ok()
    });
    if entry.waiters.is_empty() {
        entry.cancel.cancel();
    }
}

fn finish(
    registry: &Mutex<Registry>,
    fetch_key: &FetchKey,
    generation: u64,
    result: Result<(), NetError>,
) {
    let Some(entry) = remove_entry(registry, fetch_key, generation) else {
        return;
    };
    for waiter in entry.waiters.into_values() {
        let event = match &result {
            Ok(()) => FetchEvent::Complete,
            Err(error) => FetchEvent::Failed(error.clone()),
        };
        let _ = waiter.tx.send(event);
    }
}

fn remove_entry(
    registry: &Mutex<Registry>,
    fetch_key: &FetchKey,
    generation: u64,
) -> Option<InFlight> {
    let mut reg = registry.lock();
    if reg
        .fetches
        .get(fetch_key)
        .is_some_and(|e| e.generation == generation)
    {
        reg.fetches.remove(fetch_key)
    } else {
        None
    }
}
