//! The keyed result cache port and its in-memory backend.
//!
//! [`QueryCache`] is the only resource the engine components share. They
//! touch it exclusively through `get`/`set`/`remove`/`cancel_in_flight`/
//! `invalidate` and never keep a long-lived reference to a cached value.
//!
//! [`InMemoryCache`] additionally tracks in-flight fetches per key, supports
//! per-prefix fetchers that run in the background when a key is
//! invalidated, and broadcasts [`CacheEvent`]s to observers.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;

use crate::key::QueryKey;

/// Error type carried across port boundaries (remote calls, storage, executors).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Heap-allocated, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Produces the authoritative value for a key.
pub type Fetcher = Arc<dyn Fn(QueryKey) -> BoxFuture<'static, Result<Value, BoxError>> + Send + Sync>;

/// The cache contract consumed by the coordinator, history, and auto-save.
pub trait QueryCache: Send + Sync {
    /// Current value for `key`, if any.
    fn get(&self, key: &QueryKey) -> Option<Value>;

    /// Replaces the value for `key`.
    fn set(&self, key: &QueryKey, value: Value);

    /// Drops the value for `key`, returning it to the never-fetched state.
    fn remove(&self, key: &QueryKey);

    /// Cancels a fetch in progress for exactly `key`. Returns whether one was running.
    fn cancel_in_flight(&self, key: &QueryKey) -> bool;

    /// Marks `key` and every key extending it as stale so observers refetch.
    fn invalidate(&self, key: &QueryKey);
}

impl<C: QueryCache + ?Sized> QueryCache for Arc<C> {
    fn get(&self, key: &QueryKey) -> Option<Value> {
        (**self).get(key)
    }

    fn set(&self, key: &QueryKey, value: Value) {
        (**self).set(key, value)
    }

    fn remove(&self, key: &QueryKey) {
        (**self).remove(key)
    }

    fn cancel_in_flight(&self, key: &QueryKey) -> bool {
        (**self).cancel_in_flight(key)
    }

    fn invalidate(&self, key: &QueryKey) {
        (**self).invalidate(key)
    }
}

/// Notifications emitted by [`InMemoryCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    Set(QueryKey),
    Removed(QueryKey),
    Invalidated(QueryKey),
    Cancelled(QueryKey),
    Fetched(QueryKey),
    FetchFailed(QueryKey),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    stale: bool,
}

struct InFlight {
    generation: u64,
    abort: AbortHandle,
}

struct CacheInner {
    entries: DashMap<QueryKey, CacheEntry>,
    in_flight: DashMap<QueryKey, InFlight>,
    fetchers: DashMap<QueryKey, Fetcher>,
    next_generation: AtomicU64,
    events: broadcast::Sender<CacheEvent>,
}

/// Concurrent in-memory cache with fetch tracking.
///
/// Cloning is cheap and yields a handle to the same cache.
#[derive(Clone)]
pub struct InMemoryCache {
    inner: Arc<CacheInner>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        InMemoryCache {
            inner: Arc::new(CacheInner {
                entries: DashMap::new(),
                in_flight: DashMap::new(),
                fetchers: DashMap::new(),
                next_generation: AtomicU64::new(1),
                events,
            }),
        }
    }

    /// Subscribes to cache events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.events.subscribe()
    }

    /// Whether `key` has been invalidated since it was last written.
    pub fn is_stale(&self, key: &QueryKey) -> bool {
        self.inner.entries.get(key).map(|e| e.stale).unwrap_or(false)
    }

    /// Whether a fetch is running for `key`.
    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.inner.in_flight.contains_key(key)
    }

    /// Keys currently holding a value, in sorted order.
    pub fn keys(&self) -> Vec<QueryKey> {
        let mut keys: Vec<QueryKey> = self.inner.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Registers a fetcher used for `prefix` and every key extending it.
    /// The longest matching prefix wins.
    pub fn register_fetcher<F, Fut>(&self, prefix: QueryKey, fetcher: F)
    where
        F: Fn(QueryKey) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
    {
        let boxed: Fetcher = Arc::new(move |key: QueryKey| -> BoxFuture<'static, Result<Value, BoxError>> {
            Box::pin(fetcher(key))
        });
        self.inner.fetchers.insert(prefix, boxed);
    }

    /// Starts a background fetch for `key` using its registered fetcher.
    /// Returns false when no fetcher covers the key or no runtime is available.
    pub fn fetch(&self, key: &QueryKey) -> bool {
        match self.fetcher_for(key) {
            Some(fetcher) => self.spawn_fetch(key.clone(), fetcher(key.clone())),
            None => false,
        }
    }

    /// Tracks `future` as the in-flight fetch for `key`, replacing any fetch
    /// already running. The result is written only if the fetch was not
    /// cancelled or superseded in the meantime.
    pub fn spawn_fetch<Fut>(&self, key: QueryKey, future: Fut) -> bool
    where
        Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
    {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(%key, "no async runtime available; fetch skipped");
            return false;
        };

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let task_key = key.clone();

        // The slot stays locked until the new fetch is registered, so the
        // task cannot complete against a missing entry.
        let slot = self.inner.in_flight.entry(key);
        let handle = runtime.spawn(async move {
            let result = future.await;
            inner.complete_fetch(&task_key, generation, result);
        });
        let fetch = InFlight {
            generation,
            abort: handle.abort_handle(),
        };
        match slot {
            Entry::Occupied(mut slot) => slot.insert(fetch).abort.abort(),
            Entry::Vacant(slot) => {
                slot.insert(fetch);
            }
        }
        true
    }

    fn fetcher_for(&self, key: &QueryKey) -> Option<Fetcher> {
        self.inner
            .fetchers
            .iter()
            .filter(|f| key.starts_with(f.key()))
            .max_by_key(|f| f.key().segments().len())
            .map(|f| Arc::clone(f.value()))
    }

    fn emit(&self, event: CacheEvent) {
        self.inner.emit(event);
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheInner {
    fn emit(&self, event: CacheEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn complete_fetch(&self, key: &QueryKey, generation: u64, result: Result<Value, BoxError>) {
        // The value is written while the in-flight slot is still held so a
        // concurrent cancel either happens before (and we drop the result)
        // or after (and finds nothing to cancel).
        match self.in_flight.entry(key.clone()) {
            Entry::Occupied(slot) if slot.get().generation == generation => {
                match result {
                    Ok(value) => {
                        self.entries.insert(
                            key.clone(),
                            CacheEntry {
                                value,
                                stale: false,
                            },
                        );
                        slot.remove();
                        self.emit(CacheEvent::Fetched(key.clone()));
                    }
                    Err(err) => {
                        slot.remove();
                        tracing::warn!(%key, error = %err, "background fetch failed");
                        self.emit(CacheEvent::FetchFailed(key.clone()));
                    }
                }
            }
            _ => {
                tracing::debug!(%key, generation, "discarding result of superseded fetch");
            }
        }
    }
}

impl QueryCache for InMemoryCache {
    fn get(&self, key: &QueryKey) -> Option<Value> {
        self.inner.entries.get(key).map(|e| e.value.clone())
    }

    fn set(&self, key: &QueryKey, value: Value) {
        self.inner.entries.insert(
            key.clone(),
            CacheEntry {
                value,
                stale: false,
            },
        );
        self.emit(CacheEvent::Set(key.clone()));
    }

    fn remove(&self, key: &QueryKey) {
        if self.inner.entries.remove(key).is_some() {
            self.emit(CacheEvent::Removed(key.clone()));
        }
    }

    fn cancel_in_flight(&self, key: &QueryKey) -> bool {
        match self.inner.in_flight.remove(key) {
            Some((_, fetch)) => {
                fetch.abort.abort();
                tracing::debug!(%key, "cancelled in-flight fetch");
                self.emit(CacheEvent::Cancelled(key.clone()));
                true
            }
            None => false,
        }
    }

    fn invalidate(&self, key: &QueryKey) {
        let mut affected = Vec::new();
        for mut entry in self.inner.entries.iter_mut() {
            if entry.key().starts_with(key) {
                entry.stale = true;
                affected.push(entry.key().clone());
            }
        }
        if !affected.contains(key) {
            affected.push(key.clone());
        }
        self.emit(CacheEvent::Invalidated(key.clone()));

        for stale in affected {
            self.fetch(&stale);
        }
    }
}
