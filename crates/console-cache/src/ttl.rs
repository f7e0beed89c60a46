//! Single-flight cache with timer-driven eviction.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::key::CacheKey;

/// The value handed to every caller sharing an entry.
pub type SharedResult<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

/// How long an entry stays in the table after it is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Evicted this long after storage, whether or not it has settled.
    After(Duration),
    /// Never evicted by timer; only `invalidate`/`clear` remove it.
    Never,
}

impl From<Option<Duration>> for Ttl {
    fn from(ttl: Option<Duration>) -> Self {
        ttl.map_or(Ttl::Never, Ttl::After)
    }
}

impl From<Duration> for Ttl {
    fn from(ttl: Duration) -> Self {
        Ttl::After(ttl)
    }
}

struct CacheEntry<T, E> {
    id: u64,
    future: SharedResult<T, E>,
    expires_at: Option<Instant>,
    timer: Option<JoinHandle<()>>,
}

impl<T, E> CacheEntry<T, E> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

struct Inner<T, E> {
    entries: Mutex<HashMap<CacheKey, CacheEntry<T, E>>>,
    next_id: AtomicU64,
    counters: Counters,
}

impl<T, E> Inner<T, E> {
    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, CacheEntry<T, E>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove `key` only if it still holds the entry the timer was set for.
    fn evict(&self, key: &CacheKey, id: u64) {
        let mut entries = self.lock();
        if entries.get(key).is_some_and(|entry| entry.id == id) {
            entries.remove(key);
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(%key, "cache entry evicted");
        }
    }
}

impl<T, E> Drop for Inner<T, E> {
    fn drop(&mut self) {
        let entries = self.entries.get_mut().unwrap_or_else(PoisonError::into_inner);
        for entry in entries.values_mut() {
            entry.cancel_timer();
        }
    }
}

/// Memoizes calls by structural key for a bounded lifetime.
///
/// At most one entry exists per key, and it is stored before its future
/// settles, so identical concurrent calls share one execution. Errors are
/// cached like values until the entry expires. There is no size bound;
/// keep this to small configuration reads.
pub struct TtlCache<T, E> {
    inner: Arc<Inner<T, E>>,
}

impl<T, E> Clone for TtlCache<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> Default for TtlCache<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> TtlCache<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                counters: Counters::default(),
            }),
        }
    }

    /// Return the live entry for `key`, or store `producer`'s future under it.
    ///
    /// The producer runs when the returned future is first polled. Eviction is
    /// scheduled at storage time; outside a tokio runtime no timer is spawned
    /// and expiry is enforced on lookup only.
    pub fn wrap<F, Fut>(&self, key: CacheKey, ttl: Ttl, producer: F) -> SharedResult<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let now = Instant::now();
        let mut entries = self.inner.lock();

        if let Some(entry) = entries.get(&key) {
            if entry.is_live(now) {
                self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(%key, "cache hit");
                return entry.future.clone();
            }
        }
        if let Some(mut expired) = entries.remove(&key) {
            expired.cancel_timer();
            self.inner.counters.evictions.fetch_add(1, Ordering::Relaxed);
        }

        self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(%key, "cache miss");

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let future = async move { producer().await }.boxed().shared();
        let (expires_at, timer) = match ttl {
            Ttl::After(ttl) => (Some(now + ttl), self.schedule_eviction(key.clone(), id, ttl)),
            Ttl::Never => (None, None),
        };

        entries.insert(
            key,
            CacheEntry {
                id,
                future: future.clone(),
                expires_at,
                timer,
            },
        );
        future
    }

    fn schedule_eviction(&self, key: CacheKey, id: u64, ttl: Duration) -> Option<JoinHandle<()>> {
        let handle = tokio::runtime::Handle::try_current().ok()?;
        let inner = Arc::downgrade(&self.inner);
        Some(handle.spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(inner) = inner.upgrade() {
                inner.evict(&key, id);
            }
        }))
    }

    /// Look up a live entry without producing one.
    pub fn get(&self, key: &CacheKey) -> Option<SharedResult<T, E>> {
        let now = Instant::now();
        self.inner
            .lock()
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.future.clone())
    }

    /// Drop the entry for `key`. Callers already holding its future keep it.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        match self.inner.lock().remove(key) {
            Some(mut entry) => {
                entry.cancel_timer();
                true
            }
            None => false,
        }
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut entries = self.inner.lock();
        for (_, mut entry) in entries.drain() {
            entry.cancel_timer();
        }
    }

    /// Cancel all eviction timers and empty the table.
    pub fn shutdown(&self) {
        self.clear();
        tracing::debug!("cache shut down");
    }

    /// Number of stored entries, including expired ones whose timer has not run yet.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.inner.counters.hits.load(Ordering::Relaxed),
            misses: self.inner.counters.misses.load(Ordering::Relaxed),
            evictions: self.inner.counters.evictions.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}
