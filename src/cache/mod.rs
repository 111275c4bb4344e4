//! A time-to-live cache that coalesces concurrent loads of the same key into a single call.
//!
//! Every key can be in one of three states: cached (and not yet expired), loading (exactly one
//! caller is currently producing the value) or absent. Callers that find a key loading subscribe to
//! the loader's completion signal instead of starting their own load, then look at the cache again
//! once the loader is done. Failed loads are never cached so the next caller retries right away.
//!
//! Cached values are kept in a least recently used map with a fixed capacity, and expired entries
//! are swept out at most once per TTL whenever a new value is stored. A cache that sees a steady
//! stream of new credentials therefore stays bounded both in count and in age.

use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

use ::lru::LruCache;
use tokio::sync::watch;
use tokio::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Default time a value stays cached
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);
/// Default time a caller waits for somebody else's in-flight load before giving up
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default number of values a single cache holds before evicting the least recently used one
pub const DEFAULT_MAX_ENTRIES: NonZeroUsize = match NonZeroUsize::new(10_000) {
    Some(n) => n,
    None => panic!("the default cache size is not zero"),
};

struct CacheEntry<T> {
    value: T,
    expires_at: Instant,
}

struct Inner<T> {
    entries: LruCache<String, CacheEntry<T>>,
    // The sender half lives in the LoadingGuard, it is dropped when loading ends
    loading: HashMap<String, watch::Receiver<()>>,
    last_sweep: Instant,
}

impl<T: Clone> Inner<T> {
    /// Returns the cached value for the key, evicting it if it has expired
    fn fresh(&mut self, key: &str) -> Option<T> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.pop(key);
        }
        None
    }

    /// Drops every expired entry. Returns how many were removed
    fn sweep(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.entries.pop(key);
        }
        self.last_sweep = now;
        expired.len()
    }
}

/// A cache keyed by credential. Clones share the same underlying storage, so a single instance
/// can be handed to every request handler.
#[derive(Clone)]
pub struct CoalescingCache<T> {
    name: &'static str,
    inner: Arc<Mutex<Inner<T>>>,
    ttl: Duration,
    wait_timeout: Duration,
}

impl<T: Clone> CoalescingCache<T> {
    /// Creates an empty cache holding at most `max_entries` values. The name is only used for
    /// logging
    pub fn new(
        name: &'static str,
        ttl: Duration,
        wait_timeout: Duration,
        max_entries: NonZeroUsize,
    ) -> Self {
        CoalescingCache {
            name,
            inner: Arc::new(Mutex::new(Inner {
                entries: LruCache::new(max_entries),
                loading: HashMap::new(),
                last_sweep: Instant::now(),
            })),
            ttl,
            wait_timeout,
        }
    }

    // The lock is never held across an await point or while running user code, so a poisoned
    // lock still holds consistent data
    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns the cached value if it is present and has not expired
    pub fn get(&self, key: &str) -> Option<T> {
        self.lock().fresh(key)
    }

    /// Caches a value, overwriting any previous entry. It expires after the configured TTL. If
    /// the cache is full the least recently used entry is evicted
    pub fn set(&self, key: &str, value: T) {
        let now = Instant::now();
        let mut inner = self.lock();
        if now >= inner.last_sweep + self.ttl {
            let removed = inner.sweep(now);
            if removed > 0 {
                debug!(cache = self.name, removed, "Swept expired entries");
            }
        }
        inner.entries.put(
            key.to_owned(),
            CacheEntry {
                value,
                expires_at: now + self.ttl,
            },
        );
    }

    /// Number of stored entries, including expired ones that have not been swept yet
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if a load is currently in flight for the key
    pub fn is_loading(&self, key: &str) -> bool {
        self.lock().loading.contains_key(key)
    }

    /// Claims the in-flight slot for the key. Returns `None` if somebody else already holds it.
    /// The slot is released when the returned guard is dropped.
    pub fn mark_loading(&self, key: &str) -> Option<LoadingGuard<T>> {
        let mut inner = self.lock();
        if inner.loading.contains_key(key) {
            return None;
        }
        Some(self.start_loading(&mut inner, key))
    }

    fn start_loading(&self, inner: &mut Inner<T>, key: &str) -> LoadingGuard<T> {
        let (done, pending) = watch::channel(());
        inner.loading.insert(key.to_owned(), pending);
        LoadingGuard {
            key: key.to_owned(),
            inner: Arc::clone(&self.inner),
            _done: done,
        }
    }

    /// Returns the cached value for the key or produces it with `load`.
    ///
    /// At most one `load` runs per key at any time. Callers arriving while a load is in flight
    /// wait for it and then read its result from the cache. If waiting takes longer than the
    /// configured wait timeout, or the load produced nothing, `None` is returned.
    pub async fn get_or_load<F, Fut>(&self, key: &str, load: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        let deadline = Instant::now() + self.wait_timeout;
        let guard = loop {
            let pending = {
                let mut inner = self.lock();
                if let Some(value) = inner.fresh(key) {
                    trace!(cache = self.name, "Cache hit");
                    return Some(value);
                }
                match inner.loading.get(key) {
                    Some(pending) => pending.clone(),
                    None => break self.start_loading(&mut inner, key),
                }
            };
            debug!(cache = self.name, "A load is in progress for this key, waiting");
            if tokio::time::timeout_at(deadline, wait_for(pending))
                .await
                .is_err()
            {
                warn!(
                    cache = self.name,
                    timeout_secs = self.wait_timeout.as_secs_f64(),
                    "Timed out waiting for an in-flight load"
                );
                return None;
            }
        };

        trace!(cache = self.name, "Cache miss, loading value");
        let value = load().await;
        if let Some(v) = &value {
            self.set(key, v.clone());
        }
        // Waiters must find the new entry once they wake up, so release only after `set`
        drop(guard);
        value
    }
}

async fn wait_for(mut pending: watch::Receiver<()>) {
    // Nothing is ever sent, the channel only closes when the loader's guard drops
    while pending.changed().await.is_ok() {}
}

/// Holds the in-flight slot for one key. Dropping it clears the slot and wakes every waiter, which
/// also happens if the loading future is cancelled or panics.
pub struct LoadingGuard<T> {
    key: String,
    inner: Arc<Mutex<Inner<T>>>,
    _done: watch::Sender<()>,
}

impl<T> LoadingGuard<T> {
    /// Releases the slot. Equivalent to dropping the guard
    pub fn clear(self) {}
}

impl<T> Drop for LoadingGuard<T> {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.loading.remove(&self.key);
        // `_done` is dropped right after this, waking the waiters
    }
}
