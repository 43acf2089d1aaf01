use crate::lru::{CacheStats, LruCache};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Thread-safe wrapper around [`LruCache`].
///
/// A single mutex guards the lookup map and the recency list together,
/// so concurrent callers always observe a consistent size bound and an
/// uncorrupted order. Lookups promote entries (and may purge expired
/// ones), so even the hit path needs the exclusive lock.
pub struct SharedLru<V> {
    inner: Mutex<LruCache<V>>,
}

impl<V> SharedLru<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        self.inner.lock().get(key)
    }

    pub fn insert(&self, key: String, value: V, ttl: Duration) {
        self.inner.lock().insert(key, value, ttl);
    }

    pub fn remove(&self, key: &str) -> bool {
        self.inner.lock().remove(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats()
    }
}
