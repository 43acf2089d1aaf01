use crate::arena::{Arena, Node};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// TTL sentinel for entries that never expire.
pub const NO_EXPIRY: Duration = Duration::MAX;

/// Snapshot of cache statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired: u64,
    pub current_size: usize,
    pub capacity: usize,
}

/// LRU (Least Recently Used) cache with lazy TTL expiry.
///
/// On every cache hit, the accessed node is moved to the head of the
/// list; evictions happen from the tail. A present-but-expired entry is
/// treated as a miss and removed as a side effect of the lookup.
///
/// `get()` mutates the list (move-to-front), so both lookups and inserts
/// take `&mut self`; thread safety is the wrapper's job (`SharedLru`).
pub struct LruCache<V> {
    arena: Arena<V>,
    map: HashMap<String, u32, ahash::RandomState>,
    capacity: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
    expired: u64,
}

impl<V> LruCache<V> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "cache capacity must be > 0");
        Self {
            arena: Arena::new(capacity),
            map: HashMap::with_capacity_and_hasher(capacity, ahash::RandomState::new()),
            capacity,
            hits: 0,
            misses: 0,
            evictions: 0,
            expired: 0,
        }
    }

    /// Look up a key. Expired entries are purged and reported as misses.
    /// A hit promotes the entry to most-recently-used.
    pub fn get(&mut self, key: &str) -> Option<Arc<V>> {
        if let Some(&index) = self.map.get(key) {
            let node = self.arena.get(index).unwrap();
            if node.is_expired() {
                self.misses += 1;
                self.expired += 1;
                self.map.remove(key);
                self.arena.remove(index);
                return None;
            }
            self.hits += 1;
            self.arena.move_to_head(index);
            let node = self.arena.get(index).unwrap();
            Some(Arc::clone(&node.value))
        } else {
            self.misses += 1;
            None
        }
    }

    /// Insert a key-value pair with the given TTL (`NO_EXPIRY` for none).
    /// The new entry becomes most-recently-used; the least-recently-used
    /// entry is evicted first if the cache is at capacity.
    pub fn insert(&mut self, key: String, value: V, ttl: Duration) {
        // If key already exists, remove old entry first
        if let Some(&old_index) = self.map.get(&key) {
            self.arena.remove(old_index);
            self.map.remove(&key);
        }

        // Evict LRU (tail) until a slot is free
        while self.arena.len() >= self.capacity {
            if let Some((_, evicted)) = self.arena.pop_tail() {
                self.map.remove(&evicted.key);
                self.evictions += 1;
            } else {
                break;
            }
        }

        let node = Node::new(key.clone(), value, ttl);
        if let Some(index) = self.arena.push_head(node) {
            self.map.insert(key, index);
        }
    }

    /// Remove a key explicitly.
    pub fn remove(&mut self, key: &str) -> bool {
        if let Some(index) = self.map.remove(key) {
            self.arena.remove(index);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            expired: self.expired,
            current_size: self.arena.len(),
            capacity: self.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::thread;

    const TTL: Duration = Duration::from_secs(60);

    fn body(s: &'static str) -> Bytes {
        Bytes::from_static(s.as_bytes())
    }

    #[test]
    fn basic_insert_and_get() {
        let mut cache = LruCache::new(3);
        cache.insert("a".into(), body("1"), TTL);
        cache.insert("b".into(), body("2"), TTL);
        cache.insert("c".into(), body("3"), TTL);

        assert_eq!(*cache.get("a").unwrap(), body("1"));
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn inserting_capacity_plus_one_evicts_exactly_the_lru() {
        let mut cache = LruCache::new(3);
        cache.insert("a".into(), body("1"), TTL);
        cache.insert("b".into(), body("2"), TTL);
        cache.insert("c".into(), body("3"), TTL);
        cache.insert("d".into(), body("4"), TTL);

        assert!(cache.get("a").is_none()); // oldest, evicted
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
        assert!(cache.get("d").is_some());
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn promotion_on_hit_changes_eviction_order() {
        let mut cache = LruCache::new(2);
        cache.insert("a".into(), body("1"), TTL);
        cache.insert("b".into(), body("2"), TTL);

        // Access "a" to make it recently used
        cache.get("a");

        // Insert "c" — should evict "b" (least recently used)
        cache.insert("c".into(), body("3"), TTL);
        assert!(cache.get("a").is_some()); // was accessed, kept
        assert!(cache.get("b").is_none()); // LRU, evicted
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn explicit_remove() {
        let mut cache = LruCache::new(3);
        cache.insert("a".into(), body("1"), TTL);
        assert!(cache.remove("a"));
        assert!(cache.get("a").is_none());
        assert!(!cache.remove("a"));
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn ttl_expiry_is_lazy_and_purges() {
        let mut cache = LruCache::new(3);
        cache.insert("fresh".into(), body("1"), TTL);
        cache.insert("stale".into(), body("2"), Duration::from_millis(20));

        assert!(cache.get("stale").is_some()); // retrievable before TTL
        thread::sleep(Duration::from_millis(40));

        assert!(cache.get("stale").is_none()); // absent strictly after TTL
        assert_eq!(cache.len(), 1); // purged as a side effect
        assert!(cache.get("fresh").is_some());
        assert_eq!(cache.stats().expired, 1);
    }

    #[test]
    fn no_expiry_sentinel_survives() {
        let mut cache = LruCache::new(2);
        cache.insert("forever".into(), body("1"), NO_EXPIRY);
        thread::sleep(Duration::from_millis(10));
        assert!(cache.get("forever").is_some());
    }

    #[test]
    fn stats_tracking() {
        let mut cache = LruCache::new(2);
        cache.insert("a".into(), body("1"), TTL);
        cache.get("a"); // hit
        cache.get("z"); // miss
        cache.insert("b".into(), body("2"), TTL);
        cache.insert("c".into(), body("3"), TTL); // evicts one

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.current_size, 2);
    }

    #[test]
    fn reinsert_same_key() {
        let mut cache = LruCache::new(2);
        cache.insert("a".into(), body("1"), TTL);
        cache.insert("b".into(), body("2"), TTL);
        cache.insert("a".into(), body("3"), TTL); // update, should not cause eviction

        assert_eq!(cache.len(), 2);
        assert_eq!(*cache.get("a").unwrap(), body("3"));
        assert!(cache.get("b").is_some());
    }

    #[test]
    fn size_never_exceeds_capacity() {
        let mut cache = LruCache::new(4);
        for i in 0..100 {
            cache.insert(format!("key-{i}"), body("x"), TTL);
            assert!(cache.len() <= cache.capacity());
        }
        assert_eq!(cache.stats().evictions, 96);
    }
}
