//! Bounded LRU cache shared across threads.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::Mutex;

/// Least-recently-used cache guarded by a mutex
///
/// Every access stamps the entry with a fresh tick; `order` maps ticks back
/// to keys so the oldest entry is the first one in the tree. Hits and
/// evictions are O(log n) under the lock.
pub struct LruCache<K, V> {
    capacity: usize,
    inner: Mutex<Inner<K, V>>,
}

struct Inner<K, V> {
    map: HashMap<K, (V, u64)>,
    order: BTreeMap<u64, K>,
    tick: u64,
}

impl<K: Eq + Hash + Clone, V: Clone> Inner<K, V> {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Move `key` to most-recently-used
    fn touch(&mut self, key: &K) {
        let tick = self.next_tick();
        if let Some((_, stamp)) = self.map.get_mut(key) {
            let old = std::mem::replace(stamp, tick);
            self.order.remove(&old);
            self.order.insert(tick, key.clone());
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> LruCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                order: BTreeMap::new(),
                tick: 0,
            }),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.lock();
        let value = inner.map.get(key).map(|(v, _)| v.clone())?;
        inner.touch(key);
        Some(value)
    }

    pub fn insert(&self, key: K, value: V) {
        let mut inner = self.lock();
        if let Some((slot, _)) = inner.map.get_mut(&key) {
            *slot = value;
            inner.touch(&key);
            return;
        }
        let tick = inner.next_tick();
        inner.order.insert(tick, key.clone());
        inner.map.insert(key, (value, tick));
        while inner.map.len() > self.capacity {
            let Some((_, evicted)) = inner.order.pop_first() else {
                break;
            };
            inner.map.remove(&evicted);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner<K, V>> {
        // Entries are plain values, so a poisoned lock still holds a usable map
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = LruCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.get(&"a"), Some(1));
        cache.insert("c", 3);
        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"c"), Some(3));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_reinsert_updates_value() {
        let cache = LruCache::new(2);
        cache.insert("a", 1);
        cache.insert("a", 5);
        assert_eq!(cache.get(&"a"), Some(5));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_reinsert_refreshes_recency() {
        let cache = LruCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("a", 3);
        cache.insert("c", 4);
        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"a"), Some(3));
        assert_eq!(cache.get(&"c"), Some(4));
    }

    #[test]
    fn test_capacity_holds_under_many_keys() {
        let cache = LruCache::new(3);
        for i in 0..100 {
            cache.insert(i, i * 2);
            cache.get(&0);
        }
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get(&0), Some(0));
        assert_eq!(cache.get(&99), Some(198));
        assert_eq!(cache.get(&97), None);
    }
}
