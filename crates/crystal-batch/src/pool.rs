//! Keyed pool of shared, reference-counted resources.

use std::hash::Hash;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use serde::Serialize;

/// Pool counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Entries currently pooled.
    pub entries: usize,
    /// Entries referenced from outside the pool.
    pub live_entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// A pool of shared resources keyed by a composite key.
///
/// The pool keeps one `Rc` per entry; an entry's live reference count is the
/// number of clones held elsewhere. Entries are created lazily on first
/// request and are never dropped implicitly: [`reclaim_unused`](Self::reclaim_unused)
/// drops the ones nobody else holds.
pub struct ResourcePool<K, V> {
    entries: FxHashMap<K, Rc<V>>,
    hits: u64,
    misses: u64,
}

impl<K, V> Default for ResourcePool<K, V> {
    fn default() -> Self {
        Self {
            entries: FxHashMap::default(),
            hits: 0,
            misses: 0,
        }
    }
}

impl<K: Eq + Hash, V> ResourcePool<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the pooled value for `key`, building it with `create` on a miss.
    pub fn get_or_create(&mut self, key: K, create: impl FnOnce(&K) -> V) -> Rc<V> {
        if let Some(existing) = self.entries.get(&key) {
            self.hits += 1;
            return Rc::clone(existing);
        }
        self.misses += 1;
        let value = Rc::new(create(&key));
        self.entries.insert(key, Rc::clone(&value));
        value
    }

    /// References held outside the pool, or `None` if the key is not pooled.
    #[cfg(test)]
    fn live_references(&self, key: &K) -> Option<usize> {
        self.entries.get(key).map(|rc| Rc::strong_count(rc) - 1)
    }

    /// Drop every entry with no live references. Returns how many were dropped.
    pub fn reclaim_unused(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, rc| Rc::strong_count(rc) > 1);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            entries: self.entries.len(),
            live_entries: self
                .entries
                .values()
                .filter(|rc| Rc::strong_count(rc) > 1)
                .count(),
            hits: self.hits,
            misses: self.misses,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_key_returns_same_instance() {
        let mut pool: ResourcePool<(u8, u8), String> = ResourcePool::new();
        let a = pool.get_or_create((1, 2), |_| "a".to_string());
        let b = pool.get_or_create((1, 2), |_| unreachable!("must hit"));
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(pool.stats().hits, 1);
        assert_eq!(pool.stats().misses, 1);
    }

    #[test]
    fn test_different_key_returns_different_instance() {
        let mut pool: ResourcePool<u32, u32> = ResourcePool::new();
        let a = pool.get_or_create(1, |k| *k);
        let b = pool.get_or_create(2, |k| *k);
        assert!(!Rc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_release_is_deferred_until_reclaim() {
        let mut pool: ResourcePool<u32, u32> = ResourcePool::new();
        let held = pool.get_or_create(1, |k| *k);
        let dropped = pool.get_or_create(2, |k| *k);
        drop(dropped);

        // Still pooled after the last outside reference is gone.
        assert_eq!(pool.live_references(&2), Some(0));
        assert_eq!(pool.len(), 2);

        assert_eq!(pool.reclaim_unused(), 1);
        assert_eq!(pool.live_references(&2), None);
        assert_eq!(pool.live_references(&1), Some(1));
        drop(held);
        assert_eq!(pool.reclaim_unused(), 1);
        assert!(pool.is_empty());
    }
}
