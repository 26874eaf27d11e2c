use std::hash::Hash;
use std::sync::Mutex;

use indexmap::IndexMap;

/// A fixed-capacity insertion-ordered map.
///
/// Updating an existing key moves it to the most-recently-inserted position;
/// inserting past capacity evicts the oldest entry. Lookups do not change
/// order. The cache knows nothing about freshness; entries carry their own
/// fetch timestamps and callers decide what stale means.
///
/// Safe for concurrent use; two requests racing on the same key may both fill
/// it, and last write wins.
pub struct BoundedCache<K, V> {
    entries: Mutex<IndexMap<K, V>>,
    capacity: usize,
}

impl<K: Hash + Eq, V: Clone> BoundedCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "cache capacity must be positive");
        Self {
            entries: Mutex::new(IndexMap::new()),
            capacity,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    pub fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        // Re-inserting must refresh recency, so drop any old slot first.
        entries.shift_remove(&key);
        entries.insert(key, value);
        while entries.len() > self.capacity {
            entries.shift_remove_index(0);
        }
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
