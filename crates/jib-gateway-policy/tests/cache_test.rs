use jib_gateway_policy::BoundedCache;

#[test]
fn lookup_returns_inserted_value() {
    let cache: BoundedCache<&str, u32> = BoundedCache::new(4);
    cache.insert("a", 1);
    assert_eq!(cache.get(&"a"), Some(1));
    assert_eq!(cache.get(&"b"), None);
}

#[test]
fn capacity_evicts_oldest() {
    let cache: BoundedCache<u32, u32> = BoundedCache::new(3);
    for i in 0..5 {
        cache.insert(i, i * 10);
    }
    assert_eq!(cache.len(), 3);
    assert_eq!(cache.get(&0), None);
    assert_eq!(cache.get(&1), None);
    assert_eq!(cache.get(&2), Some(20));
    assert_eq!(cache.get(&4), Some(40));
}

#[test]
fn update_moves_key_to_most_recent() {
    let cache: BoundedCache<&str, u32> = BoundedCache::new(3);
    cache.insert("a", 1);
    cache.insert("b", 2);
    cache.insert("c", 3);

    // Touch "a": it must now survive the next two evictions.
    cache.insert("a", 11);
    cache.insert("d", 4);
    cache.insert("e", 5);

    assert_eq!(cache.get(&"a"), Some(11));
    assert_eq!(cache.get(&"b"), None);
    assert_eq!(cache.get(&"c"), None);
    assert_eq!(cache.get(&"d"), Some(4));
    assert_eq!(cache.get(&"e"), Some(5));
}

#[test]
fn lookup_does_not_promote() {
    let cache: BoundedCache<&str, u32> = BoundedCache::new(2);
    cache.insert("a", 1);
    cache.insert("b", 2);

    // Reading "a" is not a touch; it is still the eviction candidate.
    assert_eq!(cache.get(&"a"), Some(1));
    cache.insert("c", 3);

    assert_eq!(cache.get(&"a"), None);
    assert_eq!(cache.get(&"b"), Some(2));
}

#[test]
fn n_plus_k_insertions_evict_exactly_k() {
    let n = 500;
    let k = 37;
    let cache: BoundedCache<u32, u32> = BoundedCache::new(n);
    for i in 0..(n as u32 + k) {
        cache.insert(i, i);
    }
    assert_eq!(cache.len(), n);
    for i in 0..k {
        assert_eq!(cache.get(&i), None, "entry {i} should have been evicted");
    }
    for i in k..(n as u32 + k) {
        assert_eq!(cache.get(&i), Some(i), "entry {i} should remain");
    }
}

#[test]
fn concurrent_writers_stay_bounded() {
    use std::sync::Arc;

    let cache: Arc<BoundedCache<u64, u64>> = Arc::new(BoundedCache::new(64));
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                for i in 0..1000u64 {
                    cache.insert(t * 1000 + i, i);
                    let _ = cache.get(&(t * 1000));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(cache.len(), 64);
}
