use super::*;

#[test]
fn hit_before_expiry() {
    let cache = TtlCache::new(PROFILE_CACHE_TTL);
    let start = Instant::now();
    cache.insert_at(1_i64, "Alice".to_owned(), start);

    let just_before = start + PROFILE_CACHE_TTL - Duration::from_millis(1);
    assert_eq!(cache.get_at(&1, just_before).as_deref(), Some("Alice"));
}

#[test]
fn miss_at_and_after_expiry() {
    let cache = TtlCache::new(PROFILE_CACHE_TTL);
    let start = Instant::now();
    cache.insert_at(1_i64, "Alice".to_owned(), start);

    assert!(cache.get_at(&1, start + PROFILE_CACHE_TTL).is_none());
    // Expired entries are pruned, so a later lookup still misses.
    assert!(cache.get_at(&1, start).is_none());
}

#[test]
fn invalidate_removes_immediately() {
    let cache = TtlCache::new(PROFILE_CACHE_TTL);
    cache.insert(1_i64, "Alice".to_owned());
    cache.insert(2_i64, "Bob".to_owned());

    cache.invalidate(&1);
    assert!(cache.get(&1).is_none());
    assert_eq!(cache.get(&2).as_deref(), Some("Bob"));
}

#[test]
fn clear_drops_everything() {
    let cache = TtlCache::new(Duration::from_secs(10));
    cache.insert("a", 1);
    cache.insert("b", 2);
    cache.clear();
    assert!(cache.get(&"a").is_none());
    assert!(cache.get(&"b").is_none());
}

#[test]
fn reinsert_refreshes_timestamp() {
    let cache = TtlCache::new(Duration::from_secs(10));
    let start = Instant::now();
    cache.insert_at(7_i64, 1_u32, start);
    cache.insert_at(7_i64, 2_u32, start + Duration::from_secs(8));
    assert_eq!(cache.get_at(&7, start + Duration::from_secs(12)), Some(2));
}
