use flagbook::{fingerprint, Cache, FlagCache, Tags};
use std::time::Duration;
use tokio::time::advance;

#[test]
fn test_flag_cache_stores_by_fingerprint() {
    let cache = FlagCache::new(Duration::from_secs(10));
    let pro = fingerprint("beta", &Tags::new().with("plan", "pro"));
    let free = fingerprint("beta", &Tags::new().with("plan", "free"));

    cache.set(pro.clone(), true);

    assert_eq!(cache.get(&pro), Some(true));
    assert_eq!(cache.get(&free), None);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_flag_cache_remove_and_clear() {
    let cache = FlagCache::new(Duration::from_secs(10));
    cache.set("a", true);
    cache.set("b", false);

    assert!(cache.remove("a"));
    assert!(!cache.remove("a"));
    assert_eq!(cache.len(), 1);

    cache.clear();
    assert!(cache.is_empty());
}

#[test]
fn test_clones_share_entries() {
    let cache = FlagCache::new(Duration::from_secs(10));
    let other = cache.clone();

    cache.set("a", true);
    assert_eq!(other.get("a"), Some(true));
}

#[tokio::test(start_paused = true)]
async fn test_expiry_is_independent_of_reads() {
    let cache = FlagCache::new(Duration::from_millis(1000));
    cache.set("a", true);

    for _ in 0..9 {
        advance(Duration::from_millis(100)).await;
        assert_eq!(cache.get("a"), Some(true));
    }

    advance(Duration::from_millis(100)).await;
    assert_eq!(cache.get("a"), None);
}

#[tokio::test(start_paused = true)]
async fn test_overwrite_halfway_survives_first_deadline() {
    let cache = FlagCache::new(Duration::from_millis(1000));
    cache.set("a", true);

    advance(Duration::from_millis(500)).await;
    cache.set("a", false);

    advance(Duration::from_millis(600)).await;
    assert_eq!(cache.get("a"), Some(false));

    advance(Duration::from_millis(400)).await;
    assert_eq!(cache.get("a"), None);
}

#[tokio::test(start_paused = true)]
async fn test_generic_cache_purge() {
    let cache: Cache<String, u32> = Cache::new(Duration::from_millis(100));
    cache.set("a".to_string(), 1);

    advance(Duration::from_millis(50)).await;
    cache.set("b".to_string(), 2);

    advance(Duration::from_millis(50)).await;
    assert_eq!(cache.purge_expired(), 1);
    assert_eq!(cache.get(&"b".to_string()), Some(2));
    assert_eq!(cache.remaining_ttl(&"b".to_string()), Some(Duration::from_millis(50)));
}
