use geoquery_cache::{CacheConfig, CacheKeyBuilder, ResponseCache};
use geoquery_core::CacheSettings;
use std::sync::Arc;
use std::time::Duration;

fn page_key(where_clause: &str, offset: usize, distance: f64) -> String {
    CacheKeyBuilder::new("page")
        .text("where", where_clause)
        .number("offset", offset)
        .float("distance", distance)
        .build()
}

#[tokio::test]
async fn test_concurrent_writers_share_one_cache() {
    let cache: Arc<ResponseCache<usize>> =
        Arc::new(ResponseCache::with_ttl(Duration::from_secs(60)));

    let mut handles = Vec::new();
    for task in 0..8usize {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            for offset in 0..25usize {
                cache.set(page_key("1=1", offset, 50.0), task * 100 + offset, None);
                assert!(cache.get(&page_key("1=1", offset, 50.0)).is_some());
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // Every task wrote the same 25 keys; last write wins per key.
    assert_eq!(cache.len(), 25);
    let stats = cache.stats();
    assert_eq!(stats.hits, 8 * 25);
    assert_eq!(stats.misses, 0);
    assert_eq!(stats.valid_entries, 25);
}

#[tokio::test]
async fn test_entries_expire_after_ttl() {
    let cache = ResponseCache::with_ttl(Duration::from_millis(40));
    cache.set(page_key("SQMI > 100", 0, 10.0), "page-0".to_string(), None);
    assert_eq!(
        cache.get(&page_key("SQMI > 100", 0, 10.0)).as_deref(),
        Some("page-0")
    );

    tokio::time::sleep(Duration::from_millis(80)).await;

    assert_eq!(cache.get(&page_key("SQMI > 100", 0, 10.0)), None);
    assert!(cache.is_empty());
    assert_eq!(cache.stats().misses, 1);
}

#[test]
fn test_float_precision_collapses_keys() {
    assert_eq!(page_key("1=1", 0, 50.0), page_key("1=1", 0, 50.000_000_01));
    assert_ne!(page_key("1=1", 0, 50.0), page_key("1=1", 1000, 50.0));
    assert!(page_key("1=1", 0, 50.0).starts_with("page_"));
}

#[test]
fn test_config_from_settings() {
    let settings = CacheSettings {
        enabled: true,
        ttl_secs: 12,
        max_entries: 0,
    };
    let config = CacheConfig::from_settings(&settings);
    assert_eq!(config.default_ttl, Duration::from_secs(12));
    assert_eq!(config.max_entries, 1);

    let cache: ResponseCache<u8> = ResponseCache::new(config);
    cache.set("a", 1, None);
    cache.set("b", 2, None);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get("b"), Some(2));
}
