use std::time::Duration;

use heimdall::{CacheConfig, CacheStats, SemanticCache, SetOptions};

const PUBLIC: &[&str] = &["PUBLIC"];

fn cache<T: Clone>() -> SemanticCache<T> {
    SemanticCache::new(CacheConfig::default())
}

// ============================================================================
// Keying
// ============================================================================

#[test]
fn query_match_ignores_case_and_whitespace() {
    let cache = cache();
    cache.set("Test Query", "tenant_a", PUBLIC, "v", SetOptions::new());

    assert_eq!(
        cache.get("  test query  ", "tenant_a", PUBLIC, None),
        Some("v")
    );
    assert_eq!(cache.get("TEST QUERY", "tenant_a", PUBLIC, None), Some("v"));
    assert_eq!(cache.get("test queries", "tenant_a", PUBLIC, None), None);
}

#[test]
fn tenants_are_isolated() {
    let cache = cache();
    cache.set("q", "tenant_a", PUBLIC, "va", SetOptions::new());
    cache.set("q", "tenant_b", PUBLIC, "vb", SetOptions::new());

    assert_eq!(cache.get("q", "tenant_a", PUBLIC, None), Some("va"));
    assert_eq!(cache.get("q", "tenant_b", PUBLIC, None), Some("vb"));
    assert_eq!(cache.get("q", "tenant_c", PUBLIC, None), None);
}

#[test]
fn acl_is_order_and_duplicate_insensitive() {
    let cache = cache();
    cache.set("q", "t", &["user:1", "PUBLIC"], 1, SetOptions::new());

    assert_eq!(cache.get("q", "t", &["PUBLIC", "user:1"], None), Some(1));
    assert_eq!(
        cache.get("q", "t", &["PUBLIC", "user:1", "PUBLIC"], None),
        Some(1)
    );
    // a different visibility level never sees the entry
    assert_eq!(cache.get("q", "t", &["PUBLIC"], None), None);
    assert_eq!(cache.get("q", "t", &["PUBLIC", "user:2"], None), None);
}

#[test]
fn acl_token_boundaries_are_not_merged() {
    let cache = cache();
    cache.set(
        "salaries",
        "acme",
        &["group:eng", "group:finance"],
        "secret",
        SetOptions::new(),
    );

    assert_eq!(
        cache.get("salaries", "acme", &["group:eng|group:finance"], None),
        None
    );
    assert_eq!(
        cache.get("salaries", "acme", &["group:finance", "group:eng"], None),
        Some("secret")
    );
}

#[test]
fn context_separates_entries() {
    let cache = cache();
    cache.set("q", "t", PUBLIC, "plain", SetOptions::new());
    cache.set(
        "q",
        "t",
        PUBLIC,
        "chat-1",
        SetOptions::new().context("conversation-1"),
    );

    assert_eq!(cache.get("q", "t", PUBLIC, None), Some("plain"));
    assert_eq!(
        cache.get("q", "t", PUBLIC, Some("conversation-1")),
        Some("chat-1")
    );
    assert_eq!(cache.get("q", "t", PUBLIC, Some("conversation-2")), None);
    assert_eq!(cache.len(), 2);
}

// ============================================================================
// Expiry
// ============================================================================

#[test]
fn short_ttl_expires() {
    let cache = cache();
    cache.set(
        "q",
        "t",
        PUBLIC,
        "v",
        SetOptions::new().ttl(Duration::from_millis(100)),
    );

    assert_eq!(cache.get("q", "t", PUBLIC, None), Some("v"));
    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(cache.get("q", "t", PUBLIC, None), None);

    let stats = cache.get_stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.size, 0);
}

#[test]
fn default_ttl_applies_without_override() {
    let cache = SemanticCache::new(CacheConfig::new().default_ttl(Duration::from_millis(50)));
    cache.set("q", "t", PUBLIC, 1, SetOptions::new());
    cache.set(
        "long",
        "t",
        PUBLIC,
        2,
        SetOptions::new().ttl(Duration::from_secs(60)),
    );
    std::thread::sleep(Duration::from_millis(80));

    assert_eq!(cache.get("q", "t", PUBLIC, None), None);
    assert_eq!(cache.get("long", "t", PUBLIC, None), Some(2));
}

// ============================================================================
// Invalidation
// ============================================================================

#[test]
fn invalidate_document_removes_only_linked_entries() {
    let cache = cache();
    cache.set(
        "q1",
        "t",
        PUBLIC,
        "v1",
        SetOptions::new().document_ids(["d1", "d2"]),
    );
    cache.set(
        "q2",
        "t",
        PUBLIC,
        "v2",
        SetOptions::new().document_ids(["d2", "d3"]),
    );

    assert_eq!(cache.invalidate_document("d1", "t"), 1);
    assert_eq!(cache.get("q1", "t", PUBLIC, None), None);
    assert_eq!(cache.get("q2", "t", PUBLIC, None), Some("v2"));

    // q1 no longer hangs off d2
    assert_eq!(cache.invalidate_document("d2", "t"), 1);
    assert_eq!(cache.get("q2", "t", PUBLIC, None), None);
    assert_eq!(cache.invalidate_document("d3", "t"), 0);
    assert!(cache.is_empty());
}

#[test]
fn invalidate_unknown_document_is_noop() {
    let cache: SemanticCache<u8> = cache();
    assert_eq!(cache.invalidate_document("missing", "t"), 0);
}

#[test]
fn invalidate_document_ignores_other_tenants() {
    let cache = cache();
    cache.set("q", "a", PUBLIC, 1, SetOptions::new().document_ids(["doc"]));
    cache.set("q", "b", PUBLIC, 2, SetOptions::new().document_ids(["doc"]));

    assert_eq!(cache.invalidate_document("doc", "a"), 1);
    assert_eq!(cache.get("q", "b", PUBLIC, None), Some(2));
}

#[test]
fn invalidate_tenant_removes_all_of_its_entries() {
    let cache = cache();
    for i in 0..5 {
        cache.set(&format!("q{i}"), "a", PUBLIC, i, SetOptions::new());
    }
    cache.set("q0", "b", PUBLIC, 100, SetOptions::new());

    assert_eq!(cache.invalidate_tenant("a"), 5);
    assert_eq!(cache.invalidate_tenant("a"), 0);
    assert_eq!(cache.get("q0", "b", PUBLIC, None), Some(100));
    assert_eq!(cache.len(), 1);
}

// ============================================================================
// Capacity
// ============================================================================

#[test]
fn size_never_exceeds_max() {
    let cache = SemanticCache::new(CacheConfig::new().max_size(20));
    for i in 0..100 {
        cache.set(&format!("query {i}"), "t", PUBLIC, i, SetOptions::new());
        assert!(cache.get_stats().size <= 20);
    }
    let stats = cache.get_stats();
    assert_eq!(stats.size, 20);
    assert!(stats.evictions > 0);
}

#[test]
fn eviction_removes_a_fraction() {
    let cache = SemanticCache::new(CacheConfig::new().max_size(10).eviction_fraction(0.5));
    for i in 0..10 {
        cache.set(&format!("q{i}"), "t", PUBLIC, i, SetOptions::new());
    }
    assert_eq!(cache.len(), 10);

    cache.set("one more", "t", PUBLIC, 10, SetOptions::new());
    assert_eq!(cache.len(), 6);
    assert_eq!(cache.get_stats().evictions, 5);
}

#[test]
fn overwrite_in_full_cache_evicts() {
    let cache = SemanticCache::new(CacheConfig::new().max_size(3));
    for i in 0..3 {
        cache.set(&format!("q{i}"), "t", PUBLIC, i, SetOptions::new());
    }
    cache.get("q2", "t", PUBLIC, None);

    cache.set("q2", "t", PUBLIC, 20, SetOptions::new());

    let stats = cache.get_stats();
    assert_eq!(stats.evictions, 1);
    assert_eq!(stats.size, 2);
    assert_eq!(cache.get("q2", "t", PUBLIC, None), Some(20));
}

#[test]
fn frequently_hit_entries_survive_eviction() {
    let cache = SemanticCache::new(CacheConfig::new().max_size(5));
    cache.set("popular", "t", PUBLIC, 0, SetOptions::new());
    for _ in 0..3 {
        cache.get("popular", "t", PUBLIC, None);
    }
    for i in 1..50 {
        cache.set(&format!("q{i}"), "t", PUBLIC, i, SetOptions::new());
    }
    assert_eq!(cache.get("popular", "t", PUBLIC, None), Some(0));
}

// ============================================================================
// Stats
// ============================================================================

#[test]
fn hit_rate() {
    assert_eq!(CacheStats::default().hit_rate(), 0.0);

    let cache = cache();
    cache.set("q", "t", PUBLIC, 1, SetOptions::new());
    cache.get("q", "t", PUBLIC, None);
    cache.get("q", "t", PUBLIC, None);
    cache.get("q", "t", PUBLIC, None);
    cache.get("other", "t", PUBLIC, None);

    let stats = cache.get_stats();
    assert_eq!(stats.hits, 3);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hit_rate(), 0.75);
}

#[test]
fn clear_wipes_entries_and_stats() {
    let cache = cache();
    cache.set("q", "t", PUBLIC, 1, SetOptions::new().document_ids(["d"]));
    cache.get("q", "t", PUBLIC, None);
    cache.clear();

    assert_eq!(cache.get_stats(), CacheStats::default());
    assert_eq!(cache.invalidate_document("d", "t"), 0);
    assert_eq!(cache.get("q", "t", PUBLIC, None), None);
}

#[test]
fn stats_serialise() {
    let cache = cache();
    cache.set("q", "t", PUBLIC, 1, SetOptions::new());
    let json = serde_json::to_value(cache.get_stats()).unwrap();
    assert_eq!(json["size"], 1);
    assert_eq!(json["hits"], 0);
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn concurrent_use_keeps_bounds() {
    let cache = SemanticCache::new(CacheConfig::new().max_size(64));

    std::thread::scope(|s| {
        for worker in 0..8 {
            let cache = &cache;
            s.spawn(move || {
                let tenant = format!("tenant-{}", worker % 2);
                for i in 0..500 {
                    let query = format!("q{}", i % 100);
                    let doc = format!("doc-{}", i % 7);
                    if cache.get(&query, &tenant, PUBLIC, None).is_none() {
                        let options = SetOptions::new().document_ids([doc]);
                        cache.set(&query, &tenant, PUBLIC, i, options);
                    }
                    if i % 50 == 0 {
                        cache.invalidate_document(&format!("doc-{}", i % 7), &tenant);
                    }
                }
            });
        }
    });

    let stats = cache.get_stats();
    assert!(stats.size <= 64);
    assert_eq!(stats.hits + stats.misses, 8 * 500);
    assert!(stats.evictions > 0);

    let removed = cache.invalidate_tenant("tenant-0") + cache.invalidate_tenant("tenant-1");
    assert_eq!(removed, stats.size);
    assert!(cache.is_empty());
}
