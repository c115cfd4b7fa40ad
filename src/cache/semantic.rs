//! Tenant- and ACL-isolated memoisation of retrieval results.
//!
//! # Keys
//!
//! Entries are keyed by tenant, normalised query, ACL set and optional
//! context (see [`key`](super::key)). Two users only share an entry when all
//! four agree, so nothing cached for one tenant or visibility level is ever
//! returned to another.
//!
//! # Expiry and eviction
//!
//! - An expired entry found by [`get`](SemanticCache::get) is removed and
//!   counted as a miss.
//! - At most once per `cleanup_interval`, the next `get` or `set` sweeps all
//!   expired entries. There is no background task.
//! - A `set` on a full cache first evicts the least valuable
//!   `eviction_fraction` of entries (at least one), ranked by hit count and
//!   then age.
//!
//! # Reverse index
//!
//! Entries may name the documents they were built from. The cache keeps a
//! `document_id → keys` index so [`invalidate_document`](SemanticCache::invalidate_document)
//! can drop exactly the affected entries. Every key in the index is live,
//! and removing an entry by any route unlinks it from every bucket it was in.
//!
//! # Locking
//!
//! One mutex covers entries, index and counters. Every public operation
//! holds it for its whole duration.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use super::key::{cache_key, hash_acl, hash_query};
use crate::telemetry;

/// Configuration for the semantic cache.
///
/// ```rust
/// # use heimdall::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_size(50_000)
///     .default_ttl(Duration::from_secs(600));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Maximum number of live entries. Default: 10,000.
    pub max_size: usize,
    /// TTL for entries stored without an explicit one. Default: 5 minutes.
    pub default_ttl: Duration,
    /// Minimum time between expiry sweeps. Default: 60s.
    pub cleanup_interval: Duration,
    /// Share of entries evicted when the cache is full. Default: 0.1.
    pub eviction_fraction: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 10_000,
            default_ttl: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(60),
            eviction_fraction: 0.1,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum number of live entries.
    pub fn max_size(mut self, n: usize) -> Self {
        self.max_size = n;
        self
    }

    /// TTL for entries stored without one.
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Minimum time between expiry sweeps.
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Share of entries dropped when the cache is full.
    pub fn eviction_fraction(mut self, fraction: f64) -> Self {
        self.eviction_fraction = fraction;
        self
    }
}

/// A cached value and its bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub created_at: Instant,
    pub ttl: Duration,
    pub tenant_id: String,
    pub acl_hash: String,
    pub query_hash: String,
    pub hit_count: u64,
    /// Documents this entry was derived from.
    pub document_ids: Vec<String>,
}

impl<T> CacheEntry<T> {
    pub fn is_expired(&self) -> bool {
        self.expired_at(Instant::now())
    }

    fn expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.ttl
    }
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Live entries at snapshot time.
    pub size: usize,
}

impl CacheStats {
    /// `hits / (hits + misses)`, or 0.0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Per-entry options for [`SemanticCache::set`].
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Overrides the cache's default TTL.
    pub ttl: Option<Duration>,
    /// Extra key component, e.g. a conversation id.
    pub context: Option<String>,
    /// Documents whose change should invalidate this entry.
    pub document_ids: Vec<String>,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn document_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.document_ids = ids.into_iter().map(Into::into).collect();
        self
    }
}

struct Inner<T> {
    entries: HashMap<String, CacheEntry<T>>,
    doc_index: HashMap<String, HashSet<String>>,
    hits: u64,
    misses: u64,
    evictions: u64,
    last_cleanup: Instant,
}

impl<T> Inner<T> {
    /// Remove an entry and unlink it from the reverse index.
    fn remove(&mut self, key: &str) -> Option<CacheEntry<T>> {
        let entry = self.entries.remove(key)?;
        for doc in &entry.document_ids {
            if let Some(keys) = self.doc_index.get_mut(doc) {
                keys.remove(key);
                if keys.is_empty() {
                    self.doc_index.remove(doc);
                }
            }
        }
        Some(entry)
    }

    fn record_miss(&mut self) {
        self.misses += 1;
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
    }

    fn record_evictions(&mut self, count: usize) {
        self.evictions += count as u64;
        metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL).increment(count as u64);
    }
}

/// In-memory cache of retrieval results, isolated by tenant and ACL.
///
/// ```rust
/// # use heimdall::{SemanticCache, CacheConfig, SetOptions};
/// let cache: SemanticCache<Vec<String>> = SemanticCache::new(CacheConfig::default());
/// cache.set(
///     "What is our refund policy?",
///     "acme",
///     &["PUBLIC"],
///     vec!["doc-7".to_string()],
///     SetOptions::new().document_ids(["doc-7"]),
/// );
/// assert!(cache.get("what is our refund policy?", "acme", &["PUBLIC"], None).is_some());
/// assert!(cache.get("what is our refund policy?", "globex", &["PUBLIC"], None).is_none());
/// ```
pub struct SemanticCache<T> {
    config: CacheConfig,
    inner: Mutex<Inner<T>>,
}

impl<T: Clone> SemanticCache<T> {
    pub fn new(config: CacheConfig) -> Self {
        debug!(
            max_size = config.max_size,
            default_ttl_secs = config.default_ttl.as_secs_f64(),
            cleanup_interval_secs = config.cleanup_interval.as_secs_f64(),
            "semantic cache initialised"
        );
        Self {
            config,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                doc_index: HashMap::new(),
                hits: 0,
                misses: 0,
                evictions: 0,
                last_cleanup: Instant::now(),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a cached value.
    ///
    /// Returns `None` when no entry exists or the entry has expired.
    pub fn get<S: AsRef<str>>(
        &self,
        query: &str,
        tenant_id: &str,
        acl: &[S],
        context: Option<&str>,
    ) -> Option<T> {
        let key = cache_key(query, tenant_id, acl, context);
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        self.sweep_expired(inner, now);

        match inner.entries.get_mut(&key) {
            None => {
                inner.record_miss();
                return None;
            }
            Some(entry) if !entry.expired_at(now) => {
                entry.hit_count += 1;
                let value = entry.value.clone();
                inner.hits += 1;
                metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(1);
                debug!(
                    tenant = tenant_id,
                    hit_count = entry.hit_count,
                    "cache hit"
                );
                return Some(value);
            }
            Some(_) => {}
        }

        inner.remove(&key);
        inner.record_miss();
        None
    }

    /// Store a value, evicting first if the cache is full.
    ///
    /// Storing under an existing key replaces the old entry, including its
    /// document links. A full cache evicts before an overwrite too.
    pub fn set<S: AsRef<str>>(
        &self,
        query: &str,
        tenant_id: &str,
        acl: &[S],
        value: T,
        options: SetOptions,
    ) {
        let key = cache_key(query, tenant_id, acl, options.context.as_deref());
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        self.sweep_expired(inner, now);

        // a full cache evicts even when the key is being overwritten
        if inner.entries.len() >= self.config.max_size.max(1) {
            self.evict(inner);
        }
        inner.remove(&key);

        let mut document_ids = options.document_ids;
        document_ids.sort();
        document_ids.dedup();
        for doc in &document_ids {
            inner
                .doc_index
                .entry(doc.clone())
                .or_default()
                .insert(key.clone());
        }

        inner.entries.insert(
            key,
            CacheEntry {
                value,
                created_at: now,
                ttl: options.ttl.unwrap_or(self.config.default_ttl),
                tenant_id: tenant_id.to_string(),
                acl_hash: hash_acl(acl),
                query_hash: hash_query(query),
                hit_count: 0,
                document_ids,
            },
        );
    }

    /// Drop every entry of `tenant_id` linked to `document_id`.
    ///
    /// The document's index bucket is removed as a whole. Returns the number
    /// of entries removed.
    pub fn invalidate_document(&self, document_id: &str, tenant_id: &str) -> usize {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let Some(keys) = inner.doc_index.remove(document_id) else {
            return 0;
        };

        let mut removed = 0;
        for key in keys {
            let owned = inner
                .entries
                .get(&key)
                .is_some_and(|entry| entry.tenant_id == tenant_id);
            if owned && inner.remove(&key).is_some() {
                removed += 1;
            }
        }

        metrics::counter!(telemetry::CACHE_INVALIDATIONS_TOTAL, "scope" => "document")
            .increment(removed as u64);
        info!(
            document = document_id,
            tenant = tenant_id,
            removed,
            "invalidated cache entries for document"
        );
        removed
    }

    /// Drop every entry belonging to `tenant_id`. Returns the number removed.
    pub fn invalidate_tenant(&self, tenant_id: &str) -> usize {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let keys: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.tenant_id == tenant_id)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            inner.remove(key);
        }

        metrics::counter!(telemetry::CACHE_INVALIDATIONS_TOTAL, "scope" => "tenant")
            .increment(keys.len() as u64);
        info!(
            tenant = tenant_id,
            removed = keys.len(),
            "invalidated cache entries for tenant"
        );
        keys.len()
    }

    /// Remove all entries and reset the counters.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.doc_index.clear();
        inner.hits = 0;
        inner.misses = 0;
        inner.evictions = 0;
        info!("semantic cache cleared");
    }

    pub fn get_stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            size: inner.entries.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove the lowest-ranked share of entries.
    fn evict(&self, inner: &mut Inner<T>) {
        let len = inner.entries.len();
        let fraction = self.config.eviction_fraction.clamp(0.0, 1.0);
        let count = ((len as f64 * fraction) as usize).max(1);

        let mut ranked: Vec<(u64, Instant, String)> = inner
            .entries
            .iter()
            .map(|(key, entry)| (entry.hit_count, entry.created_at, key.clone()))
            .collect();
        ranked.sort_unstable();

        let mut removed = 0;
        for (_, _, key) in ranked.into_iter().take(count) {
            if inner.remove(&key).is_some() {
                removed += 1;
            }
        }
        inner.record_evictions(removed);
        debug!(
            removed,
            size = inner.entries.len(),
            "evicted least used cache entries"
        );
    }

    /// Remove every expired entry if the cleanup interval has passed.
    fn sweep_expired(&self, inner: &mut Inner<T>, now: Instant) {
        if now.saturating_duration_since(inner.last_cleanup) < self.config.cleanup_interval {
            return;
        }
        inner.last_cleanup = now;

        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();
        if expired.is_empty() {
            return;
        }
        for key in &expired {
            inner.remove(key);
        }
        inner.record_evictions(expired.len());
        debug!(removed = expired.len(), "swept expired cache entries");
    }
}

impl<T> fmt::Debug for SemanticCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SemanticCache")
            .field("config", &self.config)
            .field("size", &self.inner.lock().entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACL: &[&str] = &["PUBLIC"];

    /// Every indexed key is live, and every live entry is indexed under each
    /// of its documents.
    fn assert_index_consistent<T>(cache: &SemanticCache<T>) {
        let inner = cache.inner.lock();
        for (doc, keys) in &inner.doc_index {
            assert!(!keys.is_empty(), "empty bucket left for {doc}");
            for key in keys {
                let entry = inner.entries.get(key).expect("dangling index key");
                assert!(entry.document_ids.contains(doc));
            }
        }
    }

    fn cache(max_size: usize) -> SemanticCache<u32> {
        SemanticCache::new(CacheConfig::new().max_size(max_size))
    }

    #[test]
    fn overwrite_relinks_documents() {
        let cache = cache(10);
        cache.set("q", "t", ACL, 1, SetOptions::new().document_ids(["d1"]));
        cache.set("q", "t", ACL, 2, SetOptions::new().document_ids(["d2"]));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.invalidate_document("d1", "t"), 0);
        assert_eq!(cache.get("q", "t", ACL, None), Some(2));
        assert_index_consistent(&cache);
    }

    #[test]
    fn eviction_unlinks_documents() {
        let cache = cache(3);
        for i in 0..10u32 {
            let doc = format!("d{}", i % 4);
            let options = SetOptions::new().document_ids([doc]);
            cache.set(&format!("q{i}"), "t", ACL, i, options);
            assert!(cache.len() <= 3);
            assert_index_consistent(&cache);
        }
        assert!(cache.get_stats().evictions > 0);
    }

    #[test]
    fn eviction_prefers_unused_entries() {
        let cache = SemanticCache::new(CacheConfig::new().max_size(3).eviction_fraction(0.34));
        cache.set("hot", "t", ACL, 1, SetOptions::new());
        cache.set("warm", "t", ACL, 2, SetOptions::new());
        cache.set("cold", "t", ACL, 3, SetOptions::new());
        cache.get("hot", "t", ACL, None);
        cache.get("warm", "t", ACL, None);

        cache.set("new", "t", ACL, 4, SetOptions::new());
        assert_eq!(cache.get("cold", "t", ACL, None), None);
        assert_eq!(cache.get("hot", "t", ACL, None), Some(1));
        assert_eq!(cache.get("warm", "t", ACL, None), Some(2));
    }

    #[test]
    fn eviction_breaks_ties_by_age() {
        let cache = SemanticCache::new(CacheConfig::new().max_size(2).eviction_fraction(0.5));
        cache.set("first", "t", ACL, 1, SetOptions::new());
        std::thread::sleep(Duration::from_millis(2));
        cache.set("second", "t", ACL, 2, SetOptions::new());
        cache.set("third", "t", ACL, 3, SetOptions::new());

        assert_eq!(cache.get("first", "t", ACL, None), None);
        assert_eq!(cache.get("second", "t", ACL, None), Some(2));
    }

    #[test]
    fn expired_get_removes_entry() {
        let cache = cache(10);
        cache.set(
            "q",
            "t",
            ACL,
            1,
            SetOptions::new().ttl(Duration::ZERO).document_ids(["d1"]),
        );
        std::thread::sleep(Duration::from_millis(2));

        assert_eq!(cache.get("q", "t", ACL, None), None);
        let stats = cache.get_stats();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 0);
        assert!(cache.inner.lock().doc_index.is_empty());
    }

    #[test]
    fn sweep_runs_after_interval() {
        let config = CacheConfig::new().cleanup_interval(Duration::ZERO);
        let cache: SemanticCache<u32> = SemanticCache::new(config);
        cache.set("a", "t", ACL, 1, SetOptions::new().ttl(Duration::ZERO));
        cache.set("b", "t", ACL, 2, SetOptions::new().ttl(Duration::ZERO));
        std::thread::sleep(Duration::from_millis(2));

        // sweep happens on the next call, before the lookup
        assert_eq!(cache.get("zzz", "t", ACL, None), None);
        let stats = cache.get_stats();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.evictions, 2);
    }

    #[test]
    fn sweep_waits_for_interval() {
        let interval = Duration::from_secs(3600);
        let config = CacheConfig::new().cleanup_interval(interval);
        let cache: SemanticCache<u32> = SemanticCache::new(config);
        cache.set("a", "t", ACL, 1, SetOptions::new().ttl(Duration::ZERO));
        cache.set("b", "t", ACL, 2, SetOptions::new().ttl(Duration::ZERO));
        std::thread::sleep(Duration::from_millis(2));

        assert_eq!(cache.get("zzz", "t", ACL, None), None);
        let stats = cache.get_stats();
        assert_eq!(stats.size, 2, "swept before the interval");
        assert_eq!(stats.evictions, 0);
    }

    #[test]
    fn concurrent_writers_keep_index_consistent() {
        let cache = cache(32);
        std::thread::scope(|s| {
            for worker in 0..6u32 {
                let cache = &cache;
                s.spawn(move || {
                    let tenant = format!("t{}", worker % 3);
                    for i in 0..300u32 {
                        let query = format!("q{}", i % 50);
                        let docs = [format!("d{}", i % 5), format!("d{}", (i + worker) % 9)];
                        let options = SetOptions::new().document_ids(docs);
                        cache.set(&query, &tenant, ACL, i, options);
                        cache.get(&query, &tenant, ACL, None);
                        if i % 40 == 0 {
                            cache.invalidate_document(&format!("d{}", i % 5), &tenant);
                        }
                        if i % 150 == 0 {
                            cache.invalidate_tenant(&tenant);
                        }
                    }
                });
            }
        });

        assert!(cache.len() <= 32);
        assert_index_consistent(&cache);
    }

    #[test]
    fn invalidate_document_respects_tenant() {
        let cache = cache(10);
        cache.set("q", "a", ACL, 1, SetOptions::new().document_ids(["shared"]));
        cache.set("q", "b", ACL, 2, SetOptions::new().document_ids(["shared"]));

        assert_eq!(cache.invalidate_document("shared", "a"), 1);
        assert_eq!(cache.get("q", "a", ACL, None), None);
        assert_eq!(cache.get("q", "b", ACL, None), Some(2));
        assert_index_consistent(&cache);
    }

    #[test]
    fn invalidate_tenant_counts() {
        let cache = cache(10);
        cache.set("q1", "a", ACL, 1, SetOptions::new().document_ids(["d"]));
        cache.set("q2", "a", ACL, 2, SetOptions::new());
        cache.set("q1", "b", ACL, 3, SetOptions::new().document_ids(["d"]));

        assert_eq!(cache.invalidate_tenant("a"), 2);
        assert_eq!(cache.len(), 1);
        assert_index_consistent(&cache);
    }

    #[test]
    fn clear_resets_everything() {
        let cache = cache(10);
        cache.set("q", "t", ACL, 1, SetOptions::new().document_ids(["d"]));
        cache.get("q", "t", ACL, None);
        cache.get("missing", "t", ACL, None);
        cache.clear();

        assert_eq!(cache.get_stats(), CacheStats::default());
        assert!(cache.inner.lock().doc_index.is_empty());
    }

    #[test]
    fn hit_count_tracked() {
        let cache = cache(10);
        cache.set("q", "t", ACL, 1, SetOptions::new());
        cache.get("q", "t", ACL, None);
        cache.get("Q ", "t", ACL, None);
        let inner = cache.inner.lock();
        let entry = inner.entries.values().next().unwrap();
        assert_eq!(entry.hit_count, 2);
        assert_eq!(entry.query_hash, hash_query("q"));
    }
}
