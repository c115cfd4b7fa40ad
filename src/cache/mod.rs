//! Retrieval result caching.
//!
//! [`SemanticCache`] memoises expensive retrieval results keyed by tenant,
//! normalised query and ACL set, with TTL expiry, capacity eviction and
//! per-document invalidation. Key derivation lives in [`key`].

pub mod key;
pub mod semantic;

pub use key::cache_key;
pub use semantic::{CacheConfig, CacheEntry, CacheStats, SemanticCache, SetOptions};
