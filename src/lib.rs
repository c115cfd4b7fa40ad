//! Heimdall - resilience and caching for retrieval-augmented generation
//!
//! This crate guards calls to slow or unreliable dependencies (vector index,
//! embedding service, LLM provider) on the request path:
//!
//! - [`CircuitBreaker`] isolates a failing dependency and tests recovery.
//! - [`RetryExecutor`] retries transient failures with bounded, jittered
//!   exponential backoff.
//! - [`SemanticCache`] memoises retrieval results per tenant and ACL, with
//!   TTL expiry, capacity eviction and document-triggered invalidation.
//! - [`DegradationRegistry`] holds operator-set flags telling callers to take
//!   a cheaper path.
//!
//! All state is per process and in memory. No component spawns tasks or
//! threads; the retry sleep is the only point where a caller is suspended.
//!
//! # Example
//!
//! ```rust,no_run
//! use heimdall::{Heimdall, HeimdallError, ResilienceConfig, SetOptions};
//!
//! #[tokio::main]
//! async fn main() -> heimdall::Result<()> {
//!     let layer = Heimdall::builder()
//!         .config(ResilienceConfig::load(None)?)
//!         .build::<Vec<String>>()?;
//!
//!     let acl = ["PUBLIC", "group:support"];
//!     if let Some(hits) = layer.cache().get("refund policy", "acme", &acl, None) {
//!         println!("cached: {hits:?}");
//!         return Ok(());
//!     }
//!
//!     let hits: Vec<String> = layer
//!         .call("vector_index", || async {
//!             // query the index here
//!             Ok::<_, HeimdallError>(vec!["doc-7".to_string()])
//!         })
//!         .await?;
//!
//!     layer.cache().set(
//!         "refund policy",
//!         "acme",
//!         &acl,
//!         hits.clone(),
//!         SetOptions::new().document_ids(hits.iter().cloned()),
//!     );
//!     Ok(())
//! }
//! ```

pub mod breaker;
pub mod cache;
pub mod config;
pub mod degradation;
pub mod error;
pub mod filter;
pub mod layer;
pub mod retry;
pub mod telemetry;

// Re-export main types at crate root
pub use error::{CircuitOpenError, HeimdallError, Result};
pub use filter::ErrorFilter;

pub use breaker::{
    BreakerRegistry, BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState, Protected,
};
pub use cache::{CacheConfig, CacheEntry, CacheStats, SemanticCache, SetOptions};
pub use config::{BreakerSettings, CacheSettings, ErrorClass, ResilienceConfig, RetrySettings};
pub use degradation::DegradationRegistry;
pub use layer::{Heimdall, HeimdallBuilder, ResilienceLayer, ResilienceReport};
pub use retry::{
    JitterSource, NoJitter, RetryConfig, RetryExecutor, RetryHook, SeededJitter, ThreadRngJitter,
};
