//! Telemetry metric name constants.
//!
//! Centralised metric names for heimdall operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `heimdall_`. Counters end in `_total`.
//!
//! # Common labels
//!
//! - `breaker`: circuit breaker name (e.g. "vector_index", "llm")
//! - `executor`: retry executor name
//! - `service`: degradable service name
//! - `scope`: invalidation scope: "document" or "tenant"

/// Breaker state transitions.
///
/// Labels: `breaker`, `to` ("open" | "half_open" | "closed").
pub const CIRCUIT_TRANSITIONS_TOTAL: &str = "heimdall_circuit_transitions_total";

/// Calls rejected by an open breaker.
///
/// Labels: `breaker`, `fallback` ("true" | "false").
pub const CIRCUIT_REJECTIONS_TOTAL: &str = "heimdall_circuit_rejections_total";

/// Failures recorded against a breaker (filtered errors only).
///
/// Labels: `breaker`.
pub const CIRCUIT_FAILURES_TOTAL: &str = "heimdall_circuit_failures_total";

/// Retry attempts scheduled (not counting the initial call).
///
/// Labels: `executor`.
pub const RETRIES_TOTAL: &str = "heimdall_retries_total";

/// Retry loops that gave up after the final attempt.
///
/// Labels: `executor`.
pub const RETRY_EXHAUSTED_TOTAL: &str = "heimdall_retry_exhausted_total";

/// Semantic cache hits.
pub const CACHE_HITS_TOTAL: &str = "heimdall_cache_hits_total";

/// Semantic cache misses (absent or expired).
pub const CACHE_MISSES_TOTAL: &str = "heimdall_cache_misses_total";

/// Entries removed by capacity eviction or the expiry sweep.
pub const CACHE_EVICTIONS_TOTAL: &str = "heimdall_cache_evictions_total";

/// Entries removed by explicit invalidation.
///
/// Labels: `scope` ("document" | "tenant").
pub const CACHE_INVALIDATIONS_TOTAL: &str = "heimdall_cache_invalidations_total";

/// Degradation flag per service: 1.0 when degraded, 0.0 otherwise.
///
/// Labels: `service`.
pub const DEGRADED: &str = "heimdall_degraded";
