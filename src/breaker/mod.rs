//! Per-dependency circuit breakers.
//!
//! # States
//!
//! ```text
//! CLOSED    --failure_count >= failure_threshold-->  OPEN
//! OPEN      --recovery_timeout elapsed, next call--> HALF_OPEN
//! HALF_OPEN --success_count >= success_threshold-->  CLOSED
//! HALF_OPEN --any recorded failure-->                OPEN
//! ```
//!
//! While OPEN, calls are rejected without invoking the action: the fallback
//! runs if one was supplied, otherwise the caller gets a
//! [`CircuitOpenError`]. The first call arriving after the recovery timeout
//! performs the OPEN → HALF_OPEN transition and is let through; calls in
//! HALF_OPEN are let through until enough successes close the circuit or a
//! failure reopens it.
//!
//! Only errors accepted by the breaker's [`ErrorFilter`] count as failures.
//! Anything else propagates untouched and leaves the state as it was.
//!
//! Each breaker owns its own mutex. It is taken for bookkeeping only, never
//! while the action runs.

pub mod protect;
pub mod registry;

use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::CircuitOpenError;
use crate::filter::ErrorFilter;
use crate::telemetry;

pub use protect::Protected;
pub use registry::BreakerRegistry;

/// Breaker phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, calls pass through.
    Closed,
    /// Dependency assumed down, calls are rejected.
    Open,
    /// Probing recovery.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for a circuit breaker.
///
/// ```rust
/// # use heimdall::{CircuitBreakerConfig, ErrorFilter};
/// # use std::time::Duration;
/// let config = CircuitBreakerConfig::new()
///     .failure_threshold(3)
///     .recovery_timeout(Duration::from_secs(60))
///     .success_threshold(1)
///     .expected_errors(ErrorFilter::transient());
/// ```
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Recorded failures in CLOSED before the circuit opens. Default: 5.
    pub failure_threshold: u32,
    /// Time since the last failure before an OPEN circuit tests recovery. Default: 30s.
    pub recovery_timeout: Duration,
    /// Successes in HALF_OPEN needed to close. Default: 2.
    pub success_threshold: u32,
    /// Errors that count as failures. Default: all.
    pub expected_errors: ErrorFilter,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
            expected_errors: ErrorFilter::all(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset for the vector index: 5 failures, 30s recovery, 2 successes.
    pub fn vector_index() -> Self {
        Self::default()
    }

    /// Preset for the embedding service: 3 failures, 60s recovery, 1 success.
    pub fn embedding() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 1,
            ..Self::default()
        }
    }

    /// Preset for the LLM provider: 3 failures, 60s recovery, 1 success.
    pub fn llm() -> Self {
        Self::embedding()
    }

    /// Consecutive failures that open the breaker.
    pub fn failure_threshold(mut self, n: u32) -> Self {
        self.failure_threshold = n;
        self
    }

    /// Time spent open before a call may test recovery.
    pub fn recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    /// Successes in half-open needed to close again.
    pub fn success_threshold(mut self, n: u32) -> Self {
        self.success_threshold = n;
        self
    }

    /// Errors that count as failures. Others pass through unrecorded.
    pub fn expected_errors(mut self, filter: ErrorFilter) -> Self {
        self.expected_errors = filter;
        self
    }
}

/// Read-only view of a breaker for monitoring.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    /// When the most recent failure was recorded.
    #[serde(skip)]
    pub last_failure_time: Option<Instant>,
    /// Age of the most recent failure at snapshot time.
    pub since_last_failure: Option<Duration>,
}

#[derive(Debug)]
struct BreakerState {
    phase: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<Instant>,
}

impl Default for BreakerState {
    fn default() -> Self {
        Self {
            phase: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_time: None,
        }
    }
}

/// Failure gate for one dependency.
///
/// ```rust
/// # use heimdall::{CircuitBreaker, CircuitBreakerConfig, HeimdallError};
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let breaker = CircuitBreaker::new("vector_index", CircuitBreakerConfig::vector_index());
/// let hits: Result<Vec<String>, HeimdallError> = breaker
///     .execute(|| async { Ok(vec!["doc-1".to_string()]) })
///     .await;
/// assert!(hits.is_ok());
/// # }
/// ```
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        debug!(
            breaker = %name,
            failure_threshold = config.failure_threshold,
            recovery_timeout_ms = config.recovery_timeout.as_millis() as u64,
            success_threshold = config.success_threshold,
            "circuit breaker initialised"
        );
        Self {
            name,
            config,
            state: Mutex::new(BreakerState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current phase.
    ///
    /// An OPEN breaker whose recovery timeout has elapsed still reports OPEN
    /// until a call arrives and performs the transition.
    pub fn state(&self) -> CircuitState {
        self.state.lock().phase
    }

    /// Snapshot of the breaker for monitoring.
    pub fn get_state(&self) -> BreakerSnapshot {
        let state = self.state.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: state.phase,
            failure_count: state.failure_count,
            success_count: state.success_count,
            last_failure_time: state.last_failure_time,
            since_last_failure: state.last_failure_time.map(|t| t.elapsed()),
        }
    }

    /// Run `action` under breaker protection.
    ///
    /// Returns `E::from(CircuitOpenError)` without invoking `action` when the
    /// circuit is open. Errors from `action` are returned unchanged; those
    /// matching the expected-error filter are recorded as failures first.
    pub async fn execute<T, E, F, Fut>(&self, action: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + From<CircuitOpenError> + 'static,
    {
        if !self.admit() {
            return Err(self.reject(false).into());
        }
        self.observe(action().await)
    }

    /// Like [`execute`](Self::execute), but runs `fallback` instead of
    /// failing when the circuit is open.
    pub async fn execute_with_fallback<T, E, F, Fut, G, GFut>(
        &self,
        action: F,
        fallback: G,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
        E: Error + 'static,
    {
        if !self.admit() {
            self.reject(true);
            return fallback().await;
        }
        self.observe(action().await)
    }

    /// Blocking form of [`execute`](Self::execute).
    pub fn execute_blocking<T, E, F>(&self, action: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: Error + From<CircuitOpenError> + 'static,
    {
        if !self.admit() {
            return Err(self.reject(false).into());
        }
        self.observe(action())
    }

    /// Blocking form of [`execute_with_fallback`](Self::execute_with_fallback).
    pub fn execute_blocking_with_fallback<T, E, F, G>(&self, action: F, fallback: G) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        G: FnOnce() -> Result<T, E>,
        E: Error + 'static,
    {
        if !self.admit() {
            self.reject(true);
            return fallback();
        }
        self.observe(action())
    }

    /// Force the breaker back to CLOSED with both counters cleared.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.phase = CircuitState::Closed;
        state.failure_count = 0;
        state.success_count = 0;
        info!(breaker = %self.name, "circuit breaker manually reset");
    }

    /// Decide whether a call may proceed, performing OPEN → HALF_OPEN when
    /// the recovery timeout has elapsed.
    fn admit(&self) -> bool {
        let mut state = self.state.lock();
        match state.phase {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = state.last_failure_time.map_or(Duration::MAX, |t| t.elapsed());
                if elapsed < self.config.recovery_timeout {
                    return false;
                }
                state.phase = CircuitState::HalfOpen;
                state.success_count = 0;
                info!(
                    breaker = %self.name,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "circuit breaker half-open, probing recovery"
                );
                self.count_transition(CircuitState::HalfOpen);
                true
            }
        }
    }

    fn reject(&self, with_fallback: bool) -> CircuitOpenError {
        metrics::counter!(telemetry::CIRCUIT_REJECTIONS_TOTAL,
            "breaker" => self.name.clone(),
            "fallback" => if with_fallback { "true" } else { "false" },
        )
        .increment(1);
        if with_fallback {
            debug!(breaker = %self.name, "circuit open, using fallback");
        }
        CircuitOpenError::new(&self.name)
    }

    fn observe<T, E: Error + 'static>(&self, result: Result<T, E>) -> Result<T, E> {
        match &result {
            Ok(_) => self.record_success(),
            Err(e) if self.config.expected_errors.matches(e) => self.record_failure(e),
            Err(_) => {}
        }
        result
    }

    fn record_success(&self) {
        let mut state = self.state.lock();
        match state.phase {
            CircuitState::Closed => state.failure_count = 0,
            CircuitState::HalfOpen => {
                state.success_count += 1;
                if state.success_count >= self.config.success_threshold {
                    info!(
                        breaker = %self.name,
                        successes = state.success_count,
                        "circuit breaker closed"
                    );
                    state.phase = CircuitState::Closed;
                    state.failure_count = 0;
                    state.success_count = 0;
                    self.count_transition(CircuitState::Closed);
                }
            }
            // a call admitted before the circuit reopened
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self, err: &(dyn Error + 'static)) {
        metrics::counter!(telemetry::CIRCUIT_FAILURES_TOTAL, "breaker" => self.name.clone())
            .increment(1);

        let mut state = self.state.lock();
        state.failure_count = state.failure_count.saturating_add(1);
        state.last_failure_time = Some(Instant::now());

        match state.phase {
            CircuitState::Closed if state.failure_count >= self.config.failure_threshold => {
                warn!(
                    breaker = %self.name,
                    failures = state.failure_count,
                    error = %err,
                    "circuit breaker opened"
                );
                state.phase = CircuitState::Open;
                self.count_transition(CircuitState::Open);
            }
            CircuitState::HalfOpen => {
                warn!(
                    breaker = %self.name,
                    error = %err,
                    "circuit breaker reopened by failure while half-open"
                );
                state.phase = CircuitState::Open;
                state.success_count = 0;
                self.count_transition(CircuitState::Open);
            }
            _ => {}
        }
    }

    fn count_transition(&self, to: CircuitState) {
        metrics::counter!(telemetry::CIRCUIT_TRANSITIONS_TOTAL,
            "breaker" => self.name.clone(),
            "to" => to.as_str(),
        )
        .increment(1);
    }

    /// Wrap `action` so every call goes through this breaker.
    pub fn protect<F>(self: &Arc<Self>, action: F) -> Protected<F> {
        Protected::new(Arc::clone(self), action)
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &*self.state.lock())
            .finish()
    }
}
