//! Retry configuration, backoff calculation and the retry loop.
//!
//! [`RetryExecutor::run`] invokes an operation up to `max_attempts` times.
//! Between attempts it sleeps for
//! `min(base_delay * exponential_base^(attempt-1), max_delay)` plus a
//! symmetric random offset of up to `jitter` × that delay (never below zero).
//! The sleep is the only place the caller is suspended; the executor holds no
//! shared state besides its jitter source.
//!
//! Errors rejected by `retryable_errors` are returned on first occurrence.
//! After the final attempt the last error is returned as-is.

pub mod jitter;

use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::filter::ErrorFilter;
use crate::telemetry;

pub use jitter::{JitterSource, NoJitter, SeededJitter, ThreadRngJitter};

/// Callback invoked before each retry sleep with `(attempt, error, delay)`.
///
/// `attempt` is the 1-based number of the attempt that just failed.
#[derive(Clone)]
pub struct RetryHook(Arc<dyn Fn(u32, &(dyn Error + 'static), Duration) + Send + Sync>);

impl RetryHook {
    pub fn new<H>(hook: H) -> Self
    where
        H: Fn(u32, &(dyn Error + 'static), Duration) + Send + Sync + 'static,
    {
        Self(Arc::new(hook))
    }

    fn call(&self, attempt: u32, err: &(dyn Error + 'static), delay: Duration) {
        (self.0)(attempt, err, delay)
    }
}

impl fmt::Debug for RetryHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RetryHook")
    }
}

/// Configuration for retry behaviour.
///
/// ```rust
/// # use heimdall::{ErrorFilter, RetryConfig};
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(5)
///     .base_delay(Duration::from_millis(200))
///     .jitter(0.2)
///     .retryable_errors(ErrorFilter::transient());
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts including the first. Default: 3.
    pub max_attempts: u32,
    /// Delay before the first retry. Default: 1s.
    pub base_delay: Duration,
    /// Cap on the un-jittered delay. Default: 60s.
    pub max_delay: Duration,
    /// Growth factor per attempt. Default: 2.0.
    pub exponential_base: f64,
    /// Jitter as a fraction of the delay, in `[0, 1)`. Default: 0.1.
    pub jitter: f64,
    /// Errors worth retrying. Default: all.
    pub retryable_errors: ErrorFilter,
    /// Called before each retry sleep.
    pub on_retry: Option<RetryHook>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
            jitter: 0.1,
            retryable_errors: ErrorFilter::all(),
            on_retry: None,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single attempt, no retries.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Vector index profile: 3 attempts, 0.5s base, 10s cap, 20% jitter.
    pub fn vector_index() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            jitter: 0.2,
            ..Self::default()
        }
    }

    /// Embedding service profile: 3 attempts, 1s base, 30s cap.
    pub fn embedding() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            ..Self::default()
        }
    }

    /// LLM provider profile: 2 attempts, 2s base, 30s cap.
    pub fn llm() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            ..Self::default()
        }
    }

    /// Total attempts including the first call.
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Delay after the first failed attempt.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Upper bound on the un-jittered delay.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Growth factor between consecutive delays.
    pub fn exponential_base(mut self, base: f64) -> Self {
        self.exponential_base = base;
        self
    }

    /// Jitter as a fraction of the delay. Clamped to `[0, 1]` when applied.
    pub fn jitter(mut self, fraction: f64) -> Self {
        self.jitter = fraction;
        self
    }

    /// Errors worth another attempt. Everything else is returned at once.
    pub fn retryable_errors(mut self, filter: ErrorFilter) -> Self {
        self.retryable_errors = filter;
        self
    }

    /// Callback run before each retry sleep.
    pub fn on_retry<H>(mut self, hook: H) -> Self
    where
        H: Fn(u32, &(dyn Error + 'static), Duration) + Send + Sync + 'static,
    {
        self.on_retry = Some(RetryHook::new(hook));
        self
    }

    /// Un-jittered delay after the given 1-based attempt failed.
    ///
    /// `base_delay * exponential_base^(attempt-1)`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.exponential_base.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }
}

/// Runs fallible operations with bounded, jittered exponential backoff.
pub struct RetryExecutor {
    name: String,
    config: RetryConfig,
    jitter: Arc<dyn JitterSource>,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            name: "default".to_string(),
            config,
            jitter: Arc::new(ThreadRngJitter),
        }
    }

    /// Name used in logs and metric labels.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Replace the random source used for jitter.
    pub fn with_jitter(mut self, source: Arc<dyn JitterSource>) -> Self {
        self.jitter = source;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `action` until it succeeds, fails with a non-retryable error, or
    /// runs out of attempts.
    ///
    /// Sleeps with `tokio::time::sleep`, so it must be polled inside a tokio
    /// runtime with the timer enabled.
    pub async fn run<T, E, F, Fut>(&self, mut action: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + 'static,
    {
        let mut attempt = 1;
        loop {
            match action().await {
                Ok(value) => return Ok(value),
                Err(err) => match self.next_delay(attempt, &err) {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => return Err(err),
                },
            }
            attempt += 1;
        }
    }

    /// Blocking form of [`run`](Self::run); parks the calling thread between
    /// attempts.
    pub fn run_blocking<T, E, F>(&self, mut action: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        E: Error + 'static,
    {
        let mut attempt = 1;
        loop {
            match action() {
                Ok(value) => return Ok(value),
                Err(err) => match self.next_delay(attempt, &err) {
                    Some(delay) => std::thread::sleep(delay),
                    None => return Err(err),
                },
            }
            attempt += 1;
        }
    }

    /// Decide what happens after `attempt` failed with `err`: `None` to give
    /// up, or the delay before the next attempt.
    fn next_delay(&self, attempt: u32, err: &(dyn Error + 'static)) -> Option<Duration> {
        let max_attempts = self.config.max_attempts.max(1);

        if !self.config.retryable_errors.matches(err) {
            debug!(executor = %self.name, attempt, error = %err, "error not retryable");
            return None;
        }

        if attempt >= max_attempts {
            metrics::counter!(telemetry::RETRY_EXHAUSTED_TOTAL, "executor" => self.name.clone())
                .increment(1);
            error!(
                executor = %self.name,
                attempts = attempt,
                error = %err,
                "retry exhausted"
            );
            return None;
        }

        let delay = self.backoff(attempt);
        metrics::counter!(telemetry::RETRIES_TOTAL, "executor" => self.name.clone()).increment(1);
        warn!(
            executor = %self.name,
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "retrying after error"
        );

        if let Some(hook) = &self.config.on_retry {
            hook.call(attempt, err, delay);
        }
        Some(delay)
    }

    /// Backoff for `attempt` with jitter applied, clamped at zero.
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.config.delay_for_attempt(attempt);
        let secs = base.as_secs_f64();
        let fraction = if self.config.jitter.is_finite() {
            self.config.jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let spread = secs * fraction;
        let jittered = (secs + self.jitter.offset(spread)).max(0.0);
        Duration::try_from_secs_f64(jittered).unwrap_or(base)
    }
}

impl fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
