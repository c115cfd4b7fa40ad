//! Assembled resilience layer.
//!
//! [`ResilienceLayer`] owns one of each component, built from a
//! [`ResilienceConfig`](crate::ResilienceConfig) by [`Heimdall::builder`].
//! It replaces process-wide singletons: construct one at startup and pass it
//! (or an `Arc` of it) to the request handlers that need it.
//!
//! [`ResilienceLayer::call`] composes the pieces for a named dependency: the
//! breaker wraps the retry loop, which wraps the action. An exhausted retry
//! loop therefore counts as a single breaker failure, and an open breaker
//! skips the retry loop entirely.

mod builder;

pub use builder::{Heimdall, HeimdallBuilder};

use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;

use crate::breaker::{BreakerRegistry, BreakerSnapshot, CircuitBreaker};
use crate::cache::{CacheStats, SemanticCache};
use crate::degradation::DegradationRegistry;
use crate::retry::RetryExecutor;
use crate::{CircuitOpenError, HeimdallError};

/// Breakers, retry executors, degradation flags and a cache for values of
/// type `T`.
pub struct ResilienceLayer<T> {
    pub(crate) breakers: BreakerRegistry,
    pub(crate) retries: HashMap<String, RetryExecutor>,
    pub(crate) degradation: DegradationRegistry,
    pub(crate) cache: SemanticCache<T>,
}

/// Monitoring snapshot of a whole layer.
#[derive(Debug, Clone, Serialize)]
pub struct ResilienceReport {
    pub breakers: BTreeMap<String, BreakerSnapshot>,
    pub degraded: BTreeMap<String, bool>,
    pub cache: CacheStats,
}

impl<T: Clone> ResilienceLayer<T> {
    pub fn breaker(&self, dependency: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(dependency)
    }

    pub fn retry(&self, dependency: &str) -> Option<&RetryExecutor> {
        self.retries.get(dependency)
    }

    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    pub fn degradation(&self) -> &DegradationRegistry {
        &self.degradation
    }

    pub fn cache(&self) -> &SemanticCache<T> {
        &self.cache
    }

    /// Call a dependency through its breaker and retry policy.
    ///
    /// Either may be missing from the configuration, in which case only the
    /// other applies. A dependency with neither is
    /// [`HeimdallError::UnknownDependency`].
    pub async fn call<R, E, F, Fut>(&self, dependency: &str, action: F) -> Result<R, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: Error + From<CircuitOpenError> + From<HeimdallError> + 'static,
    {
        match (self.breakers.get(dependency), self.retries.get(dependency)) {
            (Some(breaker), Some(retry)) => breaker.execute(|| retry.run(action)).await,
            (Some(breaker), None) => breaker.execute(action).await,
            (None, Some(retry)) => retry.run(action).await,
            (None, None) => Err(HeimdallError::UnknownDependency(dependency.to_string()).into()),
        }
    }

    /// Blocking form of [`call`](Self::call).
    pub fn call_blocking<R, E, F>(&self, dependency: &str, action: F) -> Result<R, E>
    where
        F: FnMut() -> Result<R, E>,
        E: Error + From<CircuitOpenError> + From<HeimdallError> + 'static,
    {
        match (self.breakers.get(dependency), self.retries.get(dependency)) {
            (Some(breaker), Some(retry)) => breaker.execute_blocking(|| retry.run_blocking(action)),
            (Some(breaker), None) => breaker.execute_blocking(action),
            (None, Some(retry)) => retry.run_blocking(action),
            (None, None) => Err(HeimdallError::UnknownDependency(dependency.to_string()).into()),
        }
    }

    /// Snapshot breakers, degradation flags and cache counters.
    pub fn report(&self) -> ResilienceReport {
        ResilienceReport {
            breakers: self.breakers.get_all_states(),
            degraded: self.degradation.get_all_statuses(),
            cache: self.cache.get_stats(),
        }
    }
}

impl<T> fmt::Debug for ResilienceLayer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut retries: Vec<&String> = self.retries.keys().collect();
        retries.sort();
        f.debug_struct("ResilienceLayer")
            .field("breakers", &self.breakers)
            .field("retries", &retries)
            .field("degradation", &self.degradation)
            .field("cache", &self.cache)
            .finish()
    }
}
