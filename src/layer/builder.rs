//! Builder for resilience layers

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use super::ResilienceLayer;
use crate::breaker::{BreakerRegistry, CircuitBreakerConfig};
use crate::cache::{CacheConfig, SemanticCache};
use crate::config::ResilienceConfig;
use crate::degradation::DegradationRegistry;
use crate::filter::ErrorFilter;
use crate::retry::{JitterSource, RetryConfig, RetryExecutor};
use crate::{HeimdallError, Result};

/// Main entry point for creating resilience layers.
pub struct Heimdall;

impl Heimdall {
    /// Create a new builder, starting from the default configuration.
    pub fn builder() -> HeimdallBuilder {
        HeimdallBuilder::new()
    }
}

/// Builder for [`ResilienceLayer`].
///
/// ```rust
/// # use heimdall::{ErrorFilter, Heimdall, HeimdallError, ResilienceConfig};
/// let layer = Heimdall::builder()
///     .config(ResilienceConfig::default())
///     .expected_errors("llm", ErrorFilter::transient())
///     .build::<Vec<String>>()?;
/// assert!(layer.breaker("llm").is_some());
/// # Ok::<(), HeimdallError>(())
/// ```
pub struct HeimdallBuilder {
    config: ResilienceConfig,
    jitter: Option<Arc<dyn JitterSource>>,
    expected_errors: HashMap<String, ErrorFilter>,
    retryable_errors: HashMap<String, ErrorFilter>,
}

impl HeimdallBuilder {
    pub fn new() -> Self {
        Self {
            config: ResilienceConfig::default(),
            jitter: None,
            expected_errors: HashMap::new(),
            retryable_errors: HashMap::new(),
        }
    }

    /// Use this configuration instead of the defaults.
    pub fn config(mut self, config: ResilienceConfig) -> Self {
        self.config = config;
        self
    }

    /// Random source for every retry executor's jitter.
    pub fn jitter(mut self, source: Arc<dyn JitterSource>) -> Self {
        self.jitter = Some(source);
        self
    }

    /// Override which errors the named breaker records.
    pub fn expected_errors(mut self, dependency: impl Into<String>, filter: ErrorFilter) -> Self {
        self.expected_errors.insert(dependency.into(), filter);
        self
    }

    /// Override which errors the named retry policy retries.
    pub fn retryable_errors(mut self, dependency: impl Into<String>, filter: ErrorFilter) -> Self {
        self.retryable_errors.insert(dependency.into(), filter);
        self
    }

    /// Build the layer.
    ///
    /// Components are created in a fixed order: configuration is validated,
    /// then breakers, retry executors, the degradation registry and finally
    /// the cache.
    pub fn build<T: Clone>(mut self) -> Result<ResilienceLayer<T>> {
        self.config.validate()?;

        if let Some(name) = unknown_override(&self.expected_errors, |n| {
            self.config.breakers.contains_key(n)
        }) {
            return Err(HeimdallError::Configuration(format!(
                "expected_errors override for unconfigured breaker '{name}'"
            )));
        }
        if let Some(name) = unknown_override(&self.retryable_errors, |n| {
            self.config.retry.contains_key(n)
        }) {
            return Err(HeimdallError::Configuration(format!(
                "retryable_errors override for unconfigured retry policy '{name}'"
            )));
        }

        let breakers = BreakerRegistry::new();
        for (name, settings) in &self.config.breakers {
            let mut config = CircuitBreakerConfig::from(settings);
            if let Some(filter) = self.expected_errors.remove(name) {
                config = config.expected_errors(filter);
            }
            breakers.register(name.clone(), config);
        }

        let mut retries = HashMap::with_capacity(self.config.retry.len());
        for (name, settings) in &self.config.retry {
            let mut config = RetryConfig::from(settings);
            if let Some(filter) = self.retryable_errors.remove(name) {
                config = config.retryable_errors(filter);
            }
            let mut executor = RetryExecutor::new(config).with_name(name.clone());
            if let Some(source) = &self.jitter {
                executor = executor.with_jitter(Arc::clone(source));
            }
            retries.insert(name.clone(), executor);
        }

        let degradation = DegradationRegistry::new();
        let cache = SemanticCache::new(CacheConfig::from(&self.config.cache));

        info!(
            breakers = breakers.len(),
            retry_policies = retries.len(),
            cache_max_size = self.config.cache.max_size,
            "resilience layer built"
        );

        Ok(ResilienceLayer {
            breakers,
            retries,
            degradation,
            cache,
        })
    }
}

impl Default for HeimdallBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn unknown_override<'a>(
    overrides: &'a HashMap<String, ErrorFilter>,
    known: impl Fn(&str) -> bool,
) -> Option<&'a str> {
    let mut unknown: Vec<&str> = overrides
        .keys()
        .map(String::as_str)
        .filter(|name| !known(name))
        .collect();
    unknown.sort_unstable();
    unknown.first().copied()
}
