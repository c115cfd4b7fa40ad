//! Wrapper type binding a callable to a breaker.
//!
//! The callable is invoked through [`CircuitBreaker::execute`] on every
//! call, so call sites hold one value instead of repeating the breaker
//! plumbing.
//!
//! ```rust
//! # use std::sync::Arc;
//! # use heimdall::{CircuitBreaker, CircuitBreakerConfig, HeimdallError};
//! let breaker = Arc::new(CircuitBreaker::new("llm", CircuitBreakerConfig::llm()));
//! let complete = breaker.protect(|| Ok::<_, HeimdallError>("answer".to_string()));
//! assert_eq!(complete.call_blocking().unwrap(), "answer");
//! ```

use std::error::Error;
use std::future::Future;
use std::sync::Arc;

use super::CircuitBreaker;
use crate::CircuitOpenError;

/// A callable guarded by a [`CircuitBreaker`].
pub struct Protected<F> {
    breaker: Arc<CircuitBreaker>,
    action: F,
}

impl<F> Protected<F> {
    pub fn new(breaker: Arc<CircuitBreaker>, action: F) -> Self {
        Self { breaker, action }
    }

    /// The breaker guarding this callable.
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Invoke the wrapped async callable through the breaker.
    pub async fn call<T, E, Fut>(&self) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + From<CircuitOpenError> + 'static,
    {
        self.breaker.execute(|| (self.action)()).await
    }

    /// Invoke the wrapped async callable, running `fallback` if the circuit
    /// is open.
    pub async fn call_or<T, E, Fut, G, GFut>(&self, fallback: G) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
        E: Error + 'static,
    {
        self.breaker
            .execute_with_fallback(|| (self.action)(), fallback)
            .await
    }

    /// Invoke the wrapped blocking callable through the breaker.
    pub fn call_blocking<T, E>(&self) -> Result<T, E>
    where
        F: Fn() -> Result<T, E>,
        E: Error + From<CircuitOpenError> + 'static,
    {
        self.breaker.execute_blocking(|| (self.action)())
    }
}
