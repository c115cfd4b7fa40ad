//! Name-keyed registry of circuit breakers.
//!
//! The registry is an ordinary value owned by whoever wires the process
//! together (usually a [`ResilienceLayer`](crate::ResilienceLayer)). Its lock
//! guards the name → breaker map only and is never taken on the call path;
//! callers hold `Arc<CircuitBreaker>` handles and go straight to the breaker.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use super::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig};

/// Registry of breakers, one per name.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a breaker and register it under `name`.
    ///
    /// Registering a name twice replaces the earlier entry; handles to the
    /// old breaker keep working but it is no longer reported.
    pub fn register(
        &self,
        name: impl Into<String>,
        config: CircuitBreakerConfig,
    ) -> Arc<CircuitBreaker> {
        let breaker = Arc::new(CircuitBreaker::new(name, config));
        self.insert(Arc::clone(&breaker));
        breaker
    }

    /// Register an existing breaker under its own name.
    pub fn insert(&self, breaker: Arc<CircuitBreaker>) {
        let name = breaker.name().to_string();
        if self.breakers.lock().insert(name.clone(), breaker).is_some() {
            warn!(breaker = %name, "replaced existing circuit breaker registration");
        }
    }

    /// Look up a breaker by name.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.lock().get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.breakers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot every registered breaker, keyed by name.
    ///
    /// Handles are collected under the registry lock; each breaker is then
    /// read under its own lock, so the registry lock is never nested.
    pub fn get_all_states(&self) -> BTreeMap<String, BreakerSnapshot> {
        let breakers: Vec<Arc<CircuitBreaker>> = self.breakers.lock().values().cloned().collect();
        breakers
            .iter()
            .map(|b| (b.name().to_string(), b.get_state()))
            .collect()
    }
}
