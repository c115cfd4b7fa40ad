//! Operator-controlled degradation flags.
//!
//! A service marked degraded stays degraded until someone clears the flag.
//! Nothing here talks to the breakers or the cache: callers check
//! [`DegradationRegistry::is_degraded`] and pick a cheaper path themselves.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::telemetry;

/// Per-service degradation flags. Unknown services are not degraded.
#[derive(Debug, Default)]
pub struct DegradationRegistry {
    modes: Mutex<HashMap<String, bool>>,
}

impl DegradationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or clear the degraded flag for `service`.
    pub fn set_degraded(&self, service: &str, degraded: bool) {
        let previous = self.modes.lock().insert(service.to_string(), degraded);

        let value = if degraded { 1.0 } else { 0.0 };
        metrics::gauge!(telemetry::DEGRADED, "service" => service.to_string()).set(value);

        match (previous.unwrap_or(false), degraded) {
            (false, true) => warn!(service, "service marked degraded"),
            (true, false) => info!(service, "service restored from degraded mode"),
            _ => {}
        }
    }

    pub fn is_degraded(&self, service: &str) -> bool {
        self.modes.lock().get(service).copied().unwrap_or(false)
    }

    /// Every service that has ever been flagged, with its current value.
    pub fn get_all_statuses(&self) -> BTreeMap<String, bool> {
        self.modes
            .lock()
            .iter()
            .map(|(name, degraded)| (name.clone(), *degraded))
            .collect()
    }
}
