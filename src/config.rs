//! TOML configuration for breakers, retry policies and the cache.
//!
//! Configuration is loaded with the following resolution order:
//! 1. explicit path (error if missing)
//! 2. `~/.heimdall/config.toml` (user)
//! 3. `/etc/heimdall/config.toml` (system)
//!
//! When no file exists the built-in defaults are used: breakers and retry
//! policies for `vector_index`, `embedding` and `llm`, and a 10,000 entry
//! cache. A `[breakers]` or `[retry]` section in a file replaces the
//! corresponding defaults entirely; fields left out of a table fall back to
//! the generic defaults.
//!
//! ```toml
//! [breakers.vector_index]
//! failure_threshold = 5
//! recovery_timeout_secs = 30
//! success_threshold = 2
//! expected_errors = "transient"
//!
//! [retry.vector_index]
//! max_attempts = 3
//! base_delay_ms = 500
//! max_delay_ms = 10000
//! jitter = 0.2
//!
//! [cache]
//! max_size = 10000
//! default_ttl_secs = 300
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::breaker::CircuitBreakerConfig;
use crate::cache::CacheConfig;
use crate::filter::ErrorFilter;
use crate::retry::RetryConfig;
use crate::{HeimdallError, Result};

/// Names of the dependencies configured out of the box.
pub const DEFAULT_DEPENDENCIES: [&str; 3] = ["vector_index", "embedding", "llm"];

/// Complete resilience configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Breaker settings per dependency.
    #[serde(default = "default_breakers")]
    pub breakers: BTreeMap<String, BreakerSettings>,
    /// Retry policy per dependency.
    #[serde(default = "default_retry")]
    pub retry: BTreeMap<String, RetrySettings>,
    #[serde(default)]
    pub cache: CacheSettings,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            breakers: default_breakers(),
            retry: default_retry(),
            cache: CacheSettings::default(),
        }
    }
}

fn default_breakers() -> BTreeMap<String, BreakerSettings> {
    let presets = [
        CircuitBreakerConfig::vector_index(),
        CircuitBreakerConfig::embedding(),
        CircuitBreakerConfig::llm(),
    ];
    DEFAULT_DEPENDENCIES
        .into_iter()
        .zip(presets)
        .map(|(name, config)| (name.to_string(), BreakerSettings::from_preset(&config)))
        .collect()
}

fn default_retry() -> BTreeMap<String, RetrySettings> {
    let presets = [
        RetryConfig::vector_index(),
        RetryConfig::embedding(),
        RetryConfig::llm(),
    ];
    DEFAULT_DEPENDENCIES
        .into_iter()
        .zip(presets)
        .map(|(name, config)| (name.to_string(), RetrySettings::from_preset(&config)))
        .collect()
}

/// Which errors a breaker records or a retry policy retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorClass {
    /// Every error.
    #[default]
    All,
    /// Only transient [`HeimdallError`]s.
    Transient,
}

impl ErrorClass {
    pub fn filter(self) -> ErrorFilter {
        match self {
            ErrorClass::All => ErrorFilter::all(),
            ErrorClass::Transient => ErrorFilter::transient(),
        }
    }
}

/// `[breakers.<name>]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerSettings {
    /// Failures before opening (default: 5).
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Seconds before an open breaker tests recovery (default: 30).
    #[serde(default = "default_recovery_timeout_secs")]
    pub recovery_timeout_secs: u64,
    /// Half-open successes before closing (default: 2).
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    #[serde(default)]
    pub expected_errors: ErrorClass,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_secs: default_recovery_timeout_secs(),
            success_threshold: default_success_threshold(),
            expected_errors: ErrorClass::All,
        }
    }
}

impl BreakerSettings {
    fn from_preset(config: &CircuitBreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            recovery_timeout_secs: config.recovery_timeout.as_secs(),
            success_threshold: config.success_threshold,
            expected_errors: ErrorClass::All,
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout_secs() -> u64 {
    30
}

fn default_success_threshold() -> u32 {
    2
}

impl From<&BreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &BreakerSettings) -> Self {
        CircuitBreakerConfig::new()
            .failure_threshold(settings.failure_threshold)
            .recovery_timeout(Duration::from_secs(settings.recovery_timeout_secs))
            .success_threshold(settings.success_threshold)
            .expected_errors(settings.expected_errors.filter())
    }
}

/// `[retry.<name>]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Attempts including the first (default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds (default: 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Delay cap in milliseconds (default: 60000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Backoff growth factor (default: 2.0).
    #[serde(default = "default_exponential_base")]
    pub exponential_base: f64,
    /// Jitter fraction in `[0, 1)` (default: 0.1).
    #[serde(default = "default_jitter")]
    pub jitter: f64,
    #[serde(default)]
    pub retryable_errors: ErrorClass,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            exponential_base: default_exponential_base(),
            jitter: default_jitter(),
            retryable_errors: ErrorClass::All,
        }
    }
}

impl RetrySettings {
    fn from_preset(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay_ms: config.base_delay.as_millis() as u64,
            max_delay_ms: config.max_delay.as_millis() as u64,
            exponential_base: config.exponential_base,
            jitter: config.jitter,
            retryable_errors: ErrorClass::All,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_exponential_base() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.1
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        RetryConfig::new()
            .max_attempts(settings.max_attempts)
            .base_delay(Duration::from_millis(settings.base_delay_ms))
            .max_delay(Duration::from_millis(settings.max_delay_ms))
            .exponential_base(settings.exponential_base)
            .jitter(settings.jitter)
            .retryable_errors(settings.retryable_errors.filter())
    }
}

/// `[cache]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Maximum live entries (default: 10000).
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// Default entry TTL in seconds (default: 300).
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
    /// Minimum seconds between expiry sweeps (default: 60).
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// Share of entries evicted when full, in `(0, 1]` (default: 0.1).
    #[serde(default = "default_eviction_fraction")]
    pub eviction_fraction: f64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            default_ttl_secs: default_ttl_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            eviction_fraction: default_eviction_fraction(),
        }
    }
}

fn default_max_size() -> usize {
    10_000
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

fn default_eviction_fraction() -> f64 {
    0.1
}

impl From<&CacheSettings> for CacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        CacheConfig::new()
            .max_size(settings.max_size)
            .default_ttl(Duration::from_secs(settings.default_ttl_secs))
            .cleanup_interval(Duration::from_secs(settings.cleanup_interval_secs))
            .eviction_fraction(settings.eviction_fraction)
    }
}

impl ResilienceConfig {
    /// Load configuration from the standard locations and validate it.
    ///
    /// Returns the defaults when no file exists and no explicit path was
    /// given.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let Some(path) = Self::resolve_config_path(explicit_path)? else {
            debug!("no config file found, using defaults");
            return Ok(Self::default());
        };
        debug!(path = %path.display(), "loading config");
        let content = fs::read_to_string(&path).map_err(|e| {
            HeimdallError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            HeimdallError::Configuration(msg) => {
                HeimdallError::Configuration(format!("{path:?}: {msg}"))
            }
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| HeimdallError::Configuration(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| HeimdallError::Configuration(format!("Failed to render config: {e}")))
    }

    /// Reject settings the runtime types cannot honour.
    pub fn validate(&self) -> Result<()> {
        for (name, breaker) in &self.breakers {
            if breaker.failure_threshold == 0 {
                return Err(invalid(format!(
                    "breakers.{name}.failure_threshold must be at least 1"
                )));
            }
            if breaker.success_threshold == 0 {
                return Err(invalid(format!(
                    "breakers.{name}.success_threshold must be at least 1"
                )));
            }
        }

        for (name, retry) in &self.retry {
            if retry.max_attempts == 0 {
                return Err(invalid(format!("retry.{name}.max_attempts must be at least 1")));
            }
            if !(0.0..1.0).contains(&retry.jitter) {
                return Err(invalid(format!(
                    "retry.{name}.jitter must be in [0, 1), got {}",
                    retry.jitter
                )));
            }
            if !retry.exponential_base.is_finite() || retry.exponential_base <= 0.0 {
                return Err(invalid(format!(
                    "retry.{name}.exponential_base must be a positive number, got {}",
                    retry.exponential_base
                )));
            }
        }

        if self.cache.max_size == 0 {
            return Err(invalid("cache.max_size must be at least 1".to_string()));
        }
        let fraction = self.cache.eviction_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(invalid(format!(
                "cache.eviction_fraction must be in (0, 1], got {fraction}"
            )));
        }
        Ok(())
    }

    /// Resolve the config file path. `Ok(None)` when nothing was found.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(HeimdallError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".heimdall").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/heimdall/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }
}

fn invalid(message: String) -> HeimdallError {
    HeimdallError::Configuration(message)
}
