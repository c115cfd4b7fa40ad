//! Heimdall error types

use std::time::Duration;

/// Returned by a [`CircuitBreaker`](crate::CircuitBreaker) that rejected a
/// call while open and had no fallback to run instead.
///
/// Wrapped calls surface this through the caller's own error type, which
/// must implement `From<CircuitOpenError>`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("circuit breaker '{name}' is open")]
pub struct CircuitOpenError {
    /// Name of the breaker that rejected the call.
    pub name: String,
}

impl CircuitOpenError {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Heimdall error types
#[derive(Debug, thiserror::Error)]
pub enum HeimdallError {
    // Breaker rejection
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),

    // Dependency/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("dependency error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("authentication failed")]
    AuthenticationFailed,

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unknown dependency: {0}")]
    UnknownDependency(String),
}

impl HeimdallError {
    /// Whether this error is worth retrying.
    ///
    /// Network failures, timeouts, rate limiting, unavailability and 5xx/429
    /// responses are transient. A rejection by an open breaker is not: the
    /// breaker already decided the dependency is down.
    pub fn is_transient(&self) -> bool {
        match self {
            HeimdallError::Http(_)
            | HeimdallError::Timeout(_)
            | HeimdallError::RateLimited { .. }
            | HeimdallError::Unavailable(_) => true,
            HeimdallError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Whether this error is a breaker rejection.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, HeimdallError::CircuitOpen(_))
    }
}

/// Result type alias for Heimdall operations
pub type Result<T> = std::result::Result<T, HeimdallError>;
