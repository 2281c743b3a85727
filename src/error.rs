//! Error taxonomy shared by the client, breaker, limiter and manager.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the resilience layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResilienceError {
    /// The circuit breaker rejected the call without attempting it.
    #[error("circuit breaker '{name}' is open")]
    CircuitOpen { name: String },

    /// The rate limiter denied admission.
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    /// An attempt ran past its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The caller (or an upstream token) cancelled while we were waiting.
    #[error("operation cancelled")]
    Cancelled,

    /// Malformed configuration supplied at construction.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The underlying exchange failed (connect, TLS, read).
    #[error("transport error: {0}")]
    Transport(String),

    /// A request could not be built from the supplied parts.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A protected operation ended without producing an outcome.
    #[error("operation failed: {0}")]
    Operation(String),

    /// No breaker is registered under this name.
    #[error("circuit breaker '{0}' not found")]
    CircuitNotFound(String),

    /// A breaker is already registered under this name.
    #[error("circuit breaker '{0}' already exists")]
    CircuitAlreadyExists(String),
}

impl ResilienceError {
    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ResilienceError::CircuitOpen { .. } => "circuit_open",
            ResilienceError::RateLimitExceeded => "rate_limit_exceeded",
            ResilienceError::Timeout(_) => "timeout",
            ResilienceError::Cancelled => "cancelled",
            ResilienceError::InvalidConfiguration(_) => "invalid_configuration",
            ResilienceError::Transport(_) => "transport",
            ResilienceError::InvalidRequest(_) => "invalid_request",
            ResilienceError::Operation(_) => "operation",
            ResilienceError::CircuitNotFound(_) => "circuit_not_found",
            ResilienceError::CircuitAlreadyExists(_) => "circuit_already_exists",
        }
    }

    /// True for rejections that happen before any network I/O.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ResilienceError::CircuitOpen { .. } | ResilienceError::RateLimitExceeded
        )
    }
}

/// Result type for resilience operations.
pub type Result<T> = std::result::Result<T, ResilienceError>;
