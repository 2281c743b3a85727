//! Configuration validation.
//!
//! Serde handles syntax; this checks value ranges and cross-field rules.
//! Every problem is reported, not just the first.

use std::fmt;
use url::Url;

use crate::config::schema::ClientConfig;
use crate::security::rate_limit::refill_interval_for;

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Some(base_url) = &config.base_url {
        if let Err(e) = Url::parse(base_url) {
            errors.push(ValidationError::new("base_url", format!("'{base_url}' is not a valid URL: {e}")));
        }
    }
    if config.timeout_ms == 0 {
        errors.push(ValidationError::new("timeout_ms", "must be greater than zero"));
    }

    let retries = &config.retries;
    if !(retries.backoff_multiplier >= 1.0) {
        errors.push(ValidationError::new("retries.backoff_multiplier", "must be >= 1.0"));
    }
    if retries.base_delay_ms > retries.max_delay_ms {
        errors.push(ValidationError::new(
            "retries.base_delay_ms",
            format!("{} exceeds max_delay_ms {}", retries.base_delay_ms, retries.max_delay_ms),
        ));
    }
    for status in &retries.retryable_statuses {
        if !(100..=599).contains(status) {
            errors.push(ValidationError::new(
                "retries.retryable_statuses",
                format!("{status} is not an HTTP status code"),
            ));
        }
    }

    let tls = &config.tls;
    if tls.client_cert_path.is_some() != tls.client_key_path.is_some() {
        errors.push(ValidationError::new(
            "tls.client_cert_path",
            "client certificate and key must be configured together",
        ));
    }

    let breaker = &config.circuit_breaker;
    if breaker.enabled {
        if breaker.failure_threshold == 0 {
            errors.push(ValidationError::new("circuit_breaker.failure_threshold", "must be at least 1"));
        }
        if breaker.success_threshold == 0 {
            errors.push(ValidationError::new("circuit_breaker.success_threshold", "must be at least 1"));
        }
        if breaker.call_timeout_ms == 0 {
            errors.push(ValidationError::new("circuit_breaker.call_timeout_ms", "must be greater than zero"));
        }
        if breaker.half_open_timeout_ms == 0 {
            errors.push(ValidationError::new(
                "circuit_breaker.half_open_timeout_ms",
                "must be greater than zero",
            ));
        }
    }

    let rate_limit = &config.rate_limit;
    if rate_limit.enabled {
        if refill_interval_for(rate_limit.requests_per_second).is_none() {
            errors.push(ValidationError::new(
                "rate_limit.requests_per_second",
                "must be positive and large enough for a representable refill interval",
            ));
        }
        if rate_limit.burst == 0 {
            errors.push(ValidationError::new("rate_limit.burst", "must be at least 1"));
        }
    }

    if config.correlation.enabled && config.correlation.header_name.trim().is_empty() {
        errors.push(ValidationError::new("correlation.header_name", "must not be empty"));
    }

    if let Some(addr) = &config.metrics.exporter_address {
        if addr.parse::<std::net::SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "metrics.exporter_address",
                format!("'{addr}' is not a socket address"),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
