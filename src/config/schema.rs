//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client.
//! All types derive Serde traits for deserialization from config files, and
//! every section has defaults so a minimal file is enough.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::resilience::backoff::Backoff;
use crate::resilience::circuit_breaker::CircuitBreakerConfig;
use crate::security::auth::AuthConfig;

/// Root configuration for the resilient HTTP client.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL that relative request paths are joined onto.
    pub base_url: Option<String>,

    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Connection pool sizing.
    pub pool: PoolConfig,

    /// TLS options passed through to the transport.
    pub tls: TlsConfig,

    /// Authentication scheme and credentials.
    pub auth: AuthConfig,

    /// Headers added to every request unless the request sets them.
    pub default_headers: BTreeMap<String, String>,

    /// Circuit breaker settings.
    pub circuit_breaker: CircuitBreakerSettings,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Logging settings.
    pub logging: LoggingConfig,

    /// Metrics settings.
    pub metrics: MetricsConfig,

    /// Correlation ID propagation.
    pub correlation: CorrelationConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: 30_000,
            retries: RetryConfig::default(),
            pool: PoolConfig::default(),
            tls: TlsConfig::default(),
            auth: AuthConfig::default(),
            default_headers: BTreeMap::new(),
            circuit_breaker: CircuitBreakerSettings::default(),
            rate_limit: RateLimitConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
            correlation: CorrelationConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,

    /// Delay before the first retry in milliseconds.
    pub base_delay_ms: u64,

    /// Growth factor between consecutive delays.
    pub backoff_multiplier: f64,

    /// Cap on any single delay in milliseconds.
    pub max_delay_ms: u64,

    /// Response statuses that trigger a retry.
    pub retryable_statuses: Vec<u16>,

    /// Add up to 10% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            backoff_multiplier: 2.0,
            max_delay_ms: 10_000,
            retryable_statuses: vec![408, 429, 500, 502, 503, 504],
            jitter: false,
        }
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.base_delay_ms),
            self.backoff_multiplier,
            Duration::from_millis(self.max_delay_ms),
        )
        .with_jitter(self.jitter)
    }
}

/// Connection pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum idle connections kept per host.
    pub max_idle_per_host: usize,

    /// Idle connection timeout in seconds.
    pub idle_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 10,
            idle_timeout_secs: 90,
        }
    }
}

/// TLS configuration for outbound connections.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct TlsConfig {
    /// Accept invalid certificates. Testing only.
    pub insecure_skip_verify: bool,

    /// Path to client certificate file (PEM).
    pub client_cert_path: Option<String>,

    /// Path to client private key file (PEM).
    pub client_key_path: Option<String>,

    /// Extra root certificate (PEM).
    pub ca_cert_path: Option<String>,
}

/// Circuit breaker settings for the client's breaker.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Enable circuit breaking.
    pub enabled: bool,

    /// Consecutive failures before opening.
    pub failure_threshold: u32,

    /// Half-open successes before closing.
    pub success_threshold: u32,

    /// Time spent open before a trial call, in milliseconds.
    pub open_timeout_ms: u64,

    /// Deadline for half-open trial calls, in milliseconds.
    pub half_open_timeout_ms: u64,

    /// Default deadline for calls made directly through the breaker, in milliseconds.
    /// The client derives each request's deadline from its attempt timeouts and backoff.
    pub call_timeout_ms: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout_ms: 60_000,
            half_open_timeout_ms: 30_000,
            call_timeout_ms: 120_000,
        }
    }
}

impl CircuitBreakerSettings {
    /// Breaker config for these settings, carrying the client's retry schedule.
    pub fn to_breaker_config(&self, retries: &RetryConfig) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
            open_timeout: Duration::from_millis(self.open_timeout_ms),
            half_open_timeout: Duration::from_millis(self.half_open_timeout_ms),
            call_timeout: Duration::from_millis(self.call_timeout_ms),
            max_retries: retries.max_retries,
            retry_base_delay: Duration::from_millis(retries.base_delay_ms),
            backoff_multiplier: retries.backoff_multiplier,
            max_backoff_delay: Duration::from_millis(retries.max_delay_ms),
            failure_predicate: None,
            success_predicate: None,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Sustained requests per second.
    pub requests_per_second: f64,

    /// Burst capacity.
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_second: 100.0,
            burst: 10,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Emit a structured event per request.
    pub enabled: bool,

    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// Output format for the CLI subscriber.
    pub format: LogFormat,

    /// Include (truncated) request bodies in debug events.
    pub log_request_body: bool,

    /// Include (truncated) response bodies in debug events.
    pub log_response_body: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            format: LogFormat::Pretty,
            log_request_body: false,
            log_response_body: false,
        }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Collect metrics.
    pub enabled: bool,

    /// Prometheus exporter bind address; no exporter when unset.
    pub exporter_address: Option<String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            exporter_address: None,
        }
    }
}

/// Correlation ID configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Generate an ID for requests that do not carry one.
    pub enabled: bool,

    /// Header the ID is sent in.
    pub header_name: String,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            header_name: "X-Correlation-ID".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert!(config.circuit_breaker.enabled);
        assert!(!config.rate_limit.enabled);
        assert_eq!(config.correlation.header_name, "X-Correlation-ID");
        assert!(config.retries.retryable_statuses.contains(&503));
    }

    #[test]
    fn test_minimal_toml() {
        let config: ClientConfig = toml::from_str(
            r#"
            base_url = "https://api.example.com"

            [retries]
            max_retries = 5

            [rate_limit]
            enabled = true
            requests_per_second = 20.0
            "#,
        )
        .unwrap();

        assert_eq!(config.base_url.as_deref(), Some("https://api.example.com"));
        assert_eq!(config.retries.max_retries, 5);
        assert_eq!(config.retries.base_delay_ms, 100);
        assert!(config.rate_limit.enabled);
        assert_eq!(config.rate_limit.burst, 10);
    }

    #[test]
    fn test_breaker_config_carries_retry_schedule() {
        let retries = RetryConfig {
            max_retries: 4,
            base_delay_ms: 50,
            ..Default::default()
        };
        let breaker = CircuitBreakerSettings::default().to_breaker_config(&retries);
        assert_eq!(breaker.max_retries, 4);
        assert_eq!(breaker.retry_base_delay, Duration::from_millis(50));
        assert_eq!(breaker.backoff().delay(1), Duration::from_millis(100));
    }
}
