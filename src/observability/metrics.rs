//! Metrics collection and exposition.
//!
//! # Metrics
//! - `resilient_http_requests_total` (counter): completed requests by method, status
//! - `resilient_http_request_duration_seconds` (histogram): wall-clock duration
//! - `resilient_http_retries_total` (counter): retry attempts
//! - `resilient_http_rejections_total` (counter): rejections by reason
//! - `resilient_http_errors_total` (counter): failed requests by error kind
//! - `resilient_http_circuit_transitions_total` (counter): breaker transitions
//! - `resilient_http_circuit_state` (gauge): 0=closed, 1=half_open, 2=open
//!
//! # Design Decisions
//! - Pure sink: nothing here feeds back into control flow
//! - In-process snapshot for callers, `metrics` facade for exporters
//! - Rejections never record a network duration

use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::ResilienceError;
use crate::resilience::circuit_breaker::CircuitState;

/// Why a request never reached the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    CircuitOpen,
    RateLimited,
}

impl Rejection {
    fn as_str(self) -> &'static str {
        match self {
            Rejection::CircuitOpen => "circuit_open",
            Rejection::RateLimited => "rate_limited",
        }
    }
}

/// Point-in-time copy of everything the collector has seen.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub retries: u64,
    pub circuit_rejections: u64,
    pub rate_limit_rejections: u64,
    pub timeouts: u64,
    pub circuit_transitions: u64,
    pub status_counts: BTreeMap<u16, u64>,
    pub method_counts: BTreeMap<String, u64>,
    pub error_counts: BTreeMap<String, u64>,
    pub total_duration: Duration,
    pub min_duration: Option<Duration>,
    pub max_duration: Option<Duration>,
}

impl MetricsSnapshot {
    pub fn mean_duration(&self) -> Option<Duration> {
        let timed = self.successful_requests + self.failed_requests;
        (timed > 0).then(|| Duration::from_nanos((self.total_duration.as_nanos() / u128::from(timed)) as u64))
    }

    fn observe_duration(&mut self, duration: Duration) {
        self.total_duration += duration;
        self.min_duration = Some(self.min_duration.map_or(duration, |d| d.min(duration)));
        self.max_duration = Some(self.max_duration.map_or(duration, |d| d.max(duration)));
    }
}

/// Accumulates request counts and timings.
#[derive(Debug)]
pub struct MetricsCollector {
    enabled: bool,
    snapshot: Mutex<MetricsSnapshot>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(true)
    }
}

impl MetricsCollector {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            snapshot: Mutex::new(MetricsSnapshot::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// A request that produced an HTTP response.
    pub fn record_response(&self, method: &str, status: u16, duration: Duration) {
        if !self.enabled {
            return;
        }
        self.update(|s| {
            s.total_requests += 1;
            if status < 400 {
                s.successful_requests += 1;
            } else {
                s.failed_requests += 1;
            }
            *s.status_counts.entry(status).or_default() += 1;
            *s.method_counts.entry(method.to_string()).or_default() += 1;
            s.observe_duration(duration);
        });

        metrics::counter!(
            "resilient_http_requests_total",
            "method" => method.to_string(),
            "status" => status.to_string()
        )
        .increment(1);
        metrics::histogram!("resilient_http_request_duration_seconds").record(duration.as_secs_f64());
    }

    /// A request that ended in an error after reaching the network.
    pub fn record_error(&self, method: &str, error: &ResilienceError, duration: Duration) {
        if !self.enabled {
            return;
        }
        let kind = error.kind();
        self.update(|s| {
            s.total_requests += 1;
            s.failed_requests += 1;
            if matches!(error, ResilienceError::Timeout(_)) {
                s.timeouts += 1;
            }
            *s.method_counts.entry(method.to_string()).or_default() += 1;
            *s.error_counts.entry(kind.to_string()).or_default() += 1;
            s.observe_duration(duration);
        });

        metrics::counter!("resilient_http_errors_total", "kind" => kind).increment(1);
        metrics::histogram!("resilient_http_request_duration_seconds").record(duration.as_secs_f64());
    }

    /// A request turned away before any I/O.
    pub fn record_rejection(&self, method: &str, rejection: Rejection) {
        if !self.enabled {
            return;
        }
        self.update(|s| {
            s.total_requests += 1;
            match rejection {
                Rejection::CircuitOpen => s.circuit_rejections += 1,
                Rejection::RateLimited => s.rate_limit_rejections += 1,
            }
            *s.method_counts.entry(method.to_string()).or_default() += 1;
        });

        metrics::counter!("resilient_http_rejections_total", "reason" => rejection.as_str()).increment(1);
    }

    pub fn record_retry(&self) {
        if !self.enabled {
            return;
        }
        self.update(|s| s.retries += 1);
        metrics::counter!("resilient_http_retries_total").increment(1);
    }

    pub fn record_transition(&self, circuit: &str, to: CircuitState) {
        if !self.enabled {
            return;
        }
        self.update(|s| s.circuit_transitions += 1);

        metrics::counter!(
            "resilient_http_circuit_transitions_total",
            "circuit" => circuit.to_string(),
            "to" => to.to_string()
        )
        .increment(1);
        record_circuit_state(circuit, to);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.snapshot.lock().expect("metrics mutex poisoned").clone()
    }

    pub fn reset(&self) {
        *self.snapshot.lock().expect("metrics mutex poisoned") = MetricsSnapshot::default();
    }

    fn update(&self, f: impl FnOnce(&mut MetricsSnapshot)) {
        let mut snapshot = self.snapshot.lock().expect("metrics mutex poisoned");
        f(&mut snapshot);
    }
}

/// Publish a breaker's state as a gauge.
pub fn record_circuit_state(circuit: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    metrics::gauge!("resilient_http_circuit_state", "circuit" => circuit.to_string()).set(value);
}

/// Install the Prometheus exporter with an HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), ResilienceError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| ResilienceError::InvalidConfiguration(format!("failed to install metrics exporter: {e}")))?;

    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}
