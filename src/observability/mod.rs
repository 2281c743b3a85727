//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Client, breaker and limiter produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, histograms, breaker gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//!     → MetricsSnapshot for in-process callers
//! ```
//!
//! # Design Decisions
//! - The library never installs a subscriber or exporter itself
//! - Correlation ID is a field on every request event
//! - Metrics are a pure sink with no effect on control flow

pub mod logging;
pub mod metrics;

pub use metrics::{MetricsCollector, MetricsSnapshot, Rejection};
