//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Protected operation:
//!     → circuit_breaker.rs (admit or reject, classify outcome, drive state)
//!     → timeouts.rs (deadline and cancellation around each suspension)
//!     → On retryable failure: retries.rs (budget, classification)
//!     → backoff.rs (delay before the next attempt)
//!
//! Many named breakers:
//!     → manager.rs (registry, aggregate stats, background monitor)
//! ```
//!
//! # Design Decisions
//! - Breakers never retry; retries belong to the caller layered above
//! - Open → HalfOpen is evaluated lazily on the next call, not by a timer
//! - Outcome classification is injected through the config as plain closures
//! - Counters are only reachable through lock-guarded methods

pub mod backoff;
pub mod circuit_breaker;
pub mod manager;
pub mod retries;
pub mod timeouts;

pub use backoff::{calculate_backoff, Backoff};
pub use circuit_breaker::{
    CallOutcome, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState, CircuitStats,
    ExecuteHandle, OutcomePredicate, StateChangeListener,
};
pub use manager::{CircuitBreakerManager, HealthReport};
pub use retries::RetryPolicy;
pub use timeouts::{sleep_or_cancel, with_deadline};
