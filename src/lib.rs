//! Resilient HTTP client library: circuit breakers, rate limiting and
//! retries around outbound HTTP calls.

pub mod config;
pub mod error;
pub mod http;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::ClientConfig;
pub use error::{ResilienceError, Result};
pub use http::{Request, Response, ResilientHttpClient};
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerManager, CircuitState};
pub use security::RateLimiter;
