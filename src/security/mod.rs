//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Outgoing request:
//!     → rate_limit.rs (token-bucket admission)
//!     → auth.rs (credentials for the configured scheme)
//!     → Pass to the circuit breaker and transport
//! ```
//!
//! # Design Decisions
//! - Admission is decided before any I/O
//! - Credentials are marked sensitive so they never show up in debug output

pub mod auth;
pub mod rate_limit;

pub use auth::AuthConfig;
pub use rate_limit::RateLimiter;
