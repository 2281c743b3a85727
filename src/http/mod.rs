//! HTTP client subsystem.
//!
//! # Data Flow
//! ```text
//! Caller Request
//!     → request.rs (typed request, correlation ID)
//!     → client.rs (rate limiter → circuit breaker → retry loop)
//!     → transport.rs (one exchange per attempt, reqwest or a fake)
//!     → response.rs (status, headers, body, retry count)
//!     → Back to caller
//! ```
//!
//! # Design Decisions
//! - The transport is a trait so the pipeline can be tested without sockets
//! - Retries happen inside one breaker call; the breaker sees one outcome per request
//! - A request yields either a Response or a typed error, never both

pub mod client;
pub mod request;
pub mod response;
pub mod transport;

pub use client::{ResilientHttpClient, CLIENT_CIRCUIT_NAME};
pub use request::{generate_correlation_id, Body, Request};
pub use response::Response;
pub use transport::{HttpTransport, OutboundRequest, RawResponse, Transport};
