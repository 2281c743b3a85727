//! Retry policy.
//!
//! Decides whether an attempt outcome is worth another try and how long to
//! wait first. Transport failures and timeouts are always retryable; HTTP
//! statuses are retryable only when listed in the configured set.

use std::collections::BTreeSet;

use crate::config::RetryConfig;
use crate::error::ResilienceError;
use crate::resilience::backoff::Backoff;

/// Retry budget and classification for one client.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retryable_statuses: BTreeSet<u16>,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retryable_statuses: config.retryable_statuses.iter().copied().collect(),
            backoff: config.backoff(),
        }
    }

    /// Effective retry count: the larger of the request override and the default.
    pub fn retries_for(&self, request_override: Option<u32>) -> u32 {
        request_override.unwrap_or(0).max(self.max_retries)
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    pub fn is_retryable_error(&self, error: &ResilienceError) -> bool {
        matches!(
            error,
            ResilienceError::Transport(_) | ResilienceError::Timeout(_)
        )
    }
}
