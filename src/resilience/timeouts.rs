//! Deadline enforcement.
//!
//! Every suspension point races three things: the work itself, a deadline and
//! a cancellation token. Whichever finishes first decides the outcome, so one
//! timeout budget governs the whole attempt.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::ResilienceError;

/// Run `fut` until it completes, `limit` elapses, or `token` is cancelled.
pub async fn with_deadline<F, T>(
    limit: Duration,
    token: &CancellationToken,
    fut: F,
) -> Result<T, ResilienceError>
where
    F: Future<Output = Result<T, ResilienceError>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ResilienceError::Cancelled),
        res = tokio::time::timeout(limit, fut) => match res {
            Ok(inner) => inner,
            Err(_) => Err(ResilienceError::Timeout(limit)),
        },
    }
}

/// Sleep for `delay` unless `token` is cancelled first.
pub async fn sleep_or_cancel(delay: Duration, token: &CancellationToken) -> Result<(), ResilienceError> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ResilienceError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
