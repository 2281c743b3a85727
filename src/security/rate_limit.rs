//! Token-bucket admission control.
//!
//! Tokens refill lazily from elapsed time on every access; there is no
//! background timer. `wait` retries exactly once after one refill interval,
//! so sustained overload still produces `RateLimitExceeded` instead of an
//! unbounded block.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::RateLimitConfig;
use crate::error::ResilienceError;
use crate::resilience::timeouts::sleep_or_cancel;

/// Float slack when comparing refilled tokens against a whole token.
const TOKEN_EPSILON: f64 = 1e-9;

/// A simple token bucket.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn refill(&mut self, capacity: f64, refill_rate: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> bool {
        self.refill(capacity, refill_rate);

        if self.tokens + TOKEN_EPSILON >= 1.0 {
            self.tokens = (self.tokens - 1.0).max(0.0);
            true
        } else {
            false
        }
    }
}

/// Bounds operation throughput to `rate` per second with `burst` capacity.
#[derive(Debug)]
pub struct RateLimiter {
    rate: f64,
    burst: u32,
    interval: Duration,
    bucket: Mutex<TokenBucket>,
}

/// Time to replenish one token at `requests_per_second`, or `None` when the
/// rate is not positive or the interval does not fit in a `Duration`.
pub fn refill_interval_for(requests_per_second: f64) -> Option<Duration> {
    if !(requests_per_second.is_finite() && requests_per_second > 0.0) {
        return None;
    }
    Duration::try_from_secs_f64(1.0 / requests_per_second).ok()
}

impl RateLimiter {
    /// Create a limiter with a full bucket.
    pub fn new(requests_per_second: f64, burst: u32) -> Result<Self, ResilienceError> {
        let interval = refill_interval_for(requests_per_second).ok_or_else(|| {
            ResilienceError::InvalidConfiguration(format!(
                "rate limit requests_per_second must be positive with a representable refill interval, got {requests_per_second}"
            ))
        })?;
        if burst == 0 {
            return Err(ResilienceError::InvalidConfiguration(
                "rate limit burst must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            rate: requests_per_second,
            burst,
            interval,
            bucket: Mutex::new(TokenBucket::new(f64::from(burst))),
        })
    }

    pub fn from_config(config: &RateLimitConfig) -> Result<Self, ResilienceError> {
        Self::new(config.requests_per_second, config.burst)
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }

    /// Interval after which one token is guaranteed to have been replenished.
    pub fn refill_interval(&self) -> Duration {
        self.interval
    }

    /// Tokens available right now, after a lazy refill.
    pub fn available_tokens(&self) -> f64 {
        let mut bucket = self.bucket.lock().expect("rate limiter mutex poisoned");
        bucket.refill(f64::from(self.burst), self.rate);
        bucket.tokens
    }

    /// Take a token if one is available, without waiting.
    pub fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock().expect("rate limiter mutex poisoned");
        bucket.try_acquire(f64::from(self.burst), self.rate)
    }

    /// Take a token, waiting at most one refill interval for it.
    pub async fn wait(&self, token: &CancellationToken) -> Result<(), ResilienceError> {
        if token.is_cancelled() {
            return Err(ResilienceError::Cancelled);
        }
        if self.try_acquire() {
            return Ok(());
        }

        let interval = self.refill_interval();
        tracing::debug!(wait_ms = interval.as_millis() as u64, "Rate limiter empty, waiting for refill");
        sleep_or_cancel(interval, token).await?;

        if self.try_acquire() {
            Ok(())
        } else {
            tracing::warn!(rps = self.rate, burst = self.burst, "Rate limit exceeded");
            Err(ResilienceError::RateLimitExceeded)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_rejects_invalid_settings() {
        assert!(RateLimiter::new(0.0, 1).is_err());
        assert!(RateLimiter::new(f64::NAN, 1).is_err());
        assert!(RateLimiter::new(10.0, 0).is_err());
    }

    #[test]
    fn test_rejects_rate_with_unrepresentable_interval() {
        let err = RateLimiter::new(1e-20, 1).unwrap_err();
        assert!(matches!(err, ResilienceError::InvalidConfiguration(_)));
        assert_eq!(refill_interval_for(1e-20), None);

        let slow = RateLimiter::new(0.5, 1).unwrap();
        assert_eq!(slow.refill_interval(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_call_waits_one_interval() {
        let limiter = RateLimiter::new(10.0, 1).unwrap();
        let token = CancellationToken::new();

        let start = Instant::now();
        limiter.wait(&token).await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.wait(&token).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_never_exceed_burst() {
        let limiter = RateLimiter::new(100.0, 3).unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(limiter.available_tokens() <= 3.0);

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        tokio::time::advance(Duration::from_millis(10)).await;
        assert!(limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overload_is_rejected_not_blocked() {
        let limiter = Arc::new(RateLimiter::new(1.0, 1).unwrap());
        let token = CancellationToken::new();
        limiter.wait(&token).await.unwrap();

        let a = {
            let limiter = limiter.clone();
            let token = token.clone();
            tokio::spawn(async move { limiter.wait(&token).await })
        };
        let b = {
            let limiter = limiter.clone();
            let token = token.clone();
            tokio::spawn(async move { limiter.wait(&token).await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.contains(&Err(ResilienceError::RateLimitExceeded)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_honours_cancellation() {
        let limiter = RateLimiter::new(0.1, 1).unwrap();
        let token = CancellationToken::new();
        assert!(limiter.try_acquire());

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            canceller.cancel();
        });

        assert_eq!(limiter.wait(&token).await, Err(ResilienceError::Cancelled));
    }
}
