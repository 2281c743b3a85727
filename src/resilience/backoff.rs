//! Exponential backoff with optional jitter.

use rand::Rng;
use std::time::Duration;

/// Delay schedule between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Growth factor applied per attempt.
    pub multiplier: f64,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Add 0-10% random jitter on top of the capped delay.
    pub jitter: bool,
}

impl Backoff {
    pub fn new(base_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            base_delay,
            multiplier,
            max_delay,
            jitter: false,
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay to wait after the given zero-based failed attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let capped = calculate_backoff(attempt, self.base_delay, self.multiplier, self.max_delay);
        if self.jitter {
            add_jitter(capped)
        } else {
            capped
        }
    }

    /// Upper bound on the summed delays of `retries` consecutive retries,
    /// jitter included.
    pub fn max_total(&self, retries: u32) -> Duration {
        let exact = retries.min(EXACT_TERMS);
        let mut total = (0..exact).fold(Duration::ZERO, |acc, attempt| {
            acc.saturating_add(calculate_backoff(attempt, self.base_delay, self.multiplier, self.max_delay))
        });
        total = total.saturating_add(self.max_delay.saturating_mul(retries - exact));
        if self.jitter {
            total = total.saturating_add(total / 10);
        }
        total
    }
}

/// Terms summed one by one in `max_total`; later ones are bounded by `max_delay`.
const EXACT_TERMS: u32 = 64;

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), 2.0, Duration::from_secs(10))
    }
}

/// `min(base * multiplier^attempt, max)` without jitter.
pub fn calculate_backoff(attempt: u32, base: Duration, multiplier: f64, max: Duration) -> Duration {
    let factor = multiplier.max(1.0).powi(attempt.min(i32::MAX as u32) as i32);
    let delay_secs = base.as_secs_f64() * factor;

    if !delay_secs.is_finite() || delay_secs >= max.as_secs_f64() {
        return max;
    }

    Duration::from_secs_f64(delay_secs)
}

fn add_jitter(delay: Duration) -> Duration {
    let jitter_range = delay.as_millis() as u64 / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    delay + Duration::from_millis(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        let base = Duration::from_millis(100);
        let max = Duration::from_millis(2000);

        assert_eq!(calculate_backoff(0, base, 2.0, max), Duration::from_millis(100));
        assert_eq!(calculate_backoff(1, base, 2.0, max), Duration::from_millis(200));
        assert_eq!(calculate_backoff(3, base, 2.0, max), Duration::from_millis(800));
        assert_eq!(calculate_backoff(10, base, 2.0, max), max);
    }

    #[test]
    fn test_huge_attempt_saturates_at_max() {
        let max = Duration::from_secs(5);
        assert_eq!(calculate_backoff(u32::MAX, Duration::from_secs(1), 3.0, max), max);
    }

    #[test]
    fn test_max_total_bounds_every_schedule() {
        let backoff = Backoff::new(Duration::from_millis(100), 2.0, Duration::from_secs(10));
        assert_eq!(backoff.max_total(0), Duration::ZERO);
        assert_eq!(backoff.max_total(3), Duration::from_millis(700));
        assert_eq!(backoff.with_jitter(true).max_total(3), Duration::from_millis(770));

        let capped = Backoff::new(Duration::from_secs(1), 2.0, Duration::from_secs(2));
        assert_eq!(capped.max_total(100), Duration::from_secs(1 + 99 * 2));
        assert!(capped.max_total(u32::MAX) > Duration::from_secs(1_000_000));
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        let backoff = Backoff::new(Duration::from_millis(1000), 1.0, Duration::from_secs(5)).with_jitter(true);
        for _ in 0..50 {
            let d = backoff.delay(0);
            assert!(d >= Duration::from_millis(1000));
            assert!(d < Duration::from_millis(1100));
        }
    }
}
