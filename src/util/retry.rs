//! Exponential backoff with jitter for retried collaborator calls.
//!
//! Implements the AWS-recommended Full Jitter strategy.
use std::time::Duration;

use rand::Rng;

/// Retry policy for a single collaborator call site.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub(crate) max_attempts: usize,
    /// Base delay in milliseconds.
    pub(crate) base_delay_ms: u64,
    /// Delay ceiling in milliseconds.
    pub(crate) max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 250,
            max_delay_ms: 10_000,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub(crate) const fn new(max_attempts: usize, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// Delay before the given attempt (0-indexed; attempt 0 never waits).
    #[must_use]
    pub(crate) fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::from_millis(0);
        }

        let exponential_delay = self
            .base_delay_ms
            .saturating_mul(1_u64.saturating_shl((attempt - 1) as u32));
        let capped_delay = exponential_delay.min(self.max_delay_ms);

        let jittered_delay = if capped_delay > 0 {
            rand::thread_rng().gen_range(0..=capped_delay)
        } else {
            0
        };

        Duration::from_millis(jittered_delay)
    }

    #[must_use]
    pub(crate) const fn can_retry(&self, attempt: usize) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_for_attempt_zero_is_zero() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(0));
    }

    #[test]
    fn delay_for_attempt_increases_exponentially() {
        let config = RetryConfig::new(5, 100, 10_000);

        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(0));
        assert!(config.delay_for_attempt(1) <= Duration::from_millis(100));
        assert!(config.delay_for_attempt(2) <= Duration::from_millis(200));
        assert!(config.delay_for_attempt(3) <= Duration::from_millis(400));
    }

    #[test]
    fn delay_for_attempt_respects_max_delay() {
        let config = RetryConfig::new(10, 100, 500);
        assert!(config.delay_for_attempt(10) <= Duration::from_millis(500));
    }

    #[test]
    fn can_retry_respects_max_attempts() {
        let config = RetryConfig::new(3, 100, 1000);
        assert!(config.can_retry(0));
        assert!(config.can_retry(2));
        assert!(!config.can_retry(3));
    }

    #[test]
    fn full_jitter_provides_variation() {
        let config = RetryConfig::new(5, 100, 10_000);
        let delays: Vec<Duration> = (0..10).map(|_| config.delay_for_attempt(3)).collect();
        assert!(
            !delays.windows(2).all(|w| w[0] == w[1]),
            "jitter should produce varying delays"
        );
    }
}
