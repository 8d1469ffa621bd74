//! Bounded exponential backoff.
//!
//! One policy is shared by the bus (event redelivery) and the stage runners
//! (per-item black-box retries). Jitter is derived from the clock's
//! subsecond nanos rather than a PRNG; +0% to +20% is enough to break up
//! thundering herds of redeliveries.

use chrono::{Timelike, Utc};
use std::time::Duration;

/// Bounded exponential backoff policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum total attempts (first try included). Must be at least 1.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Ceiling for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the given attempt bound and default delays.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Returns true if another attempt is allowed after `attempt` failures.
    #[must_use]
    pub const fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Returns the delay before the attempt following failure `attempt`
    /// (1-indexed), with jitter.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let raw = self
            .base_delay
            .saturating_mul(2_u32.saturating_pow(exponent));
        let capped = raw.min(self.max_delay);

        // +0%..+20% jitter from subsecond nanos; retries never fire early.
        let nanos = f64::from(Utc::now().nanosecond() % 1_000_000_000);
        let factor = nanos.mul_add(0.2 / 1_000_000_000.0, 1.0);
        capped.mul_f64(factor).min(self.max_delay.mul_f64(1.2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter_floor(policy: &RetryPolicy, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        policy
            .base_delay
            .saturating_mul(2_u32.saturating_pow(exponent))
            .min(policy.max_delay)
    }

    #[test]
    fn delays_grow_exponentially() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
        };

        for attempt in 1..=4 {
            let floor = no_jitter_floor(&policy, attempt);
            let delay = policy.delay_for(attempt);
            assert!(delay >= floor, "attempt {attempt}: {delay:?} < {floor:?}");
            assert!(
                delay <= floor.mul_f64(1.2),
                "attempt {attempt}: {delay:?} exceeds jitter bound"
            );
        }
        assert_eq!(no_jitter_floor(&policy, 1) * 2, no_jitter_floor(&policy, 2));
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(15),
        };
        let delay = policy.delay_for(8);
        assert!(delay <= Duration::from_secs(15).mul_f64(1.2));
    }

    #[test]
    fn attempt_bound() {
        let policy = RetryPolicy::with_max_attempts(3);
        assert!(policy.allows_retry(1));
        assert!(policy.allows_retry(2));
        assert!(!policy.allows_retry(3));
        assert!(!policy.allows_retry(4));
    }

    #[test]
    fn max_attempts_is_at_least_one() {
        let policy = RetryPolicy::with_max_attempts(0);
        assert_eq!(policy.max_attempts, 1);
    }
}
