use std::time::Duration;

use rand::Rng;

/// Exponential backoff with equal jitter: half of each delay is fixed, the
/// other half random, and the total never exceeds `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(300),
            max_delay: Duration::from_secs(5),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Upper bound of the delay before retry number `retry` (0-based).
    pub fn ceiling(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub fn delay_for(&self, retry: u32) -> Duration {
        let ceiling = self.ceiling(retry);
        if !self.jitter {
            return ceiling;
        }

        let half = ceiling / 2;
        let spread = (ceiling - half).as_millis() as u64;
        half + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_until_capped() {
        let policy = RetryPolicy {
            jitter: false,
            ..RetryPolicy::default()
        };

        assert_eq!(policy.delay_for(0), Duration::from_millis(300));
        assert_eq!(policy.delay_for(1), Duration::from_millis(600));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1200));
        assert_eq!(policy.delay_for(10), Duration::from_secs(5));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn jittered_delays_stay_within_bounds() {
        let policy = RetryPolicy::default();
        for retry in 0..8 {
            let ceiling = policy.ceiling(retry);
            for _ in 0..50 {
                let delay = policy.delay_for(retry);
                assert!(delay >= ceiling / 2, "{:?} below half of {:?}", delay, ceiling);
                assert!(delay <= ceiling, "{:?} above {:?}", delay, ceiling);
                assert!(delay <= policy.max_delay);
            }
        }
    }

    #[test]
    fn attempts_are_bounded() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!RetryPolicy::none().should_retry(1));
    }
}
