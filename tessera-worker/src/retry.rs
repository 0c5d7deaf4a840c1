use std::time::Duration;

/// Hard ceiling on any single backoff sleep.
const MAX_DELAY: Duration = Duration::from_secs(120);

/// Bounded exponential backoff: `base * 2^attempt`, capped at two minutes.
/// No jitter is applied.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base: Duration) -> Self {
        Self {
            max_retries,
            base,
            max_delay: MAX_DELAY,
        }
    }

    /// Delay to sleep after a failed attempt `attempt` (zero-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(20);
        self.base.saturating_mul(factor).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_per_attempt() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(800));
    }

    #[test]
    fn delay_is_capped_at_two_minutes() {
        let policy = RetryPolicy::new(10, Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(9), Duration::from_secs(120));
    }

    #[test]
    fn large_attempt_numbers_do_not_overflow() {
        let policy = RetryPolicy::new(10, Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(120));
    }
}
