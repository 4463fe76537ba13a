use std::time::Duration;

/// Bounded linear retry schedule for one document pipeline.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    retries: u32,
    base: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, base: Duration) -> Self {
        Self { retries, base }
    }

    /// Total attempts including the first one.
    pub fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Pause before `attempt` (zero-based). The first attempt runs immediately,
    /// every later one waits twice the base delay.
    pub fn delay_before(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 {
            None
        } else {
            Some(self.base.saturating_mul(2))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempts_include_first_try() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts(), 1);
        assert_eq!(RetryPolicy::new(3, Duration::ZERO).attempts(), 4);
        assert_eq!(RetryPolicy::new(u32::MAX, Duration::ZERO).attempts(), u32::MAX);
    }

    #[test]
    fn backoff_is_linear_and_skips_first_attempt() {
        let policy = RetryPolicy::new(3, Duration::from_millis(150));
        assert_eq!(policy.delay_before(0), None);
        assert_eq!(policy.delay_before(1), Some(Duration::from_millis(300)));
        assert_eq!(policy.delay_before(2), Some(Duration::from_millis(300)));
        assert_eq!(policy.delay_before(3), Some(Duration::from_millis(300)));
    }
}
