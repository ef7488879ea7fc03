use std::time::Duration;

/// Linear reconnect backoff: the n-th consecutive failure waits
/// `min(base_delay * n, max_delay)`, and nothing is retried once
/// `max_attempts` failures have been scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt).min(self.max_delay)
    }

    /// Bump `attempts` and return the delay before the next try, or `None`
    /// when the budget is spent.
    pub fn next_delay(&self, attempts: &mut u32) -> Option<Duration> {
        if *attempts >= self.max_attempts {
            return None;
        }
        *attempts += 1;
        Some(self.delay_for_attempt(*attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_delays_then_give_up() {
        let policy = BackoffPolicy::default();
        let mut attempts = 0;
        let delays: Vec<u128> = std::iter::from_fn(|| policy.next_delay(&mut attempts))
            .map(|d| d.as_millis())
            .collect();

        assert_eq!(delays, vec![1000, 2000, 3000, 4000, 5000]);
        assert_eq!(attempts, 5);
        assert_eq!(policy.next_delay(&mut attempts), None);
        assert_eq!(attempts, 5);
    }

    #[test]
    fn delay_is_capped() {
        let policy = BackoffPolicy {
            max_attempts: 100,
            ..Default::default()
        };
        assert_eq!(policy.delay_for_attempt(29), Duration::from_millis(29_000));
        assert_eq!(policy.delay_for_attempt(31), Duration::from_millis(30_000));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_millis(30_000));
    }
}
