//! Retry policy: decides publish backoff delays.

use std::time::Duration;

use crate::config::PublishSettings;

/// Retry policy for event publishing.
///
/// Exponential backoff without jitter: `base_delay * multiplier^attempt`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay after the first failed attempt.
    pub base_delay: Duration,

    /// Backoff multiplier.
    pub multiplier: f64,

    /// Total attempts including the first one.
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, multiplier: f64, max_attempts: u32) -> Self {
        Self {
            base_delay,
            multiplier,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Delay to sleep after a failed attempt.
    ///
    /// `attempt` is 0-indexed (0 = the first attempt just failed).
    /// With base_delay=1s, multiplier=2.0: 1s, 2s, 4s, ...
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(delay_secs).unwrap_or(Duration::MAX)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&PublishSettings::default())
    }
}

impl From<&PublishSettings> for RetryPolicy {
    fn from(settings: &PublishSettings) -> Self {
        Self::new(settings.base_delay, settings.multiplier, settings.max_attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn default_policy_matches_publish_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.multiplier, 2.0);
        assert_eq!(policy.max_attempts, 3);
    }

    #[rstest]
    #[case(0, Duration::from_secs(1))]
    #[case(1, Duration::from_secs(2))]
    #[case(2, Duration::from_secs(4))]
    #[case(3, Duration::from_secs(8))]
    fn exponential_backoff(#[case] attempt: u32, #[case] expected: Duration) {
        assert_eq!(RetryPolicy::default().next_delay(attempt), expected);
    }

    #[test]
    fn huge_attempt_saturates() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.next_delay(u32::MAX), Duration::MAX);
    }

    #[test]
    fn zero_attempts_is_clamped() {
        let policy = RetryPolicy::new(Duration::from_millis(10), 2.0, 0);
        assert_eq!(policy.max_attempts, 1);
    }
}
