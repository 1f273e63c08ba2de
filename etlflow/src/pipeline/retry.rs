//! Stage retry policy with optional backoff and jitter.
//!
//! The baseline is a fixed delay between attempts. Backoff and jitter are
//! opt-in refinements of the same policy.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base (fixed)
    #[default]
    Constant,
    /// delay = base * attempt
    Linear,
    /// delay = base * 2^(attempt - 1)
    Exponential,
}

/// Jitter strategy applied on top of the backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    #[default]
    None,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    Equal,
}

/// How often and how patiently a stage's action is retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first. Always at least 1.
    pub max_attempts: usize,
    /// Base delay between attempts in milliseconds.
    pub delay_ms: u64,
    /// Upper bound for a computed delay in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff strategy.
    pub backoff: BackoffStrategy,
    /// Jitter strategy.
    pub jitter: JitterStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            delay_ms: 0,
            max_delay_ms: 3_600_000,
            backoff: BackoffStrategy::Constant,
            jitter: JitterStrategy::None,
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// `retries` additional attempts after the first, `delay` apart.
    #[must_use]
    pub fn from_retries(retries: usize, delay: Duration) -> Self {
        Self::default()
            .with_max_attempts(retries + 1)
            .with_delay(delay)
    }

    /// Sets the maximum attempts (clamped to at least 1).
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter = strategy;
        self
    }

    /// Returns the number of retries after the first attempt.
    #[must_use]
    pub fn retries(&self) -> usize {
        self.max_attempts.saturating_sub(1)
    }

    /// Returns true if another attempt is allowed after `attempt` (1-based).
    #[must_use]
    pub fn allows_retry_after(&self, attempt: usize) -> bool {
        attempt < self.max_attempts
    }

    /// Calculates the wait after the failed attempt `attempt` (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: usize) -> Duration {
        let base = self.delay_ms;
        let attempt = attempt.max(1);

        let delay = match self.backoff {
            BackoffStrategy::Constant => base,
            BackoffStrategy::Linear => base.saturating_mul(attempt as u64),
            BackoffStrategy::Exponential => {
                let exponent = u32::try_from(attempt - 1).unwrap_or(u32::MAX);
                base.saturating_mul(2u64.saturating_pow(exponent))
            }
        }
        .min(self.max_delay_ms);

        let jittered = match self.jitter {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
        };

        Duration::from_millis(jittered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_fixed_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.backoff, BackoffStrategy::Constant);
        assert_eq!(policy.jitter, JitterStrategy::None);
        assert!(!policy.allows_retry_after(1));
    }

    #[test]
    fn test_from_retries() {
        let policy = RetryPolicy::from_retries(1, Duration::from_secs(300));
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.retries(), 1);
        assert!(policy.allows_retry_after(1));
        assert!(!policy.allows_retry_after(2));
        assert_eq!(policy.delay_after(1), Duration::from_secs(300));
    }

    #[test]
    fn test_max_attempts_clamped() {
        assert_eq!(RetryPolicy::none().with_max_attempts(0).max_attempts, 1);
    }

    #[test]
    fn test_constant_delay() {
        let policy = RetryPolicy::none().with_delay(Duration::from_millis(100));
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(5), Duration::from_millis(100));
    }

    #[test]
    fn test_linear_delay() {
        let policy = RetryPolicy::none()
            .with_delay(Duration::from_millis(100))
            .with_backoff(BackoffStrategy::Linear);
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(3), Duration::from_millis(300));
    }

    #[test]
    fn test_exponential_delay_capped() {
        let policy = RetryPolicy::none()
            .with_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(500))
            .with_backoff(BackoffStrategy::Exponential);
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
        assert_eq!(policy.delay_after(10), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_bounded() {
        let policy = RetryPolicy::none()
            .with_delay(Duration::from_millis(100))
            .with_jitter(JitterStrategy::Full);
        for _ in 0..20 {
            assert!(policy.delay_after(1) <= Duration::from_millis(100));
        }

        let equal = policy.with_jitter(JitterStrategy::Equal);
        for _ in 0..20 {
            let d = equal.delay_after(1);
            assert!(d >= Duration::from_millis(50) && d <= Duration::from_millis(100));
        }
    }

    #[test]
    fn test_policy_deserializes_snake_case() {
        let policy: RetryPolicy = serde_json::from_value(serde_json::json!({
            "max_attempts": 3,
            "delay_ms": 10,
            "max_delay_ms": 100,
            "backoff": "exponential",
            "jitter": "none"
        }))
        .unwrap();
        assert_eq!(policy.backoff, BackoffStrategy::Exponential);
    }
}
