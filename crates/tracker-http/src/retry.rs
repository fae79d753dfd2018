//! Exponential-backoff retry policy.
//!
//! A small fixed cap on attempts rather than unbounded retry, so a
//! persistently failing task fetch surfaces as a counted error instead of
//! stalling the run.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl RetryConfig {
    /// Delay to sleep before attempt number `attempt` (1-indexed; the first
    /// attempt, `attempt == 0`, never waits).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::from_millis(0);
        }

        let multiplier = self.backoff_multiplier.powi((attempt - 1) as i32);
        let mut delay = Duration::from_millis((self.initial_delay.as_millis() as f64 * multiplier) as u64);

        if delay > self.max_delay {
            delay = self.max_delay;
        }

        if self.jitter > 0.0 {
            let jitter_ms = (delay.as_millis() as f64 * self.jitter) as u64;
            let offset = (rand::random::<f64>() * jitter_ms as f64) as u64;
            delay = Duration::from_millis(delay.as_millis() as u64 + offset);
        }

        delay.min(self.max_delay + Duration::from_millis((self.max_delay.as_millis() as f64 * self.jitter) as u64))
    }

    /// Whether a request that has already been attempted `attempt` times
    /// should be retried.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_has_no_delay() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(0));
    }

    #[test]
    fn delay_grows_with_attempt() {
        let config = RetryConfig::default();
        let d1 = config.delay_for_attempt(1);
        let d2 = config.delay_for_attempt(2);
        assert!(d2 >= d1);
    }

    #[test]
    fn default_cap_is_three_attempts() {
        let config = RetryConfig::default();
        assert!(config.should_retry(0));
        assert!(config.should_retry(2));
        assert!(!config.should_retry(3));
    }
}
