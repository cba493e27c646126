//! Exponential backoff between connection attempts

use std::time::Duration;

use hass_core::config::BackoffConfig;

/// Exponential backoff with jitter
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    current: Duration,
    max: Duration,
    multiplier: f64,
    /// Jitter factor (0.0 to 1.0), added on top of the base delay
    jitter: f64,
}

impl ExponentialBackoff {
    /// Create a backoff from configuration
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(config.initial, config.max, config.multiplier, config.jitter)
    }

    /// Create a backoff with custom parameters
    pub fn new(initial: Duration, max: Duration, multiplier: f64, jitter: f64) -> Self {
        Self {
            initial,
            current: initial,
            max,
            multiplier: multiplier.max(1.0),
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    /// Get the next delay and advance the backoff
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;

        let next = Duration::from_secs_f64(self.current.as_secs_f64() * self.multiplier);
        self.current = std::cmp::min(next, self.max);

        let jitter_amount = delay.as_secs_f64() * self.jitter * rand::random::<f64>();
        delay + Duration::from_secs_f64(jitter_amount)
    }

    /// Start over from the initial delay
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::from_config(&BackoffConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_increases() {
        let mut backoff = ExponentialBackoff::new(
            Duration::from_secs(1),
            Duration::from_secs(60),
            2.0,
            0.0, // No jitter for deterministic test
        );

        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));
    }

    #[test]
    fn test_backoff_capped_and_reset() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(30), Duration::from_secs(60), 2.0, 0.0);

        assert_eq!(backoff.next_delay(), Duration::from_secs(30));
        assert_eq!(backoff.next_delay(), Duration::from_secs(60));
        assert_eq!(backoff.next_delay(), Duration::from_secs(60));

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(10), Duration::from_secs(10), 2.0, 0.25);

        for _ in 0..100 {
            let delay = backoff.next_delay();
            assert!(delay >= Duration::from_secs(10));
            assert!(delay <= Duration::from_millis(12_500));
        }
    }
}
