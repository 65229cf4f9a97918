//! # Retry Policy
//!
//! Bounded exponential backoff for outbound save attempts.
//!
//! ## Features
//!
//! - **Exponential Backoff**: Delay doubles after every failed attempt
//! - **Bounded Attempts**: A save gives up after a fixed attempt count
//! - **Test Friendly**: The base delay shrinks to milliseconds in tests

use std::time::Duration;

/// Backoff policy for the save executor
///
/// Attempt `n` failing (1-based) is followed by a wait of
/// `base_delay * 2^(n-1)`, so the waits run `base, 2*base, 4*base, ...`
/// until `max_attempts` attempts have been made.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts before giving up
    pub max_attempts: u32,
    /// Wait after the first failed attempt
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with explicit bounds
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay after the given failed attempt (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// The full sequence of waits a save can incur
    ///
    /// `max_attempts` attempts have `max_attempts - 1` waits between them.
    pub fn delays(&self) -> Vec<Duration> {
        (1..self.max_attempts).map(|n| self.delay_for(n)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_double_each_attempt() {
        let policy = RetryPolicy::new(5, Duration::from_millis(10));
        assert_eq!(
            policy.delays(),
            vec![
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(40),
                Duration::from_millis(80),
            ]
        );
    }

    #[test]
    fn test_first_delay_is_base() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), policy.base_delay);
    }

    #[test]
    fn test_default_bounds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(1000));
    }

    #[test]
    fn test_large_attempt_saturates() {
        let policy = RetryPolicy::new(64, Duration::from_secs(1));
        // No overflow panic for absurd attempt numbers
        assert!(policy.delay_for(40) > Duration::from_secs(1));
    }
}
