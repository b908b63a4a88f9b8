//! Retry policy: decides backoff delays and when to give up.

use std::time::Duration;

/// Retry policy for failed dispatches.
///
/// The default is a flat delay (multiplier 1.0). A multiplier above 1.0
/// gives exponential backoff: `base_delay * multiplier^(attempts - 1)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts (claims) allowed before an item is failed permanently.
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub base_delay: Duration,

    pub multiplier: f64,
}

impl RetryPolicy {
    pub const MAX_ATTEMPTS: u32 = 3;
    pub const RETRY_DELAY: Duration = Duration::from_secs(5 * 60);

    /// Has `attempts` used up the budget?
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }

    /// Delay before the next try, given the attempts made so far (1-indexed).
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let base_secs = self.base_delay.as_secs_f64();
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_secs = base_secs * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(delay_secs).unwrap_or(self.base_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Self::MAX_ATTEMPTS,
            base_delay: Self::RETRY_DELAY,
            multiplier: 1.0,
        }
    }
}
