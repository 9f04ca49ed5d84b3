//! Reconnect policy for the push transport.
//!
//! Plain exponential backoff, `base_delay * 2^attempt`, bounded only by the attempt
//! ceiling. No jitter is applied.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect attempt.
    pub base_delay: Duration,
    /// Reconnect attempts allowed before the client gives up for good.
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    /// Delay to wait before reconnect attempt number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Whether another attempt is allowed after `attempts` have already been made.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(3),
            max_attempts: 5,
        }
    }
}
