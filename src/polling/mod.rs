//! Polling fallback for new-order detection.

mod reconciler;

pub use reconciler::PollingReconciler;

use std::time::Duration;

/// How often the reconciler runs.
///
/// Polling never stops: while push is connected it only slows down to a safety-net
/// cross-check that catches topic messages the broker dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollCadence {
    pub initial_delay: Duration,
    pub fast: Duration,
    pub slow: Duration,
}

impl PollCadence {
    pub fn interval(&self, push_connected: bool) -> Duration {
        if push_connected {
            self.slow
        } else {
            self.fast
        }
    }
}

impl Default for PollCadence {
    fn default() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            fast: Duration::from_secs(5),
            slow: Duration::from_secs(30),
        }
    }
}
