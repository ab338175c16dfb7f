//! Delay between failed socket receives.

use std::time::Duration;

/// Backoff for receive loops hitting unexpected transport errors.
///
/// The first error waits `base`; every further consecutive error doubles
/// the wait up to `max`. A successful receive resets it.
#[derive(Debug)]
pub(crate) struct RecvBackoff {
    base: Duration,
    max: Duration,
    consecutive: u32,
}

impl RecvBackoff {
    pub(crate) fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            consecutive: 0,
        }
    }

    /// Delay to wait after another failed receive.
    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = self
            .base
            .checked_mul(1u32 << self.consecutive.min(16))
            .unwrap_or(self.max)
            .min(self.max);
        self.consecutive = self.consecutive.saturating_add(1);
        delay
    }

    /// Record a failed receive and sleep for the resulting delay.
    pub(crate) fn wait(&mut self) {
        std::thread::sleep(self.next_delay());
    }

    /// Number of errors since the last success.
    pub(crate) fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub(crate) fn reset(&mut self) {
        self.consecutive = 0;
    }
}
