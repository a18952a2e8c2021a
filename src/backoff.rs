//! Delay policy between consecutive accept failures.

use std::time::Duration;

/// Exponential backoff applied after failed accepts.
///
/// A zero `initial` delay means retry immediately, which is the default.
#[derive(Debug, Clone)]
pub struct AcceptBackoff {
    initial: Duration,
    max: Duration,
    failures: u32,
}

impl AcceptBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            failures: 0,
        }
    }

    /// Retry without any delay.
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Record a failure and return how long to wait before the next accept.
    pub fn on_failure(&mut self) -> Duration {
        let delay = if self.initial.is_zero() {
            Duration::ZERO
        } else {
            let factor = 2u32.saturating_pow(self.failures);
            self.initial.saturating_mul(factor).min(self.max)
        };
        self.failures = self.failures.saturating_add(1);
        delay
    }

    pub fn on_success(&mut self) {
        self.failures = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }
}

impl Default for AcceptBackoff {
    fn default() -> Self {
        Self::immediate()
    }
}
