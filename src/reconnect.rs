//! Reconnect backoff policy
//!
//! Exponential backoff for the push channel: the n-th reconnect attempt
//! (counting from zero) waits `base_delay * 2^n`, and nothing is scheduled
//! once `max_attempts` attempts have been made.

use std::time::Duration;

/// Default base delay between reconnect attempts (milliseconds)
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// Default number of reconnect attempts before giving up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Bounded exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first attempt
    pub base_delay: Duration,
    /// Attempts allowed after an unexpected close
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    /// Create a policy
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
        }
    }

    /// Delay before attempt number `attempt`, or `None` when no attempt may be scheduled
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let factor = 2u32.checked_pow(attempt)?;
        self.base_delay.checked_mul(factor)
    }

    /// Every delay this policy will ever schedule, in order
    pub fn schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_attempts).map_while(|attempt| self.delay_for(attempt))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_BASE_DELAY_MS), DEFAULT_MAX_ATTEMPTS)
    }
}
