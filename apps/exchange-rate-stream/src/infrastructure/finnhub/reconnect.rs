//! Reconnection Policy
//!
//! Every close is followed by the same fixed delay and another attempt,
//! forever. The policy only tracks how many attempts in a row have failed,
//! for logging.

use std::time::Duration;

/// Default delay between a close and the next connection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(5000);

/// Reconnection settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Wait between a close and the next attempt.
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::with_delay(DEFAULT_RECONNECT_DELAY)
    }
}

impl ReconnectConfig {
    /// Settings with the given delay.
    #[must_use]
    pub const fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

/// Fixed-delay reconnection with a run counter.
///
/// ```rust
/// use std::time::Duration;
/// use exchange_rate_stream::infrastructure::finnhub::{ReconnectConfig, ReconnectPolicy};
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::with_delay(Duration::from_secs(5)));
/// assert_eq!(policy.next_delay(), Duration::from_secs(5));
/// assert_eq!(policy.next_delay(), Duration::from_secs(5));
/// assert_eq!(policy.consecutive_attempts(), 2);
///
/// policy.reset();
/// assert_eq!(policy.consecutive_attempts(), 0);
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    delay: Duration,
    consecutive: u32,
}

impl ReconnectPolicy {
    /// Start a policy with no attempts recorded.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            delay: config.delay,
            consecutive: 0,
        }
    }

    /// Record another attempt and return how long to wait before it.
    pub const fn next_delay(&mut self) -> Duration {
        self.consecutive = self.consecutive.saturating_add(1);
        self.delay
    }

    /// Clear the run once a connection opens.
    pub const fn reset(&mut self) {
        self.consecutive = 0;
    }

    /// Attempts since the last open connection.
    #[must_use]
    pub const fn consecutive_attempts(&self) -> u32 {
        self.consecutive
    }
}
