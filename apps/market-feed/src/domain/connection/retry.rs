//! Reconnect Budget
//!
//! Bounded linear backoff: the k-th consecutive retry waits
//! `base_interval * k`, and no retry is granted once `max_attempts`
//! have been spent. The budget resets when a connection is established.

use std::time::Duration;

/// Default number of automatic reconnect attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default base interval between reconnect attempts.
pub const DEFAULT_BASE_INTERVAL: Duration = Duration::from_millis(3000);

/// Configuration for the reconnect budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum automatic attempts before giving up.
    pub max_attempts: u32,
    /// Delay unit; attempt `k` waits `base_interval * k`.
    pub base_interval: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_interval: DEFAULT_BASE_INTERVAL,
        }
    }
}

impl RetryConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(max_attempts: u32, base_interval: Duration) -> Self {
        Self {
            max_attempts,
            base_interval,
        }
    }

    /// Create configuration from `FeedSettings`.
    #[must_use]
    pub const fn from_feed_settings(settings: &crate::FeedSettings) -> Self {
        Self {
            max_attempts: settings.max_reconnect_attempts,
            base_interval: settings.reconnect_interval,
        }
    }
}

/// Linear reconnect budget.
///
/// # Example
///
/// ```rust
/// use market_feed::domain::connection::{RetryBudget, RetryConfig};
/// use std::time::Duration;
///
/// let mut budget = RetryBudget::new(RetryConfig::default());
///
/// assert_eq!(budget.next_delay(), Some(Duration::from_secs(3)));
/// assert_eq!(budget.next_delay(), Some(Duration::from_secs(6)));
///
/// // Connection established
/// budget.reset();
/// assert_eq!(budget.attempts(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct RetryBudget {
    config: RetryConfig,
    attempts: u32,
}

impl RetryBudget {
    /// Create a fresh budget.
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Spend one attempt and return its delay.
    ///
    /// Returns `None` once `max_attempts` have been spent; the attempt
    /// count is left unchanged in that case.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }

        self.attempts += 1;
        Some(self.config.base_interval.saturating_mul(self.attempts))
    }

    /// Reset after a successful connection.
    pub const fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Attempts spent since the last successful connection.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Maximum automatic attempts.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Whether no further automatic attempt is allowed.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.attempts >= self.config.max_attempts
    }

    /// The configuration this budget was built from.
    #[must_use]
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
