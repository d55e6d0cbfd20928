//! Backoff delays for artifact download retries.
//!
//! ## Key Features
//!
//! - **Exponential Backoff**: delays grow by `backoff_factor` per attempt (500ms, 1s, 2s...)
//! - **Max Delay Cap**: no delay ever exceeds `max_delay`
//! - **Jitter**: optional ±25% randomization so concurrent tasks do not retry in lockstep
//! - **Monotonic Schedule**: [`RetryConfig::next_delay`] never returns less than the
//!   previous delay or the shared rate-limit floor
//!
//! ## Usage
//!
//! ```rust
//! use ferry::retry::RetryConfig;
//! use std::time::Duration;
//!
//! let config = RetryConfig::default().with_jitter(false);
//! assert_eq!(config.delay_for_attempt(0), Duration::from_millis(500));
//! assert_eq!(config.delay_for_attempt(1), Duration::from_secs(1));
//! ```

use crate::constants::{DEFAULT_BACKOFF_FACTOR, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY};
use rand::RngExt;
use std::time::Duration;

/// Configuration for backoff behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for every delay, jitter and rate-limit floor included
    pub max_delay: Duration,
    /// Multiplier for each subsequent retry delay
    pub backoff_factor: f64,
    /// Whether to add jitter to delays
    pub jitter_enabled: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            jitter_enabled: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.jitter_enabled = enabled;
        self
    }

    /// Calculate the delay for a given retry attempt (0-indexed):
    /// `initial_delay * backoff_factor^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let multiplier = self.backoff_factor.powi(exponent);
        let delay_ms = self.initial_delay.as_millis() as f64 * multiplier;
        let delay = if delay_ms.is_finite() && delay_ms < self.max_delay.as_millis() as f64 {
            Duration::from_millis(delay_ms as u64)
        } else {
            self.max_delay
        };

        std::cmp::min(delay, self.max_delay)
    }

    /// Calculate delay with optional jitter (±25% of base delay), capped
    pub fn delay_for_attempt_with_jitter(&self, attempt: u32) -> Duration {
        let base_delay = self.delay_for_attempt(attempt);

        if !self.jitter_enabled || base_delay.is_zero() {
            return base_delay;
        }

        let base_ms = base_delay.as_millis() as f64;
        let jitter_range = base_ms * 0.25;
        let jitter = rand::rng().random_range(-jitter_range..jitter_range);
        let jittered_ms = (base_ms + jitter).max(0.0);

        std::cmp::min(Duration::from_millis(jittered_ms as u64), self.max_delay)
    }

    /// The delay before retry number `attempt` (0-indexed).
    ///
    /// Never below `previous` or `floor`, never above `max_delay`.
    pub fn next_delay(&self, attempt: u32, previous: Duration, floor: Duration) -> Duration {
        self.delay_for_attempt_with_jitter(attempt)
            .max(previous)
            .max(floor)
            .min(self.max_delay)
    }
}
