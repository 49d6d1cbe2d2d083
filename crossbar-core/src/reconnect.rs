//! Dialer backoff tracking.
//!
//! Dial attempts retry with exponential backoff between the configured
//! minimum and maximum intervals; a successful connection resets the window.

use std::time::Duration;

use crate::options::SocketOptions;

/// Backoff state for one dialer.
///
/// # Example
///
/// ```
/// use crossbar_core::options::SocketOptions;
/// use crossbar_core::reconnect::ReconnectState;
/// use std::time::Duration;
///
/// let opts = SocketOptions::default()
///     .with_reconnect_ivl(Duration::from_millis(100))
///     .with_reconnect_ivl_max(Duration::from_secs(10));
///
/// let mut backoff = ReconnectState::new(&opts);
/// assert_eq!(backoff.next_delay(), Duration::from_millis(100));
/// assert_eq!(backoff.next_delay(), Duration::from_millis(200));
///
/// backoff.reset();
/// assert_eq!(backoff.next_delay(), Duration::from_millis(100));
/// ```
#[derive(Debug, Clone)]
pub struct ReconnectState {
    base: Duration,
    max: Duration,
    attempt: u32,
    current: Duration,
}

impl ReconnectState {
    /// Build backoff state from socket options.
    #[must_use]
    pub const fn new(options: &SocketOptions) -> Self {
        Self {
            base: options.reconnect_ivl,
            max: options.reconnect_ivl_max,
            attempt: 0,
            current: options.reconnect_ivl,
        }
    }

    /// The delay to sleep before the next attempt.
    ///
    /// Doubles on every call until the maximum interval is reached.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;

        self.attempt = self.attempt.saturating_add(1);
        self.current = self
            .base
            .saturating_mul(1_u32 << self.attempt.min(10))
            .min(self.max)
            .max(self.base);

        delay
    }

    /// Reset after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.current = self.base;
    }

    /// Number of failed attempts since the last reset.
    #[inline]
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }
}
