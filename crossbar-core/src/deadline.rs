//! Deadline arithmetic for blocking operations.
//!
//! Every blocking surface in the crate waits in short slices so that socket
//! shutdown is observed within [`POLL_INTERVAL`] even when the caller asked
//! for an indefinite wait.

use std::time::{Duration, Instant};

/// How long any single blocking wait may run before re-checking shutdown.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// An optional absolute deadline.
///
/// `None` means "wait forever" (subject to shutdown); `Some` is the instant
/// at which the operation must give up with a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// A deadline that never fires.
    #[must_use]
    pub const fn never() -> Self {
        Self(None)
    }

    /// A deadline `timeout` from now, or never when `timeout` is `None`.
    #[must_use]
    pub fn after(timeout: Option<Duration>) -> Self {
        Self(timeout.map(|d| Instant::now() + d))
    }

    /// A deadline at an explicit instant.
    #[must_use]
    pub const fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    /// Has the deadline passed?
    #[must_use]
    pub fn expired(&self) -> bool {
        matches!(self.0, Some(t) if Instant::now() >= t)
    }

    /// Time left, or `None` for an unbounded wait.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.0.map(|t| t.saturating_duration_since(Instant::now()))
    }

    /// The next wait slice: the remaining time capped at [`POLL_INTERVAL`].
    #[must_use]
    pub fn slice(&self) -> Duration {
        match self.remaining() {
            Some(rem) => rem.min(POLL_INTERVAL),
            None => POLL_INTERVAL,
        }
    }

    /// Whichever of the two deadlines fires first.
    #[must_use]
    pub fn earlier(self, other: Self) -> Self {
        match (self.0, other.0) {
            (Some(a), Some(b)) => Self(Some(a.min(b))),
            (Some(a), None) => Self(Some(a)),
            (None, b) => Self(b),
        }
    }
}
