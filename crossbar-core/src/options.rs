//! Socket configuration options.
//!
//! One options record covers every pattern; pattern-specific knobs are
//! ignored by the patterns they do not apply to.

use std::time::Duration;

use crate::pool::DEFAULT_BUF_CAPACITY;

/// Socket configuration options.
///
/// These options control timeouts, queue bounds, reconnect backoff and
/// pattern-specific behavior.
///
/// # Examples
///
/// ```
/// use crossbar_core::options::SocketOptions;
/// use std::time::Duration;
///
/// let opts = SocketOptions::default()
///     .with_recv_timeout(Duration::from_secs(5))
///     .with_send_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct SocketOptions {
    /// Default deadline for `send` when the caller passes none.
    /// `None` blocks indefinitely.
    pub send_timeout: Option<Duration>,

    /// Default deadline for `recv` when the caller passes none.
    /// `None` blocks indefinitely.
    pub recv_timeout: Option<Duration>,

    /// Overall bound for `dial_and_wait` retries.
    /// `None` makes `dial_and_wait` a single attempt.
    pub dial_timeout: Option<Duration>,

    /// Bound on each connection's outbound queue.
    pub send_queue_size: usize,

    /// Bound on the socket's inbound queue (and SUB's filtered queue).
    pub recv_queue_size: usize,

    /// Initial dialer reconnect delay.
    pub reconnect_ivl: Duration,

    /// Maximum dialer reconnect delay for exponential backoff.
    pub reconnect_ivl_max: Duration,

    /// Maximum payload size enforced at `send`; the transport ceiling still
    /// applies on top.
    pub max_msg_size: usize,

    /// Time a sender thread may spend draining queued messages on close.
    /// `None` discards pending messages immediately.
    pub linger: Option<Duration>,

    /// REQ only: automatic resend interval for an unanswered request.
    /// `None` disables resending.
    pub req_resend_ivl: Option<Duration>,

    /// SURVEYOR only: default response collection window.
    pub survey_deadline: Duration,

    /// SUB only: when the filtered queue is full, evict the oldest message
    /// (`true`) or reject the newest (`false`).
    pub sub_drop_oldest: bool,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            send_timeout: None,
            recv_timeout: None,
            dial_timeout: None,
            send_queue_size: 16,
            recv_queue_size: 16,
            reconnect_ivl: Duration::from_millis(100),
            reconnect_ivl_max: Duration::from_secs(10),
            max_msg_size: DEFAULT_BUF_CAPACITY,
            linger: Some(Duration::from_secs(1)),
            req_resend_ivl: None,
            survey_deadline: Duration::from_secs(1),
            sub_drop_oldest: true,
        }
    }
}

impl SocketOptions {
    /// Create new socket options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default send deadline.
    #[must_use]
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    /// Set the default receive deadline.
    #[must_use]
    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = Some(timeout);
        self
    }

    /// Set the overall `dial_and_wait` bound.
    #[must_use]
    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = Some(timeout);
        self
    }

    /// Set the outbound queue bound.
    #[must_use]
    pub fn with_send_queue_size(mut self, size: usize) -> Self {
        self.send_queue_size = size.max(1);
        self
    }

    /// Set the inbound queue bound.
    #[must_use]
    pub fn with_recv_queue_size(mut self, size: usize) -> Self {
        self.recv_queue_size = size.max(1);
        self
    }

    /// Set the initial reconnect delay.
    #[must_use]
    pub fn with_reconnect_ivl(mut self, ivl: Duration) -> Self {
        self.reconnect_ivl = ivl;
        self
    }

    /// Set the maximum reconnect delay for exponential backoff.
    #[must_use]
    pub fn with_reconnect_ivl_max(mut self, max: Duration) -> Self {
        self.reconnect_ivl_max = max;
        self
    }

    /// Set the maximum message size enforced at `send`.
    #[must_use]
    pub fn with_max_msg_size(mut self, size: usize) -> Self {
        self.max_msg_size = size;
        self
    }

    /// Set the close-time drain bound.
    #[must_use]
    pub fn with_linger(mut self, linger: Option<Duration>) -> Self {
        self.linger = linger;
        self
    }

    /// Enable automatic REQ resends at the given interval.
    #[must_use]
    pub fn with_req_resend_ivl(mut self, ivl: Duration) -> Self {
        self.req_resend_ivl = Some(ivl);
        self
    }

    /// Set the default survey collection window.
    #[must_use]
    pub fn with_survey_deadline(mut self, deadline: Duration) -> Self {
        self.survey_deadline = deadline;
        self
    }

    /// Choose the SUB full-queue policy.
    #[must_use]
    pub fn with_sub_drop_oldest(mut self, drop_oldest: bool) -> Self {
        self.sub_drop_oldest = drop_oldest;
        self
    }
}
