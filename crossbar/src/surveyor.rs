//! SURVEYOR socket: broadcast a question, collect answers until a deadline.
//!
//! Each survey gets a fresh identifier and a collection window. `recv`
//! returns matching responses one at a time until the window closes, then
//! fails with `Timeout` and the survey ends. Starting a new survey while one
//! is running terminates the old one; its late responses are discarded.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use tracing::{debug, trace};

use crossbar_core::deadline::Deadline;
use crossbar_core::error::{Error, Result};
use crossbar_core::msg::Msg;
use crossbar_core::options::SocketOptions;
use crossbar_core::pattern::Pattern;
use crossbar_core::wire;

use crate::base::SocketCore;
use crate::socket::impl_socket_common;

#[derive(Debug, Default)]
struct SurveyorState {
    next_id: u32,
    /// Identifier of the running survey.
    active: Option<u32>,
    /// When the collection window closes.
    closes_at: Option<Instant>,
}

/// SURVEYOR socket.
///
/// # State machine
///
/// ```text
/// Idle → send() → Surveying → deadline → Idle
/// ```
pub struct SurveyorSocket {
    core: Arc<SocketCore>,
    state: Mutex<SurveyorState>,
    window: Mutex<Duration>,
}

impl SurveyorSocket {
    /// Create a SURVEYOR socket with default options.
    pub fn new() -> Result<Self> {
        Self::with_options(SocketOptions::default())
    }

    /// Create a SURVEYOR socket with explicit options.
    pub fn with_options(options: SocketOptions) -> Result<Self> {
        let window = options.survey_deadline;
        Ok(Self {
            core: SocketCore::new(Pattern::Surveyor, options),
            state: Mutex::new(SurveyorState::default()),
            window: Mutex::new(window),
        })
    }

    /// Change the collection window for subsequent surveys.
    pub fn set_survey_deadline(&self, window: Duration) {
        *self.window.lock().unwrap_or_else(PoisonError::into_inner) = window;
    }

    /// Broadcast a survey to every connected respondent.
    ///
    /// Non-blocking per peer: a full queue drops that peer's copy. Starting
    /// a survey with no peers succeeds; `recv` will simply time out.
    pub fn send(&self, payload: &[u8]) -> Result<()> {
        self.core.ensure_open()?;

        let id = {
            let mut state = self.lock();
            if state.active.is_some() {
                debug!("terminating running survey for a new one");
            }
            let active = state.active;
            wire::next_id(&mut state.next_id, active)
        };

        let mut header = BytesMut::with_capacity(wire::WORD);
        wire::encode(&mut header, &[], id);
        let base = self.core.make_msg(&header, payload)?;

        let peers = self.core.peers.connected();
        let mut delivered = 0usize;
        for peer in &peers {
            if self.core.try_route(peer, base.duplicate()) {
                delivered += 1;
            }
        }

        let window = *self.window.lock().unwrap_or_else(PoisonError::into_inner);
        let mut state = self.lock();
        state.active = Some(id);
        state.closes_at = Some(Instant::now() + window);
        trace!(id, delivered, respondents = peers.len(), "survey started");
        Ok(())
    }

    /// Receive the next response to the running survey.
    ///
    /// Fails with `Timeout` when the collection window closes; the survey
    /// is over at that point. Fails with `InvalidState` when no survey is
    /// running.
    pub fn recv(&self) -> Result<Msg> {
        self.recv_inner(None)
    }

    /// Receive with an explicit deadline on top of the survey window.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Msg> {
        self.recv_inner(Some(timeout))
    }

    fn recv_inner(&self, timeout: Option<Duration>) -> Result<Msg> {
        self.core.ensure_open()?;
        let deadline = self.core.recv_deadline(timeout);

        loop {
            let (active, closes_at) = {
                let state = self.lock();
                (state.active, state.closes_at)
            };
            let Some(expected) = active else {
                return Err(Error::InvalidState("no survey running"));
            };

            if let Some(at) = closes_at {
                if Instant::now() >= at {
                    let mut state = self.lock();
                    if state.active == Some(expected) {
                        state.active = None;
                        state.closes_at = None;
                        trace!(id = expected, "survey window closed");
                    }
                    return Err(Error::Timeout);
                }
            }

            let wait = match closes_at {
                Some(at) => deadline.earlier(Deadline::at(at)),
                None => deadline,
            };
            match self.core.recv_inbound(wait) {
                Ok(mut msg) => {
                    let Some(header) = wire::decode(msg.payload()) else {
                        trace!("dropping malformed response");
                        continue;
                    };
                    if header.id != expected {
                        trace!(got = header.id, expected, "discarding late response");
                        continue;
                    }
                    msg.set_header_len(header.header_len);
                    return Ok(msg);
                }
                Err(e) if e.is_timeout() => {
                    if deadline.expired() {
                        return Err(Error::Timeout);
                    }
                    // Survey window wakeup; the loop top settles it.
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, SurveyorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl_socket_common!(SurveyorSocket, Pattern::Surveyor);
