//! RESPONDENT socket: the answering side of a survey.
//!
//! One survey may be pending at a time. Receiving a new survey while one is
//! unanswered overwrites the record; the earlier survey can no longer be
//! answered. `send` mirrors the recorded header back to the surveyor.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, trace};

use crossbar_core::error::{Error, Result};
use crossbar_core::msg::Msg;
use crossbar_core::options::SocketOptions;
use crossbar_core::pattern::Pattern;
use crossbar_core::peer::PeerId;
use crossbar_core::wire;

use crate::base::SocketCore;
use crate::socket::impl_socket_common;

#[derive(Debug)]
struct PendingSurvey {
    peer: PeerId,
    /// Backtrace and identifier, mirrored verbatim onto the response.
    header: Bytes,
}

/// RESPONDENT socket.
///
/// # State machine
///
/// ```text
/// Idle → recv() → HaveSurvey → send() → Idle
/// ```
pub struct RespondentSocket {
    core: Arc<SocketCore>,
    pending: Mutex<Option<PendingSurvey>>,
}

impl RespondentSocket {
    /// Create a RESPONDENT socket with default options.
    pub fn new() -> Result<Self> {
        Self::with_options(SocketOptions::default())
    }

    /// Create a RESPONDENT socket with explicit options.
    pub fn with_options(options: SocketOptions) -> Result<Self> {
        Ok(Self {
            core: SocketCore::new(Pattern::Respondent, options),
            pending: Mutex::new(None),
        })
    }

    /// Receive the next survey.
    pub fn recv(&self) -> Result<Msg> {
        self.recv_inner(None)
    }

    /// Receive with an explicit deadline instead of the socket default.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Msg> {
        self.recv_inner(Some(timeout))
    }

    /// Respond to the pending survey.
    ///
    /// Fails with `InvalidState` when no survey is pending. A response to a
    /// surveyor that vanished is dropped silently.
    pub fn send(&self, payload: &[u8]) -> Result<()> {
        self.send_inner(payload, None)
    }

    /// Send with an explicit deadline instead of the socket default.
    pub fn send_timeout(&self, payload: &[u8], timeout: Duration) -> Result<()> {
        self.send_inner(payload, Some(timeout))
    }

    fn recv_inner(&self, timeout: Option<Duration>) -> Result<Msg> {
        self.core.ensure_open()?;
        let deadline = self.core.recv_deadline(timeout);

        loop {
            let mut msg = self.core.recv_inbound(deadline)?;
            let Some(header) = wire::decode(msg.payload()) else {
                trace!("dropping datagram without survey header");
                continue;
            };
            msg.set_header_len(header.header_len);

            let mut pending = self.lock();
            if pending.is_some() {
                debug!("new survey overwrites the unanswered one");
            }
            *pending = Some(PendingSurvey {
                peer: msg.peer(),
                header: Bytes::copy_from_slice(msg.header()),
            });
            drop(pending);

            trace!(id = header.id, peer = msg.peer(), "survey received");
            return Ok(msg);
        }
    }

    fn send_inner(&self, payload: &[u8], timeout: Option<Duration>) -> Result<()> {
        self.core.ensure_open()?;
        let deadline = self.core.send_deadline(timeout);

        let Some(survey) = self.lock().take() else {
            return Err(Error::InvalidState("no survey to respond to"));
        };

        let Some(peer) = self.core.peers.get(survey.peer) else {
            debug!(peer = survey.peer, "response dropped: surveyor gone");
            return Ok(());
        };

        let msg = self.core.make_msg(&survey.header, payload)?;
        match self.core.route_to_peer(&peer, msg, deadline) {
            Ok(()) => Ok(()),
            Err(Error::NoPeer) => {
                debug!(peer = peer.id, "response dropped: connection gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<PendingSurvey>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl_socket_common!(RespondentSocket, Pattern::Respondent);
