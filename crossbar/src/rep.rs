//! REP socket: the answering side of request/reply.
//!
//! `recv` captures the request's header (backtrace plus identifier) and
//! source peer; `send` mirrors that header onto the response and routes it
//! back. The header is opaque here: endpoints never synthesize backtrace
//! entries, they echo what arrived.

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

/// The request a REP socket still owes a response to.
#[derive(Debug)]
struct PendingRequest {
    peer: PeerId,
    /// Backtrace and identifier, mirrored verbatim onto the reply.
    header: Bytes,
}

/// REP socket.
///
/// # State machine
///
/// ```text
/// Idle → recv() → HaveRequest → send() → Idle
/// ```
pub struct RepSocket {
    core: Arc<SocketCore>,
    pending: Mutex<Option<PendingRequest>>,
}

impl RepSocket {
    /// Create a REP socket with default options.
    pub fn new() -> Result<Self> {
        Self::with_options(SocketOptions::default())
    }

    /// Create a REP socket with explicit options.
    pub fn with_options(options: SocketOptions) -> Result<Self> {
        Ok(Self {
            core: SocketCore::new(Pattern::Rep, options),
            pending: Mutex::new(None),
        })
    }

    /// Receive the next request from any peer.
    pub fn recv(&self) -> Result<Msg> {
        self.recv_inner(None)
    }

    /// Receive with an explicit deadline instead of the socket default.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Msg> {
        self.recv_inner(Some(timeout))
    }

    /// Send the response to the last received request.
    ///
    /// Fails with `InvalidState` when no request is pending. A response to
    /// a peer that disconnected in the meantime is dropped silently and the
    /// socket returns to idle.
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
                trace!("dropping datagram without request header");
                continue;
            };
            msg.set_header_len(header.header_len);

            *self.lock() = Some(PendingRequest {
                peer: msg.peer(),
                header: Bytes::copy_from_slice(msg.header()),
            });
            trace!(id = header.id, peer = msg.peer(), "request received");
            return Ok(msg);
        }
    }

    fn send_inner(&self, payload: &[u8], timeout: Option<Duration>) -> Result<()> {
        self.core.ensure_open()?;
        let deadline = self.core.send_deadline(timeout);

        let Some(request) = self.lock().take() else {
            return Err(Error::InvalidState("no request to respond to"));
        };

        let Some(peer) = self.core.peers.get(request.peer) else {
            debug!(peer = request.peer, "response dropped: peer gone");
            return Ok(());
        };

        let msg = self.core.make_msg(&request.header, payload)?;
        match self.core.route_to_peer(&peer, msg, deadline) {
            Ok(()) => Ok(()),
            // The connection died under us; same outcome as a vanished peer.
            Err(Error::NoPeer) => {
                debug!(peer = peer.id, "response dropped: connection gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<PendingRequest>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl_socket_common!(RepSocket, Pattern::Rep);
