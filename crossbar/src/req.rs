//! REQ socket: the asking side of request/reply.
//!
//! State lives per socket, not per peer: one request may be outstanding at
//! a time. Requests fan out round-robin over connected peers; replies are
//! correlated by identifier, so stale and reordered replies are discarded
//! rather than delivered. With `req_resend_ivl` configured, an unanswered
//! request is re-enqueued each interval while `recv` waits.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use tracing::{debug, trace};

use crossbar_core::deadline::Deadline;
use crossbar_core::error::{Error, Result};
use crossbar_core::msg::Msg;
use crossbar_core::options::SocketOptions;
use crossbar_core::pattern::Pattern;
use crossbar_core::peer::Peer;
use crossbar_core::wire;

use crate::base::SocketCore;
use crate::socket::impl_socket_common;
use crate::task::sleep_interruptibly;

#[derive(Debug, Default)]
struct ReqState {
    /// 31-bit identifier counter; allocations skip the outstanding id.
    next_id: u32,
    /// The request awaiting its reply, when one is.
    outstanding: Option<u32>,
    /// Copy kept for automatic resends.
    pending: Option<Msg>,
    /// When the next automatic resend fires.
    resend_at: Option<Instant>,
    /// Round-robin position over connected peers.
    cursor: usize,
}

/// REQ socket.
///
/// # State machine
///
/// ```text
/// Idle → send() → AwaitingReply → recv() → Idle
/// ```
///
/// A second `send` while awaiting a reply replaces the outstanding request;
/// replies to the replaced identifier are discarded.
pub struct ReqSocket {
    core: Arc<SocketCore>,
    state: Mutex<ReqState>,
}

impl ReqSocket {
    /// Create a REQ socket with default options.
    pub fn new() -> Result<Self> {
        Self::with_options(SocketOptions::default())
    }

    /// Create a REQ socket with explicit options.
    pub fn with_options(options: SocketOptions) -> Result<Self> {
        Ok(Self {
            core: SocketCore::new(Pattern::Req, options),
            state: Mutex::new(ReqState::default()),
        })
    }

    /// Send a request, blocking until it is queued towards a peer.
    ///
    /// Fails with `NoPeer` when no peer is connected and no dial is
    /// pending; blocks until a peer appears otherwise.
    pub fn send(&self, payload: &[u8]) -> Result<()> {
        self.send_inner(payload, None)
    }

    /// Send with an explicit deadline instead of the socket default.
    pub fn send_timeout(&self, payload: &[u8], timeout: Duration) -> Result<()> {
        self.send_inner(payload, Some(timeout))
    }

    /// Receive the reply to the outstanding request.
    pub fn recv(&self) -> Result<Msg> {
        self.recv_inner(None)
    }

    /// Receive with an explicit deadline instead of the socket default.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Msg> {
        self.recv_inner(Some(timeout))
    }

    fn send_inner(&self, payload: &[u8], timeout: Option<Duration>) -> Result<()> {
        self.core.ensure_open()?;
        let deadline = self.core.send_deadline(timeout);

        let id = {
            let mut state = self.lock();
            let outstanding = state.outstanding;
            wire::next_id(&mut state.next_id, outstanding)
        };
        let mut header = BytesMut::with_capacity(wire::WORD);
        wire::encode(&mut header, &[], id);
        let msg = self.core.make_msg(&header, payload)?;

        // Keep a copy before the original moves into the queue.
        let resend_copy = self
            .core
            .options()
            .req_resend_ivl
            .map(|_| msg.duplicate());

        let peer = self.wait_for_peer(deadline)?;
        self.core.route_to_peer(&peer, msg, deadline)?;
        trace!(id, peer = peer.id, "request queued");

        let mut state = self.lock();
        if state.outstanding.is_some() {
            debug!(id, "replacing outstanding request");
        }
        state.outstanding = Some(id);
        state.pending = resend_copy;
        state.resend_at = self
            .core
            .options()
            .req_resend_ivl
            .map(|ivl| Instant::now() + ivl);
        Ok(())
    }

    fn recv_inner(&self, timeout: Option<Duration>) -> Result<Msg> {
        self.core.ensure_open()?;
        let deadline = self.core.recv_deadline(timeout);

        loop {
            let (expected, resend_at) = {
                let state = self.lock();
                (state.outstanding, state.resend_at)
            };
            let Some(expected) = expected else {
                return Err(Error::InvalidState("no outstanding request"));
            };

            if let Some(at) = resend_at {
                if Instant::now() >= at {
                    self.resend();
                }
            }

            let wait = match resend_at {
                Some(at) => deadline.earlier(Deadline::at(at)),
                None => deadline,
            };
            match self.core.recv_inbound(wait) {
                Ok(mut msg) => {
                    let Some(header) = wire::decode(msg.payload()) else {
                        trace!("dropping malformed reply");
                        continue;
                    };
                    if header.id != expected {
                        trace!(got = header.id, expected, "discarding stale reply");
                        continue;
                    }

                    let mut state = self.lock();
                    if state.outstanding != Some(expected) {
                        // Replaced by a concurrent send; this reply is stale.
                        continue;
                    }
                    state.outstanding = None;
                    state.pending = None;
                    state.resend_at = None;
                    drop(state);

                    msg.set_header_len(header.header_len);
                    return Ok(msg);
                }
                Err(e) if e.is_timeout() => {
                    if deadline.expired() {
                        return Err(Error::Timeout);
                    }
                    // Resend wakeup; the loop handles it.
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Round-robin over connected peers, waiting while a dial is pending.
    fn wait_for_peer(&self, deadline: Deadline) -> Result<Peer> {
        loop {
            if self.core.shutdown.is_raised() {
                return Err(Error::Closed);
            }

            let peers = self.core.peers.connected();
            if let Some(peer) = {
                let mut state = self.lock();
                let pick = (!peers.is_empty()).then(|| {
                    let idx = state.cursor % peers.len();
                    state.cursor = state.cursor.wrapping_add(1);
                    peers[idx].clone()
                });
                pick
            } {
                return Ok(peer);
            }

            if !self.core.dial_pending() {
                // A dialer may have delivered its peer between the snapshot
                // above and this check.
                if self.core.peers.connected().is_empty() {
                    return Err(Error::NoPeer);
                }
                continue;
            }
            if deadline.expired() {
                return Err(Error::Timeout);
            }
            if sleep_interruptibly(&self.core.shutdown, deadline.slice()) {
                return Err(Error::Closed);
            }
        }
    }

    /// Re-enqueue the pending request copy towards the next peer.
    ///
    /// Best-effort: a full queue just waits for the next interval.
    fn resend(&self) {
        let (copy, ivl) = {
            let mut state = self.lock();
            let Some(ivl) = self.core.options().req_resend_ivl else {
                return;
            };
            state.resend_at = Some(Instant::now() + ivl);
            (state.pending.as_ref().map(Msg::duplicate), ivl)
        };
        let Some(copy) = copy else { return };

        let peers = self.core.peers.connected();
        if peers.is_empty() {
            return;
        }
        let peer = {
            let mut state = self.lock();
            let idx = state.cursor % peers.len();
            state.cursor = state.cursor.wrapping_add(1);
            peers[idx].clone()
        };
        if self.core.try_route(&peer, copy) {
            debug!(peer = peer.id, ivl = ?ivl, "request resent");
        }
    }

    fn lock(&self) -> MutexGuard<'_, ReqState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl_socket_common!(ReqSocket, Pattern::Req);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::Socket;

    #[test]
    fn test_recv_without_send_is_invalid_state() {
        let socket = ReqSocket::new().unwrap();
        let err = socket.recv_timeout(Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn test_send_without_peer_fails_fast() {
        let socket = ReqSocket::new().unwrap();
        let err = socket.send(b"ping").unwrap_err();
        assert!(matches!(err, Error::NoPeer));
    }

    #[test]
    fn test_closed_send() {
        let socket = ReqSocket::new().unwrap();
        socket.close().unwrap();
        assert!(socket.send(b"x").unwrap_err().is_closed());
    }
}
