//! PAIR socket: exclusive one-to-one link.
//!
//! At most one peer occupies the slot. The listener refuses datagrams from
//! any further source while the slot is held (no peer state is created for
//! them), and dialing out while a peer exists fails with `Busy`. When the
//! peer goes away the slot frees and a new peer may take it.

use std::sync::Arc;
use std::time::Duration;

use crossbar_core::error::{Error, Result};
use crossbar_core::msg::Msg;
use crossbar_core::options::SocketOptions;
use crossbar_core::pattern::Pattern;

use crate::base::SocketCore;
use crate::socket::impl_socket_common;

/// PAIR socket.
pub struct PairSocket {
    core: Arc<SocketCore>,
}

impl PairSocket {
    /// Create a PAIR socket with default options.
    pub fn new() -> Result<Self> {
        Self::with_options(SocketOptions::default())
    }

    /// Create a PAIR socket with explicit options.
    pub fn with_options(options: SocketOptions) -> Result<Self> {
        Ok(Self {
            core: SocketCore::new(Pattern::Pair, options),
        })
    }

    /// Occupied-slot guard for outgoing dials.
    fn pre_dial(&self) -> Result<()> {
        if self.core.peers.count() >= 1 || self.core.dial_pending() {
            return Err(Error::Busy);
        }
        Ok(())
    }

    /// Send a payload to the peer.
    ///
    /// Fails with `NotConnected` while the slot is empty. Back-pressure
    /// applies through the bounded outbound queue.
    pub fn send(&self, payload: &[u8]) -> Result<()> {
        self.send_inner(payload, None)
    }

    /// Send with an explicit deadline instead of the socket default.
    pub fn send_timeout(&self, payload: &[u8], timeout: Duration) -> Result<()> {
        self.send_inner(payload, Some(timeout))
    }

    /// Receive the next payload from the peer.
    ///
    /// Fails with `NotConnected` when the slot is empty and nothing could
    /// fill it (no listener bound, no dial pending).
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

        let peers = self.core.peers.connected();
        let Some(peer) = peers.first() else {
            return Err(Error::NotConnected);
        };

        let msg = self.core.make_msg(&[], payload)?;
        match self.core.route_to_peer(peer, msg, deadline) {
            Err(Error::NoPeer) => Err(Error::NotConnected),
            other => other,
        }
    }

    fn recv_inner(&self, timeout: Option<Duration>) -> Result<Msg> {
        self.core.ensure_open()?;

        if self.core.peers.count() == 0
            && !self.core.has_listener()
            && !self.core.dial_pending()
        {
            return Err(Error::NotConnected);
        }

        let deadline = self.core.recv_deadline(timeout);
        self.core.recv_inbound(deadline)
    }
}

impl_socket_common!(PairSocket, Pattern::Pair, guarded);
