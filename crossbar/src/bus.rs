//! BUS socket: symmetric many-to-many.
//!
//! Every send is cloned to each connected peer, best-effort; a full queue
//! drops that peer's copy only. The outbound path targets peers exclusively,
//! so a socket never hears its own sends. Messages do not forward beyond
//! direct peers.

use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use crossbar_core::error::Result;
use crossbar_core::msg::Msg;
use crossbar_core::options::SocketOptions;
use crossbar_core::pattern::Pattern;

use crate::base::SocketCore;
use crate::socket::impl_socket_common;

/// BUS socket.
pub struct BusSocket {
    core: Arc<SocketCore>,
}

impl BusSocket {
    /// Create a BUS socket with default options.
    pub fn new() -> Result<Self> {
        Self::with_options(SocketOptions::default())
    }

    /// Create a BUS socket with explicit options.
    pub fn with_options(options: SocketOptions) -> Result<Self> {
        Ok(Self {
            core: SocketCore::new(Pattern::Bus, options),
        })
    }

    /// Broadcast a payload to every connected peer, best-effort.
    pub fn send(&self, payload: &[u8]) -> Result<()> {
        self.core.ensure_open()?;

        let peers = self.core.peers.connected();
        if peers.is_empty() {
            return Ok(());
        }

        let base = self.core.make_msg(&[], payload)?;
        let mut delivered = 0usize;
        for peer in &peers {
            if self.core.try_route(peer, base.duplicate()) {
                delivered += 1;
            }
        }
        trace!(delivered, total = peers.len(), "bus broadcast");
        Ok(())
    }

    /// Receive the next payload from any peer.
    pub fn recv(&self) -> Result<Msg> {
        self.recv_inner(None)
    }

    /// Receive with an explicit deadline instead of the socket default.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Msg> {
        self.recv_inner(Some(timeout))
    }

    fn recv_inner(&self, timeout: Option<Duration>) -> Result<Msg> {
        self.core.ensure_open()?;
        let deadline = self.core.recv_deadline(timeout);
        self.core.recv_inbound(deadline)
    }
}

impl_socket_common!(BusSocket, Pattern::Bus);
