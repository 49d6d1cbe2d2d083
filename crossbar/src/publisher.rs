//! PUB socket: stateless broadcaster.
//!
//! Each send clones the payload once per connected peer and enqueues it
//! without blocking; a peer whose outbound queue is full drops just this
//! message (the slow-subscriber rule). Topic filtering happens entirely on
//! the SUB side, so the payload goes out bare.

use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use crossbar_core::error::{Error, Result};
use crossbar_core::options::SocketOptions;
use crossbar_core::pattern::Pattern;

use crate::base::SocketCore;
use crate::socket::impl_socket_common;

/// PUB socket.
pub struct PublisherSocket {
    core: Arc<SocketCore>,
}

impl PublisherSocket {
    /// Create a PUB socket with default options.
    pub fn new() -> Result<Self> {
        Self::with_options(SocketOptions::default())
    }

    /// Create a PUB socket with explicit options.
    pub fn with_options(options: SocketOptions) -> Result<Self> {
        Ok(Self {
            core: SocketCore::new(Pattern::Pub, options),
        })
    }

    /// Broadcast a payload to every connected subscriber.
    ///
    /// Never blocks: slow subscribers lose this message, fast ones are
    /// unaffected. Publishing with no subscribers is a successful no-op.
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
        trace!(delivered, total = peers.len(), "published");
        Ok(())
    }

    /// PUB sockets are send-only.
    pub fn recv(&self) -> Result<crossbar_core::msg::Msg> {
        Err(Error::NotSupported)
    }

    /// PUB sockets are send-only.
    pub fn recv_timeout(&self, _timeout: Duration) -> Result<crossbar_core::msg::Msg> {
        Err(Error::NotSupported)
    }
}

impl_socket_common!(PublisherSocket, Pattern::Pub);
