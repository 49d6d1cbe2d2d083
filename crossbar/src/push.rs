//! PUSH socket: load-balancing producer.
//!
//! Each send goes to exactly one worker. The cursor rotates over connected
//! peers and advances past the peer that accepted the message, so fairness
//! holds even while some peers are temporarily full. When every queue is
//! full the send blocks: that back-pressure is the pattern's flow control.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::trace;

use crossbar_core::error::{Error, Result};
use crossbar_core::msg::Msg;
use crossbar_core::options::SocketOptions;
use crossbar_core::pattern::Pattern;

use crate::base::SocketCore;
use crate::socket::impl_socket_common;
use crate::task::sleep_interruptibly;

/// Retry pause while every peer queue is full.
const FULL_RETRY_PAUSE: Duration = Duration::from_millis(1);

/// PUSH socket.
pub struct PushSocket {
    core: Arc<SocketCore>,
    cursor: Mutex<usize>,
}

impl PushSocket {
    /// Create a PUSH socket with default options.
    pub fn new() -> Result<Self> {
        Self::with_options(SocketOptions::default())
    }

    /// Create a PUSH socket with explicit options.
    pub fn with_options(options: SocketOptions) -> Result<Self> {
        Ok(Self {
            core: SocketCore::new(Pattern::Push, options),
            cursor: Mutex::new(0),
        })
    }

    /// Hand a payload to the next ready worker.
    pub fn send(&self, payload: &[u8]) -> Result<()> {
        self.send_inner(payload, None)
    }

    /// Send with an explicit deadline instead of the socket default.
    pub fn send_timeout(&self, payload: &[u8], timeout: Duration) -> Result<()> {
        self.send_inner(payload, Some(timeout))
    }

    /// PUSH sockets are send-only.
    pub fn recv(&self) -> Result<Msg> {
        Err(Error::NotSupported)
    }

    /// PUSH sockets are send-only.
    pub fn recv_timeout(&self, _timeout: Duration) -> Result<Msg> {
        Err(Error::NotSupported)
    }

    fn send_inner(&self, payload: &[u8], timeout: Option<Duration>) -> Result<()> {
        self.core.ensure_open()?;
        let deadline = self.core.send_deadline(timeout);
        let mut pending = self.core.make_msg(&[], payload)?;

        loop {
            if self.core.shutdown.is_raised() {
                return Err(Error::Closed);
            }

            let peers = self.core.peers.connected();
            if !peers.is_empty() {
                let start = *self.lock() % peers.len();
                for offset in 0..peers.len() {
                    let idx = (start + offset) % peers.len();
                    let peer = &peers[idx];
                    match peer.outbound.try_send(prepared(pending, peer)) {
                        Ok(()) => {
                            // Advance past the accepting peer.
                            *self.lock() = (idx + 1) % peers.len();
                            trace!(peer = peer.id, "pushed");
                            return Ok(());
                        }
                        Err(flume::TrySendError::Full(m))
                        | Err(flume::TrySendError::Disconnected(m)) => {
                            pending = m;
                        }
                    }
                }
            }

            if deadline.expired() {
                return Err(Error::Timeout);
            }
            if sleep_interruptibly(&self.core.shutdown, FULL_RETRY_PAUSE) {
                return Err(Error::Closed);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn prepared(mut msg: Msg, peer: &crossbar_core::peer::Peer) -> Msg {
    msg.set_addr(peer.addr.clone());
    msg.set_peer(peer.id);
    msg
}

impl_socket_common!(PushSocket, Pattern::Push);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recv_not_supported() {
        let socket = PushSocket::new().unwrap();
        assert!(matches!(socket.recv(), Err(Error::NotSupported)));
    }

    #[test]
    fn test_send_without_peers_times_out() {
        let socket = PushSocket::new().unwrap();
        let err = socket
            .send_timeout(b"task", Duration::from_millis(20))
            .unwrap_err();
        assert!(err.is_timeout());
    }
}
