//! PULL socket: fan-in consumer.
//!
//! Receives payloads from connected PUSH sockets. Per connection, arrival
//! order is send order; across connections no order is defined.

use std::sync::Arc;
use std::time::Duration;

use crossbar_core::error::{Error, Result};
use crossbar_core::msg::Msg;
use crossbar_core::options::SocketOptions;
use crossbar_core::pattern::Pattern;

use crate::base::SocketCore;
use crate::socket::impl_socket_common;

/// PULL socket.
pub struct PullSocket {
    core: Arc<SocketCore>,
}

impl PullSocket {
    /// Create a PULL socket with default options.
    pub fn new() -> Result<Self> {
        Self::with_options(SocketOptions::default())
    }

    /// Create a PULL socket with explicit options.
    pub fn with_options(options: SocketOptions) -> Result<Self> {
        Ok(Self {
            core: SocketCore::new(Pattern::Pull, options),
        })
    }

    /// Receive the next payload from any producer.
    pub fn recv(&self) -> Result<Msg> {
        self.recv_inner(None)
    }

    /// Receive with an explicit deadline instead of the socket default.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Msg> {
        self.recv_inner(Some(timeout))
    }

    /// PULL sockets are receive-only.
    pub fn send(&self, _payload: &[u8]) -> Result<()> {
        Err(Error::NotSupported)
    }

    /// PULL sockets are receive-only.
    pub fn send_timeout(&self, _payload: &[u8], _timeout: Duration) -> Result<()> {
        Err(Error::NotSupported)
    }

    fn recv_inner(&self, timeout: Option<Duration>) -> Result<Msg> {
        self.core.ensure_open()?;
        let deadline = self.core.recv_deadline(timeout);
        self.core.recv_inbound(deadline)
    }
}

impl_socket_common!(PullSocket, Pattern::Pull);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::Socket;

    #[test]
    fn test_send_not_supported() {
        let socket = PullSocket::new().unwrap();
        assert!(matches!(socket.send(b"x"), Err(Error::NotSupported)));
    }

    #[test]
    fn test_recv_deadline() {
        let socket = PullSocket::new().unwrap();
        let err = socket.recv_timeout(Duration::from_millis(10)).unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_closed_recv() {
        let socket = PullSocket::new().unwrap();
        socket.close().unwrap();
        assert!(socket.recv().unwrap_err().is_closed());
    }
}
