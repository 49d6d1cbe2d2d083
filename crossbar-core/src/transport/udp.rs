//! UDP driver for inter-host messaging.
//!
//! Listeners bind with SO_REUSEADDR; dialers bind an ephemeral port of the
//! matching family and connect, so the kernel filters inbound datagrams to
//! the remote. IPv4 and IPv6 are both supported.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::trace;

use crate::addr::Addr;
use crate::error::{Error, Result};

use super::{check_payload, Driver, UDP_MAX_PAYLOAD};

/// Datagram driver over a UDP socket.
#[derive(Debug)]
pub struct UdpDriver {
    sock: UdpSocket,
    closed: AtomicBool,
}

impl UdpDriver {
    /// Bind a listening socket at `addr` with SO_REUSEADDR set.
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let sock = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
            .map_err(Error::from)?;
        sock.set_reuse_address(true).map_err(Error::from)?;
        sock.bind(&addr.into()).map_err(Error::from)?;

        let sock: UdpSocket = sock.into();
        trace!(%addr, "udp listener bound");
        Ok(Self {
            sock,
            closed: AtomicBool::new(false),
        })
    }

    /// Create a connected socket towards `remote` from an ephemeral local
    /// port of the matching address family.
    pub fn dial(remote: SocketAddr) -> Result<Self> {
        let local: SocketAddr = if remote.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let sock = UdpSocket::bind(local)?;
        sock.connect(remote)?;
        trace!(%remote, "udp dialer connected");
        Ok(Self {
            sock,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        Ok(())
    }
}

impl Driver for UdpDriver {
    fn send(&self, buf: &[u8]) -> Result<usize> {
        self.ensure_open()?;
        check_payload(buf.len(), UDP_MAX_PAYLOAD)?;
        Ok(self.sock.send(buf)?)
    }

    fn send_to(&self, buf: &[u8], dst: &Addr) -> Result<usize> {
        self.ensure_open()?;
        check_payload(buf.len(), UDP_MAX_PAYLOAD)?;
        match dst {
            Addr::Inet(sa) => Ok(self.sock.send_to(buf, sa)?),
            Addr::Unix(_) => Err(Error::InvalidAddress(
                "unix destination on udp driver".to_string(),
            )),
        }
    }

    fn recv(&self, buf: &mut [u8]) -> Result<(usize, Addr)> {
        self.ensure_open()?;
        let (n, src) = self.sock.recv_from(buf)?;
        Ok((n, Addr::Inet(src)))
    }

    fn local_addr(&self) -> Result<Addr> {
        Ok(Addr::Inet(self.sock.local_addr()?))
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        Ok(self.sock.set_read_timeout(timeout)?)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        Ok(self.sock.set_write_timeout(timeout)?)
    }

    fn max_payload(&self) -> usize {
        UDP_MAX_PAYLOAD
    }

    fn close(&self) {
        // UDP has no shutdown; the closed flag plus the receiver's short
        // read deadline make closure observable.
        self.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
