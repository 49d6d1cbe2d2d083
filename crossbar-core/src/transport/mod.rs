//! Datagram transport drivers.
//!
//! A driver moves whole datagrams between the kernel and the library and
//! nothing more: message boundaries are preserved, no framing is added, and
//! every error maps into the crate taxonomy. Protocol engines are
//! driver-agnostic; they see only this trait.

use std::sync::Arc;
use std::time::Duration;

use crate::addr::Addr;
use crate::error::{Error, Result};

mod udp;
mod unix;

pub use udp::UdpDriver;
pub use unix::UnixDriver;

/// Largest payload a Unix datagram carries here.
pub const UNIX_MAX_PAYLOAD: usize = 65_536;

/// Largest payload a UDP datagram can carry.
pub const UDP_MAX_PAYLOAD: usize = 65_507;

/// Message-oriented bidirectional byte movement with preserved boundaries.
///
/// Contract:
/// - Payloads above [`Driver::max_payload`] fail with `MessageTooLarge`
///   before any syscall.
/// - Timeouts surface as `Timeout` and are retriable; a closed driver fails
///   everything with `Closed`, terminally.
/// - `send`/`send_to` and `recv` may be called from different threads; the
///   kernel serializes datagram I/O.
pub trait Driver: Send + Sync + 'static {
    /// Send one datagram to the connected remote.
    fn send(&self, buf: &[u8]) -> Result<usize>;

    /// Send one datagram to an explicit destination (unconnected handles).
    fn send_to(&self, buf: &[u8], dst: &Addr) -> Result<usize>;

    /// Receive one datagram; returns its length and source address.
    fn recv(&self, buf: &mut [u8]) -> Result<(usize, Addr)>;

    /// The address this handle is bound to.
    fn local_addr(&self) -> Result<Addr>;

    /// Deadline for `recv`. `None` blocks indefinitely.
    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()>;

    /// Deadline for `send`. `None` blocks indefinitely.
    fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()>;

    /// Set both deadlines at once.
    fn set_deadline(&self, timeout: Option<Duration>) -> Result<()> {
        self.set_read_timeout(timeout)?;
        self.set_write_timeout(timeout)
    }

    /// Transport payload ceiling in bytes.
    fn max_payload(&self) -> usize;

    /// Close the handle. Idempotent; subsequent operations fail with
    /// `Closed`. A Unix listener removes its filesystem entry.
    fn close(&self);

    /// True once `close` has run.
    fn is_closed(&self) -> bool;
}

/// Bind a listening driver for `addr`.
///
/// Datagram transports have no accept queue: the bound handle itself is the
/// accepted transport, serving every remote that sends to it.
pub fn bind(addr: &Addr) -> Result<Arc<dyn Driver>> {
    match addr {
        Addr::Unix(path) => Ok(Arc::new(UnixDriver::bind(path)?)),
        Addr::Inet(sa) => Ok(Arc::new(UdpDriver::bind(*sa)?)),
    }
}

/// Create a connected driver towards `addr`.
///
/// The local end is bound automatically so the remote can reply.
pub fn dial(addr: &Addr) -> Result<Arc<dyn Driver>> {
    match addr {
        Addr::Unix(path) => Ok(Arc::new(UnixDriver::dial(path)?)),
        Addr::Inet(sa) => Ok(Arc::new(UdpDriver::dial(*sa)?)),
    }
}

pub(crate) fn check_payload(len: usize, max: usize) -> Result<()> {
    if len > max {
        return Err(Error::MessageTooLarge { size: len, max });
    }
    Ok(())
}
