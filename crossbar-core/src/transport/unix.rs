//! Unix datagram driver for local IPC.
//!
//! Listeners bind a filesystem path (or a Linux abstract-namespace name
//! written as `@name`); dialers bind an automatically generated local
//! address so the listener can address replies, then connect to the remote.
//! A driver that created a filesystem entry removes it on close.

use std::os::unix::net::UnixDatagram;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tracing::trace;

use crate::addr::{Addr, UnixPath};
use crate::error::{Error, Result};

use super::{check_payload, Driver, UNIX_MAX_PAYLOAD};

/// Distinguishes the auto-bound local names of concurrent dialers.
static AUTOBIND_SEQ: AtomicU64 = AtomicU64::new(0);

/// Datagram driver over a Unix domain socket.
#[derive(Debug)]
pub struct UnixDriver {
    sock: UnixDatagram,
    closed: AtomicBool,
    /// Filesystem entry this driver created and must remove on close.
    owned_path: Option<PathBuf>,
}

impl UnixDriver {
    /// Bind a listening socket at `path`.
    ///
    /// A stale filesystem entry at the path is removed first; a bind that
    /// still fails surfaces `AddrInUse` (or the mapped kernel error).
    pub fn bind(path: &UnixPath) -> Result<Self> {
        match path {
            UnixPath::Path(p) => {
                if p.exists() {
                    std::fs::remove_file(p).map_err(Error::from)?;
                }
                let sock = UnixDatagram::bind(p)?;
                trace!(path = %p.display(), "unix listener bound");
                Ok(Self {
                    sock,
                    closed: AtomicBool::new(false),
                    owned_path: Some(p.clone()),
                })
            }
            UnixPath::Abstract(name) => Self::bind_abstract(name),
            UnixPath::Unnamed => Err(Error::InvalidAddress("unix://".to_string())),
        }
    }

    #[cfg(target_os = "linux")]
    fn bind_abstract(name: &[u8]) -> Result<Self> {
        use std::os::linux::net::SocketAddrExt;

        let sa = std::os::unix::net::SocketAddr::from_abstract_name(name)?;
        let sock = UnixDatagram::bind_addr(&sa)?;
        trace!(name = %String::from_utf8_lossy(name), "abstract unix listener bound");
        Ok(Self {
            sock,
            closed: AtomicBool::new(false),
            owned_path: None,
        })
    }

    #[cfg(not(target_os = "linux"))]
    fn bind_abstract(name: &[u8]) -> Result<Self> {
        let _ = name;
        Err(Error::InvalidAddress(
            "abstract namespace requires Linux".to_string(),
        ))
    }

    /// Create a connected socket towards `remote`.
    ///
    /// The local end is auto-bound (abstract name on Linux, temp path
    /// elsewhere) so the remote sees a replyable source address. A missing
    /// remote surfaces `ConnRefused` so dialers treat it as retriable.
    pub fn dial(remote: &UnixPath) -> Result<Self> {
        if matches!(remote, UnixPath::Unnamed) {
            return Err(Error::InvalidAddress(
                "cannot dial an unnamed peer".to_string(),
            ));
        }

        let seq = AUTOBIND_SEQ.fetch_add(1, Ordering::Relaxed);
        let (sock, owned_path) = Self::autobind(seq)?;

        let connect_result = match remote {
            UnixPath::Path(p) => sock.connect(p),
            UnixPath::Abstract(name) => Self::connect_abstract(&sock, name),
            UnixPath::Unnamed => unreachable!("rejected above"),
        };

        if let Err(e) = connect_result {
            if let Some(p) = &owned_path {
                let _ = std::fs::remove_file(p);
            }
            // ENOENT means the listener has not bound yet; fold it into
            // the retriable dial-failure kind.
            return Err(match e.kind() {
                std::io::ErrorKind::NotFound => Error::ConnRefused,
                _ => Error::from(e),
            });
        }

        Ok(Self {
            sock,
            closed: AtomicBool::new(false),
            owned_path,
        })
    }

    #[cfg(target_os = "linux")]
    fn autobind(seq: u64) -> Result<(UnixDatagram, Option<PathBuf>)> {
        use std::os::linux::net::SocketAddrExt;

        let name = format!("crossbar-{}-{seq}", std::process::id());
        let sa = std::os::unix::net::SocketAddr::from_abstract_name(name.as_bytes())?;
        let sock = UnixDatagram::bind_addr(&sa)?;
        Ok((sock, None))
    }

    #[cfg(not(target_os = "linux"))]
    fn autobind(seq: u64) -> Result<(UnixDatagram, Option<PathBuf>)> {
        let path =
            std::env::temp_dir().join(format!(".crossbar-{}-{seq}.sock", std::process::id()));
        if path.exists() {
            std::fs::remove_file(&path).map_err(Error::from)?;
        }
        let sock = UnixDatagram::bind(&path)?;
        Ok((sock, Some(path)))
    }

    #[cfg(target_os = "linux")]
    fn connect_abstract(sock: &UnixDatagram, name: &[u8]) -> std::io::Result<()> {
        use std::os::linux::net::SocketAddrExt;

        let sa = std::os::unix::net::SocketAddr::from_abstract_name(name)?;
        sock.connect_addr(&sa)
    }

    #[cfg(not(target_os = "linux"))]
    fn connect_abstract(_sock: &UnixDatagram, _name: &[u8]) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "abstract namespace requires Linux",
        ))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        Ok(())
    }

    fn map_source(sa: &std::os::unix::net::SocketAddr) -> UnixPath {
        if let Some(p) = sa.as_pathname() {
            return UnixPath::Path(p.to_path_buf());
        }
        #[cfg(target_os = "linux")]
        {
            use std::os::linux::net::SocketAddrExt;
            if let Some(name) = sa.as_abstract_name() {
                return UnixPath::Abstract(name.to_vec());
            }
        }
        UnixPath::Unnamed
    }
}

impl Driver for UnixDriver {
    fn send(&self, buf: &[u8]) -> Result<usize> {
        self.ensure_open()?;
        check_payload(buf.len(), UNIX_MAX_PAYLOAD)?;
        Ok(self.sock.send(buf)?)
    }

    fn send_to(&self, buf: &[u8], dst: &Addr) -> Result<usize> {
        self.ensure_open()?;
        check_payload(buf.len(), UNIX_MAX_PAYLOAD)?;
        match dst {
            Addr::Unix(UnixPath::Path(p)) => Ok(self.sock.send_to(buf, p)?),
            Addr::Unix(UnixPath::Abstract(name)) => self.send_to_abstract(buf, name),
            Addr::Unix(UnixPath::Unnamed) => {
                Err(Error::InvalidAddress("unnamed unix peer".to_string()))
            }
            Addr::Inet(_) => Err(Error::InvalidAddress(
                "inet destination on unix driver".to_string(),
            )),
        }
    }

    fn recv(&self, buf: &mut [u8]) -> Result<(usize, Addr)> {
        self.ensure_open()?;
        let (n, sa) = self.sock.recv_from(buf)?;
        Ok((n, Addr::Unix(Self::map_source(&sa))))
    }

    fn local_addr(&self) -> Result<Addr> {
        let sa = self.sock.local_addr()?;
        Ok(Addr::Unix(Self::map_source(&sa)))
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        Ok(self.sock.set_read_timeout(timeout)?)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        Ok(self.sock.set_write_timeout(timeout)?)
    }

    fn max_payload(&self) -> usize {
        UNIX_MAX_PAYLOAD
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.sock.shutdown(std::net::Shutdown::Both);
        if let Some(p) = &self.owned_path {
            let _ = std::fs::remove_file(p);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl UnixDriver {
    #[cfg(target_os = "linux")]
    fn send_to_abstract(&self, buf: &[u8], name: &[u8]) -> Result<usize> {
        use std::os::linux::net::SocketAddrExt;

        let sa = std::os::unix::net::SocketAddr::from_abstract_name(name)?;
        Ok(self.sock.send_to_addr(buf, &sa)?)
    }

    #[cfg(not(target_os = "linux"))]
    fn send_to_abstract(&self, _buf: &[u8], _name: &[u8]) -> Result<usize> {
        Err(Error::InvalidAddress(
            "abstract namespace requires Linux".to_string(),
        ))
    }
}

impl Drop for UnixDriver {
    fn drop(&mut self) {
        self.close();
    }
}
