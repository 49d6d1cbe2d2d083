//! Transport-agnostic socket addressing.
//!
//! Two scheme-style forms are accepted: `unix://<path>` for local datagram
//! sockets (a leading `@` selects the Linux abstract namespace) and
//! `ip://<host>:<port>` for UDP, with bracketed IPv6 hosts.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::Error;

/// The identity of a Unix datagram endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UnixPath {
    /// Filesystem path
    Path(PathBuf),
    /// Linux abstract namespace name (no filesystem entry)
    Abstract(Vec<u8>),
    /// Unbound sender; cannot be replied to
    Unnamed,
}

/// Transport endpoint address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Addr {
    /// UDP transport: `ip://host:port`
    Inet(SocketAddr),
    /// Unix datagram transport: `unix:///path` or `unix://@name`
    Unix(UnixPath),
}

impl Addr {
    /// Parse an address from a string.
    ///
    /// Supported formats:
    /// - `ip://127.0.0.1:5555`
    /// - `ip://[::1]:5555` (IPv6)
    /// - `unix:///tmp/socket.sock`
    /// - `unix://@name` (abstract namespace, Linux)
    ///
    /// # Examples
    ///
    /// ```
    /// use crossbar_core::addr::Addr;
    ///
    /// let addr = Addr::parse("ip://127.0.0.1:5555").unwrap();
    /// assert!(matches!(addr, Addr::Inet(_)));
    ///
    /// let addr = Addr::parse("unix:///tmp/test.sock").unwrap();
    /// assert!(matches!(addr, Addr::Unix(_)));
    /// ```
    pub fn parse(s: &str) -> Result<Self, Error> {
        s.parse()
    }

    /// Returns true if this is a UDP endpoint.
    #[must_use]
    pub fn is_inet(&self) -> bool {
        matches!(self, Self::Inet(_))
    }

    /// Returns true if this is a Unix datagram endpoint.
    #[must_use]
    pub fn is_unix(&self) -> bool {
        matches!(self, Self::Unix(_))
    }
}

impl FromStr for Addr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix("ip://") {
            let socket_addr = rest
                .parse::<SocketAddr>()
                .map_err(|_| Error::InvalidAddress(s.to_string()))?;
            Ok(Self::Inet(socket_addr))
        } else if let Some(rest) = s.strip_prefix("unix://") {
            if rest.is_empty() {
                return Err(Error::InvalidAddress(s.to_string()));
            }
            if let Some(name) = rest.strip_prefix('@') {
                if name.is_empty() {
                    return Err(Error::InvalidAddress(s.to_string()));
                }
                Ok(Self::Unix(UnixPath::Abstract(name.as_bytes().to_vec())))
            } else {
                Ok(Self::Unix(UnixPath::Path(PathBuf::from(rest))))
            }
        } else {
            Err(Error::InvalidAddress(s.to_string()))
        }
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inet(addr) => write!(f, "ip://{addr}"),
            Self::Unix(UnixPath::Path(path)) => write!(f, "unix://{}", path.display()),
            Self::Unix(UnixPath::Abstract(name)) => {
                write!(f, "unix://@{}", String::from_utf8_lossy(name))
            }
            Self::Unix(UnixPath::Unnamed) => write!(f, "unix://"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ip_v4() {
        let addr = Addr::parse("ip://127.0.0.1:5555").unwrap();
        assert!(matches!(addr, Addr::Inet(_)));
        assert_eq!(addr.to_string(), "ip://127.0.0.1:5555");
    }

    #[test]
    fn test_parse_ip_v6() {
        let addr = Addr::parse("ip://[::1]:5555").unwrap();
        assert!(matches!(addr, Addr::Inet(_)));
        assert_eq!(addr.to_string(), "ip://[::1]:5555");
    }

    #[test]
    fn test_parse_unix_path() {
        let addr = Addr::parse("unix:///tmp/test.sock").unwrap();
        assert!(matches!(addr, Addr::Unix(UnixPath::Path(_))));
        assert_eq!(addr.to_string(), "unix:///tmp/test.sock");
    }

    #[test]
    fn test_parse_unix_abstract() {
        let addr = Addr::parse("unix://@crossbar-test").unwrap();
        assert!(matches!(addr, Addr::Unix(UnixPath::Abstract(_))));
        assert_eq!(addr.to_string(), "unix://@crossbar-test");
    }

    #[test]
    fn test_unknown_scheme() {
        let result = Addr::parse("tcp://127.0.0.1:5555");
        assert!(matches!(result, Err(Error::InvalidAddress(_))));
    }

    #[test]
    fn test_bad_host_port() {
        let result = Addr::parse("ip://nonsense");
        assert!(matches!(result, Err(Error::InvalidAddress(_))));
    }

    #[test]
    fn test_empty_unix_path() {
        assert!(Addr::parse("unix://").is_err());
        assert!(Addr::parse("unix://@").is_err());
    }

    #[test]
    fn test_roundtrip_through_display() {
        for s in ["ip://10.0.0.1:80", "unix:///var/run/cb.sock", "unix://@cb"] {
            let addr = Addr::parse(s).unwrap();
            assert_eq!(Addr::parse(&addr.to_string()).unwrap(), addr);
        }
    }
}
