/// Crossbar Error Types
///
/// One taxonomy for the whole substrate. Transport drivers, worker threads
/// and protocol engines all speak this type; callers match on the kind.

use std::io;
use thiserror::Error;

/// Main error type for crossbar operations
#[derive(Error, Debug)]
pub enum Error {
    /// The socket (or one of its connections) has been closed
    #[error("socket closed")]
    Closed,

    /// A deadline elapsed before the operation could complete
    #[error("operation timed out")]
    Timeout,

    /// Operation is not legal in the engine's current state
    #[error("invalid protocol state: {0}")]
    InvalidState(&'static str),

    /// No connected peer is available and no dial is pending
    #[error("no connected peer")]
    NoPeer,

    /// PAIR operation with an empty peer slot
    #[error("not connected")]
    NotConnected,

    /// The pattern does not support this direction
    #[error("operation not supported by this socket pattern")]
    NotSupported,

    /// PAIR peer slot is already occupied
    #[error("peer slot busy")]
    Busy,

    /// Unsubscribe of a prefix that was never registered
    #[error("subscription not found")]
    NotFound,

    /// Payload exceeds the transport or configured ceiling
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Listener bind failed because the address is taken
    #[error("address in use")]
    AddrInUse,

    /// The remote endpoint refused the datagram flow
    #[error("connection refused")]
    ConnRefused,

    /// Address string did not parse
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// A listener already exists on this socket
    #[error("socket is already listening")]
    AlreadyListening,

    /// Operation-site context; preserves the underlying kind
    #[error("{op} {addr}: {source}")]
    Context {
        op: &'static str,
        addr: String,
        #[source]
        source: Box<Error>,
    },

    /// I/O error that maps to no taxonomy kind
    #[error("io error: {0}")]
    Io(io::Error),
}

/// Result type alias for crossbar operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap this error with the operation name and address it occurred at.
    #[must_use]
    pub fn context(self, op: &'static str, addr: impl Into<String>) -> Self {
        Self::Context {
            op,
            addr: addr.into(),
            source: Box::new(self),
        }
    }

    /// The underlying kind, seen through any `Context` wrapping.
    #[must_use]
    pub fn kind(&self) -> &Self {
        match self {
            Self::Context { source, .. } => source.kind(),
            other => other,
        }
    }

    /// True if the operation failed because the socket is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self.kind(), Self::Closed)
    }

    /// True if a deadline fired; the operation may be retried.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self.kind(), Self::Timeout)
    }

    /// True for transient conditions a worker loop should simply retry.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self.kind() {
            Self::Timeout => true,
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

impl From<io::Error> for Error {
    /// Fold kernel errors into the taxonomy. Kinds without a taxonomy
    /// counterpart stay wrapped so the original error is not lost.
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Self::Timeout,
            io::ErrorKind::ConnectionRefused => Self::ConnRefused,
            io::ErrorKind::AddrInUse => Self::AddrInUse,
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::ConnectionAborted => Self::Closed,
            _ => Self::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_preserves_kind() {
        let err = Error::Timeout.context("recv", "unix:///tmp/x.sock");
        assert!(err.is_timeout());
        assert!(matches!(err.kind(), Error::Timeout));
        let msg = err.to_string();
        assert!(msg.contains("recv"));
        assert!(msg.contains("/tmp/x.sock"));
    }

    #[test]
    fn test_nested_context() {
        let err = Error::Closed
            .context("send", "a")
            .context("dial", "b");
        assert!(err.is_closed());
    }

    #[test]
    fn test_io_mapping() {
        let timeout: Error = io::Error::from(io::ErrorKind::TimedOut).into();
        assert!(timeout.is_timeout());

        let refused: Error = io::Error::from(io::ErrorKind::ConnectionRefused).into();
        assert!(matches!(refused, Error::ConnRefused));

        let in_use: Error = io::Error::from(io::ErrorKind::AddrInUse).into();
        assert!(matches!(in_use, Error::AddrInUse));

        let other: Error = io::Error::from(io::ErrorKind::PermissionDenied).into();
        assert!(matches!(other, Error::Io(_)));
    }

    #[test]
    fn test_retriable() {
        assert!(Error::Timeout.is_retriable());
        let intr: Error = io::Error::from(io::ErrorKind::Interrupted).into();
        assert!(intr.is_retriable());
        assert!(!Error::Closed.is_retriable());
    }
}
