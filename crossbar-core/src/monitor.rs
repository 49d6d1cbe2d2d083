//! Socket observability: lifecycle events and counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::addr::Addr;
use crate::peer::PeerId;

/// Socket lifecycle events.
#[derive(Debug, Clone)]
pub enum SocketEvent {
    /// A listener is accepting datagrams on the address.
    Listening(Addr),

    /// A peer entered the registry.
    PeerConnected { peer: PeerId, addr: Addr },

    /// A peer left the registry.
    PeerDisconnected { peer: PeerId, addr: Addr },

    /// A datagram source was turned away (e.g. PAIR already has its peer).
    PeerRefused(Addr),

    /// A dial attempt failed; the dialer backs off and retries.
    DialFailed { addr: Addr, reason: String },

    /// The socket completed its close sequence.
    Closed,
}

impl fmt::Display for SocketEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listening(addr) => write!(f, "listening on {addr}"),
            Self::PeerConnected { peer, addr } => write!(f, "peer {peer} connected from {addr}"),
            Self::PeerDisconnected { peer, addr } => write!(f, "peer {peer} at {addr} gone"),
            Self::PeerRefused(addr) => write!(f, "refused peer at {addr}"),
            Self::DialFailed { addr, reason } => write!(f, "dial {addr} failed: {reason}"),
            Self::Closed => write!(f, "socket closed"),
        }
    }
}

/// Handle for receiving socket events.
pub type Monitor = flume::Receiver<SocketEvent>;

/// Sender half used by socket internals to emit events.
pub type EventSender = flume::Sender<SocketEvent>;

/// Create a monitoring channel pair.
#[must_use]
pub fn channel() -> (EventSender, Monitor) {
    flume::unbounded()
}

/// Per-socket counters, updated without serialization.
#[derive(Debug, Default)]
pub struct SocketStats {
    msgs_sent: AtomicU64,
    msgs_recvd: AtomicU64,
    send_errors: AtomicU64,
    recv_errors: AtomicU64,
    dropped_full: AtomicU64,
    refused_peers: AtomicU64,
}

/// Point-in-time snapshot of [`SocketStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub msgs_sent: u64,
    pub msgs_recvd: u64,
    pub send_errors: u64,
    pub recv_errors: u64,
    pub dropped_full: u64,
    pub refused_peers: u64,
}

impl SocketStats {
    pub fn note_sent(&self) {
        self.msgs_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_recvd(&self) {
        self.msgs_recvd.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_send_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_recv_error(&self) {
        self.recv_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_dropped_full(&self) {
        self.dropped_full.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_refused_peer(&self) {
        self.refused_peers.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            msgs_sent: self.msgs_sent.load(Ordering::Relaxed),
            msgs_recvd: self.msgs_recvd.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            recv_errors: self.recv_errors.load(Ordering::Relaxed),
            dropped_full: self.dropped_full.load(Ordering::Relaxed),
            refused_peers: self.refused_peers.load(Ordering::Relaxed),
        }
    }
}
