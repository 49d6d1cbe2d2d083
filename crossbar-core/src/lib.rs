//! Crossbar Core
//!
//! Runtime-agnostic building blocks for the crossbar messaging substrate:
//! - Error taxonomy shared by every layer (`error`)
//! - Scheme-style address model and parser (`addr`)
//! - Pooled datagram buffers and the `Msg` unit of transfer (`pool`, `msg`)
//! - Socket options and dialer backoff (`options`, `reconnect`)
//! - Peer registry with dual indices (`peer`)
//! - Correlation header codec (`wire`)
//! - Lifecycle events and counters (`monitor`)
//! - Unix datagram and UDP transport drivers (`transport`)
//!
//! The protocol engines and the blocking socket surface live in the
//! `crossbar` crate on top of these pieces.

#![deny(unsafe_code)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::return_self_not_must_use)]

pub mod addr;
pub mod deadline;
pub mod error;
pub mod monitor;
pub mod msg;
pub mod options;
pub mod pattern;
pub mod peer;
pub mod pool;
pub mod reconnect;
pub mod transport;
pub mod wire;

// Small prelude for the protocol crate; kept minimal to avoid API lock-in.
pub mod prelude {
    pub use crate::addr::{Addr, UnixPath};
    pub use crate::deadline::{Deadline, POLL_INTERVAL};
    pub use crate::error::{Error, Result};
    pub use crate::monitor::{Monitor, SocketEvent, SocketStats, StatsSnapshot};
    pub use crate::msg::Msg;
    pub use crate::options::SocketOptions;
    pub use crate::pattern::Pattern;
    pub use crate::peer::{Peer, PeerId, PeerRegistry, PeerState};
    pub use crate::pool::{BufferPool, PoolStats};
    pub use crate::reconnect::ReconnectState;
    pub use crate::transport::Driver;
}
