//! # Crossbar
//!
//! A scalability-protocols messaging substrate over datagram transports.
//!
//! ## Architecture
//!
//! Crossbar is layered the same way top to bottom:
//!
//! - **`crossbar-core`**: error taxonomy, addressing, pooled buffers,
//!   options, peer registry, correlation codec, transport drivers
//! - **`crossbar`** (this crate): connections and worker pairs, the shared
//!   socket core, and the ten pattern sockets
//!
//! ## Patterns
//!
//! REQ/REP, PUB/SUB, PUSH/PULL, SURVEYOR/RESPONDENT, BUS and PAIR, over two
//! transports: `unix://<path>` (Unix datagram, local IPC) and
//! `ip://<host>:<port>` (UDP). The surface is blocking; the interior is a
//! worker-thread pair per connection coordinating through bounded queues.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use crossbar::prelude::*;
//!
//! # fn main() -> crossbar::Result<()> {
//! // Reply side
//! let rep = RepSocket::new()?;
//! rep.listen("unix:///tmp/echo.sock")?;
//!
//! // Request side
//! let req = ReqSocket::new()?;
//! req.dial_and_wait("unix:///tmp/echo.sock")?;
//!
//! req.send(b"ping")?;
//! let request = rep.recv()?;
//! rep.send(request.payload())?;
//! let reply = req.recv()?;
//! assert_eq!(reply.payload(), b"ping");
//! # Ok(())
//! # }
//! ```
//!
//! ## Flow control
//!
//! Bounded queues are the only flow-control knob. A full outbound queue
//! blocks the sending patterns (REQ, PUSH, PAIR) and drops per peer for the
//! broadcasting ones (PUB, SURVEYOR, BUS). A full inbound queue blocks the
//! receiver thread, which propagates back into kernel buffers.

#![deny(unsafe_code)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

mod base;
mod conn;
mod task;

pub mod socket;

mod bus;
mod pair;
mod publisher;
mod pull;
mod push;
mod rep;
mod req;
mod respondent;
mod subscriber;
mod surveyor;

pub use bus::BusSocket;
pub use pair::PairSocket;
pub use publisher::PublisherSocket;
pub use pull::PullSocket;
pub use push::PushSocket;
pub use rep::RepSocket;
pub use req::ReqSocket;
pub use respondent::RespondentSocket;
pub use socket::Socket;
pub use subscriber::SubscriberSocket;
pub use surveyor::SurveyorSocket;

pub use crossbar_core::addr::{Addr, UnixPath};
pub use crossbar_core::error::{Error, Result};
pub use crossbar_core::monitor::{Monitor, SocketEvent, StatsSnapshot};
pub use crossbar_core::msg::Msg;
pub use crossbar_core::options::SocketOptions;
pub use crossbar_core::pattern::Pattern;

/// Everything an application typically needs.
pub mod prelude {
    pub use crate::socket::Socket;
    pub use crate::{
        BusSocket, PairSocket, PublisherSocket, PullSocket, PushSocket, RepSocket, ReqSocket,
        RespondentSocket, SubscriberSocket, SurveyorSocket,
    };
    pub use crossbar_core::error::{Error, Result};
    pub use crossbar_core::monitor::SocketEvent;
    pub use crossbar_core::msg::Msg;
    pub use crossbar_core::options::SocketOptions;
}
