//! Trait-based socket API for polymorphic socket handling.
//!
//! Every pattern socket implements [`Socket`], which covers the lifecycle
//! surface shared by all patterns. Send and receive stay on the concrete
//! types because their shapes differ per pattern (one-way patterns reject a
//! direction outright).

use crossbar_core::addr::Addr;
use crossbar_core::error::Result;
use crossbar_core::monitor::{Monitor, StatsSnapshot};
use crossbar_core::pattern::Pattern;
use crossbar_core::pool::PoolStats;

/// Lifecycle surface common to every pattern socket.
pub trait Socket {
    /// The pattern this socket speaks.
    fn pattern(&self) -> Pattern;

    /// Bind the socket's single listener.
    fn listen(&self, addr: &str) -> Result<()>;

    /// Start a background dialer that retries with backoff.
    fn dial(&self, addr: &str) -> Result<()>;

    /// Dial synchronously, surfacing the first failure (or retrying until
    /// the configured dial deadline).
    fn dial_and_wait(&self, addr: &str) -> Result<()>;

    /// Close the socket: release blocked callers, stop every worker, free
    /// every descriptor. Safe to call repeatedly.
    fn close(&self) -> Result<()>;

    /// Local address of the listener, once one exists.
    fn local_addr(&self) -> Option<Addr>;

    /// Number of peers currently tracked by the socket.
    fn peer_count(&self) -> usize;

    /// Stream of lifecycle events.
    fn monitor(&self) -> Monitor;

    /// Socket counters.
    fn stats(&self) -> StatsSnapshot;

    /// Buffer pool counters.
    fn pool_stats(&self) -> PoolStats;
}

/// Generates the lifecycle plumbing every pattern socket shares.
///
/// The `guarded` arm skips the default `pre_dial` hook so the socket can
/// impose its own admission rule (PAIR refuses a dial while its slot is
/// occupied).
macro_rules! impl_socket_common {
    ($ty:ty, $pattern:expr) => {
        impl $ty {
            fn pre_dial(&self) -> crossbar_core::error::Result<()> {
                Ok(())
            }
        }
        crate::socket::impl_socket_common!(@body $ty, $pattern);
    };
    ($ty:ty, $pattern:expr, guarded) => {
        crate::socket::impl_socket_common!(@body $ty, $pattern);
    };
    (@body $ty:ty, $pattern:expr) => {
        impl crate::socket::Socket for $ty {
            fn pattern(&self) -> crossbar_core::pattern::Pattern {
                $pattern
            }

            fn listen(&self, addr: &str) -> crossbar_core::error::Result<()> {
                self.core.listen(addr)
            }

            fn dial(&self, addr: &str) -> crossbar_core::error::Result<()> {
                self.pre_dial()?;
                self.core.dial(addr)
            }

            fn dial_and_wait(&self, addr: &str) -> crossbar_core::error::Result<()> {
                self.pre_dial()?;
                self.core.dial_and_wait(addr)
            }

            fn close(&self) -> crossbar_core::error::Result<()> {
                self.core.close()
            }

            fn local_addr(&self) -> Option<crossbar_core::addr::Addr> {
                self.core.listen_addr()
            }

            fn peer_count(&self) -> usize {
                self.core.peers.count()
            }

            fn monitor(&self) -> crossbar_core::monitor::Monitor {
                self.core.monitor()
            }

            fn stats(&self) -> crossbar_core::monitor::StatsSnapshot {
                self.core.stats()
            }

            fn pool_stats(&self) -> crossbar_core::pool::PoolStats {
                self.core.pool_stats()
            }
        }

        impl Drop for $ty {
            fn drop(&mut self) {
                let _ = self.core.close();
            }
        }
    };
}

pub(crate) use impl_socket_common;
