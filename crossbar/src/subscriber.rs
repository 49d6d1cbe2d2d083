//! SUB socket: prefix-filtering subscriber.
//!
//! A filter thread moves matching payloads from the inbound queue into a
//! bounded filtered queue; `recv` reads the filtered side. Matching is
//! binary-safe byte-prefix comparison, and the empty prefix matches every
//! payload. With no subscriptions registered, nothing is delivered.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use bytes::Bytes;
use tracing::trace;

use crossbar_core::deadline::POLL_INTERVAL;
use crossbar_core::error::{Error, Result};
use crossbar_core::msg::Msg;
use crossbar_core::options::SocketOptions;
use crossbar_core::pattern::Pattern;

use crate::base::SocketCore;
use crate::socket::impl_socket_common;

/// SUB socket.
pub struct SubscriberSocket {
    core: Arc<SocketCore>,
    subs: Arc<RwLock<Vec<Bytes>>>,
    filtered_rx: flume::Receiver<Msg>,
}

impl SubscriberSocket {
    /// Create a SUB socket with default options.
    pub fn new() -> Result<Self> {
        Self::with_options(SocketOptions::default())
    }

    /// Create a SUB socket with explicit options.
    pub fn with_options(options: SocketOptions) -> Result<Self> {
        let queue_bound = options.recv_queue_size;
        let drop_oldest = options.sub_drop_oldest;
        let core = SocketCore::new(Pattern::Sub, options);
        let subs: Arc<RwLock<Vec<Bytes>>> = Arc::new(RwLock::new(Vec::new()));
        let (filtered_tx, filtered_rx) = flume::bounded(queue_bound);

        {
            let filter_core = Arc::clone(&core);
            let filter_subs = Arc::clone(&subs);
            let evict_rx = filtered_rx.clone();
            core.tasks().spawn("cb-sub-filter", move || {
                filter_loop(&filter_core, &filter_subs, &filtered_tx, &evict_rx, drop_oldest);
            })?;
        }

        Ok(Self {
            core,
            subs,
            filtered_rx,
        })
    }

    /// Register a byte-prefix subscription.
    ///
    /// The prefix is copied; the empty prefix subscribes to everything.
    /// Registering a duplicate is a silent no-op.
    pub fn subscribe(&self, prefix: &[u8]) -> Result<()> {
        self.core.ensure_open()?;
        let mut subs = self.write_subs();
        if !subs.iter().any(|p| p == prefix) {
            subs.push(Bytes::copy_from_slice(prefix));
            trace!(prefix = ?prefix, "subscribed");
        }
        Ok(())
    }

    /// Remove a previously registered prefix.
    ///
    /// Fails with `NotFound` when the prefix was never registered.
    pub fn unsubscribe(&self, prefix: &[u8]) -> Result<()> {
        self.core.ensure_open()?;
        let mut subs = self.write_subs();
        match subs.iter().position(|p| p == prefix) {
            Some(idx) => {
                subs.remove(idx);
                trace!(prefix = ?prefix, "unsubscribed");
                Ok(())
            }
            None => Err(Error::NotFound),
        }
    }

    /// Number of registered subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Receive the next payload matching a subscription.
    pub fn recv(&self) -> Result<Msg> {
        self.recv_inner(None)
    }

    /// Receive with an explicit deadline instead of the socket default.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Msg> {
        self.recv_inner(Some(timeout))
    }

    /// SUB sockets are receive-only.
    pub fn send(&self, _payload: &[u8]) -> Result<()> {
        Err(Error::NotSupported)
    }

    /// SUB sockets are receive-only.
    pub fn send_timeout(&self, _payload: &[u8], _timeout: Duration) -> Result<()> {
        Err(Error::NotSupported)
    }

    fn recv_inner(&self, timeout: Option<Duration>) -> Result<Msg> {
        self.core.ensure_open()?;
        let deadline = self.core.recv_deadline(timeout);

        loop {
            if self.core.shutdown.is_raised() {
                return Err(Error::Closed);
            }
            match self.filtered_rx.recv_timeout(deadline.slice()) {
                Ok(msg) => return Ok(msg),
                Err(flume::RecvTimeoutError::Timeout) => {
                    if deadline.expired() {
                        return Err(Error::Timeout);
                    }
                }
                Err(flume::RecvTimeoutError::Disconnected) => return Err(Error::Closed),
            }
        }
    }

    fn write_subs(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Bytes>> {
        self.subs.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl_socket_common!(SubscriberSocket, Pattern::Sub);

/// True when some registered prefix is empty or is a byte-prefix of
/// `payload`. No subscriptions means nothing matches.
fn matches(subs: &[Bytes], payload: &[u8]) -> bool {
    subs.iter().any(|prefix| payload.starts_with(prefix))
}

/// Engine-internal task: inbound queue → filtered queue.
fn filter_loop(
    core: &Arc<SocketCore>,
    subs: &RwLock<Vec<Bytes>>,
    filtered_tx: &flume::Sender<Msg>,
    evict_rx: &flume::Receiver<Msg>,
    drop_oldest: bool,
) {
    let stats = core.counters();
    loop {
        if core.shutdown.is_raised() {
            break;
        }
        let msg = match core.inbound().recv_timeout(POLL_INTERVAL) {
            Ok(msg) => msg,
            Err(flume::RecvTimeoutError::Timeout) => continue,
            Err(flume::RecvTimeoutError::Disconnected) => break,
        };

        let matched = {
            let subs = subs.read().unwrap_or_else(PoisonError::into_inner);
            matches(&subs, msg.payload())
        };
        if !matched {
            // Non-matching payloads are released here.
            continue;
        }

        match filtered_tx.try_send(msg) {
            Ok(()) => {}
            Err(flume::TrySendError::Full(msg)) => {
                stats.note_dropped_full();
                if drop_oldest {
                    let _ = evict_rx.try_recv();
                    let _ = filtered_tx.try_send(msg);
                }
                // Reject-new policy: the fresh message is released instead.
            }
            Err(flume::TrySendError::Disconnected(_)) => break,
        }
    }
    trace!("subscriber filter exiting");
}
