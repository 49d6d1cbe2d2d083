//! Shared socket machinery.
//!
//! [`SocketCore`] owns everything a pattern socket needs besides its state
//! machine: options, buffer pool, peer and connection registries, the
//! socket-wide inbound queue, the listener slot, dialers, counters and the
//! close sequence. Pattern types wrap an `Arc<SocketCore>` and add their
//! protocol semantics on top.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, trace};

use crossbar_core::addr::Addr;
use crossbar_core::deadline::Deadline;
use crossbar_core::error::{Error, Result};
use crossbar_core::monitor::{self, EventSender, Monitor, SocketEvent, SocketStats, StatsSnapshot};
use crossbar_core::msg::Msg;
use crossbar_core::options::SocketOptions;
use crossbar_core::pattern::Pattern;
use crossbar_core::peer::{Peer, PeerRegistry};
use crossbar_core::pool::BufferPool;
use crossbar_core::reconnect::ReconnectState;
use crossbar_core::transport::{self, Driver};

use crate::conn::{ConnRegistry, Connection, WorkerCtx};
use crate::task::{sleep_interruptibly, ShutdownFlag, TaskGroup};

pub(crate) struct SocketCore {
    pattern: Pattern,
    opts: SocketOptions,
    pool: Arc<BufferPool>,
    pub(crate) peers: Arc<PeerRegistry>,
    conns: ConnRegistry,
    inbound_tx: flume::Sender<Msg>,
    inbound_rx: flume::Receiver<Msg>,
    pub(crate) shutdown: Arc<ShutdownFlag>,
    tasks: TaskGroup,
    listener: Mutex<Option<Arc<dyn Driver>>>,
    dialing: AtomicUsize,
    stats: Arc<SocketStats>,
    events: EventSender,
    monitor_rx: Monitor,
    closed: AtomicBool,
}

impl SocketCore {
    pub fn new(pattern: Pattern, opts: SocketOptions) -> Arc<Self> {
        let (inbound_tx, inbound_rx) = flume::bounded(opts.recv_queue_size);
        let (events, monitor_rx) = monitor::channel();
        // Buffers must hold a full transport datagram even when the
        // application ceiling is smaller.
        let pool = Arc::new(BufferPool::new(
            crossbar_core::pool::DEFAULT_BUF_CAPACITY.max(opts.max_msg_size),
        ));

        Arc::new(Self {
            pattern,
            opts,
            pool,
            peers: PeerRegistry::new(),
            conns: ConnRegistry::new(),
            inbound_tx,
            inbound_rx,
            shutdown: ShutdownFlag::new(),
            tasks: TaskGroup::new(),
            listener: Mutex::new(None),
            dialing: AtomicUsize::new(0),
            stats: Arc::new(SocketStats::default()),
            events,
            monitor_rx,
            closed: AtomicBool::new(false),
        })
    }

    // ---- accessors -------------------------------------------------------

    pub fn pattern(&self) -> Pattern {
        self.pattern
    }

    pub fn options(&self) -> &SocketOptions {
        &self.opts
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn pool_stats(&self) -> crossbar_core::pool::PoolStats {
        self.pool.stats()
    }

    pub fn monitor(&self) -> Monitor {
        self.monitor_rx.clone()
    }

    pub fn tasks(&self) -> &TaskGroup {
        &self.tasks
    }

    pub(crate) fn counters(&self) -> Arc<SocketStats> {
        Arc::clone(&self.stats)
    }

    pub fn inbound(&self) -> &flume::Receiver<Msg> {
        &self.inbound_rx
    }

    /// True while at least one dialer thread is still working.
    pub fn dial_pending(&self) -> bool {
        self.dialing.load(Ordering::Acquire) > 0
    }

    pub fn has_listener(&self) -> bool {
        self.listener_slot().is_some()
    }

    /// Local address of the listener, once one exists.
    pub fn listen_addr(&self) -> Option<Addr> {
        self.listener_slot().as_ref().and_then(|d| d.local_addr().ok())
    }

    pub fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) || self.shutdown.is_raised() {
            return Err(Error::Closed);
        }
        Ok(())
    }

    // ---- lifecycle -------------------------------------------------------

    /// Bind a listener. Datagram accept is synchronous: the bound handle is
    /// registered as one multiplexed connection serving every remote.
    pub fn listen(self: &Arc<Self>, addr: &str) -> Result<()> {
        self.ensure_open()?;
        let addr = Addr::parse(addr)?;

        let mut slot = self.listener_slot();
        if slot.is_some() {
            return Err(Error::AlreadyListening);
        }

        let driver =
            transport::bind(&addr).map_err(|e| e.context("listen", addr.to_string()))?;
        self.register_connection(Arc::clone(&driver), None)?;

        let local = driver.local_addr().unwrap_or(addr);
        *slot = Some(driver);
        debug!(pattern = %self.pattern, addr = %local, "listening");
        let _ = self.events.send(SocketEvent::Listening(local));
        Ok(())
    }

    /// Start a background dialer that retries with exponential backoff
    /// until it connects, the socket closes, or the address is hopeless.
    pub fn dial(self: &Arc<Self>, addr: &str) -> Result<()> {
        self.ensure_open()?;
        let addr = Addr::parse(addr)?;

        self.dialing.fetch_add(1, Ordering::AcqRel);
        let core = Arc::clone(self);
        let spawned = self.tasks.spawn("cb-dial", move || {
            dial_loop(&core, &addr);
            core.dialing.fetch_sub(1, Ordering::AcqRel);
        });
        if spawned.is_err() {
            self.dialing.fetch_sub(1, Ordering::AcqRel);
        }
        spawned
    }

    /// Dial synchronously. With a `dial_timeout` configured, failed attempts
    /// retry with backoff until the deadline; otherwise the first failure is
    /// surfaced.
    pub fn dial_and_wait(self: &Arc<Self>, addr: &str) -> Result<()> {
        self.ensure_open()?;
        let addr = Addr::parse(addr)?;
        let deadline = Deadline::after(self.opts.dial_timeout);
        let mut backoff = ReconnectState::new(&self.opts);

        loop {
            if self.shutdown.is_raised() {
                return Err(Error::Closed);
            }
            match self.attempt_dial(&addr) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    if self.opts.dial_timeout.is_none() || deadline.expired() {
                        return Err(e.context("dial", addr.to_string()));
                    }
                    let delay = backoff.next_delay().min(deadline.slice());
                    if sleep_interruptibly(&self.shutdown, delay) {
                        return Err(Error::Closed);
                    }
                }
            }
        }
    }

    /// One dial attempt: connect the driver and register the connection.
    pub(crate) fn attempt_dial(self: &Arc<Self>, addr: &Addr) -> Result<()> {
        let driver = transport::dial(addr)?;
        self.register_connection(driver, Some(addr.clone()))?;
        debug!(pattern = %self.pattern, %addr, "dialed");
        Ok(())
    }

    fn register_connection(
        self: &Arc<Self>,
        driver: Arc<dyn Driver>,
        peer_addr: Option<Addr>,
    ) -> Result<()> {
        let id = self.conns.next_id();
        let (tx, rx) = flume::bounded(self.opts.send_queue_size);

        let pid = match &peer_addr {
            Some(addr) => {
                let (pid, created) = self.peers.add(addr.clone(), tx.clone());
                if created {
                    let _ = self.events.send(SocketEvent::PeerConnected {
                        peer: pid,
                        addr: addr.clone(),
                    });
                }
                pid
            }
            None => 0,
        };

        match Connection::spawn(id, driver, pid, (tx, rx), self.worker_ctx(), self.opts.linger)
        {
            Ok(conn) => {
                if pid != 0 {
                    // Announce ourselves so the remote listener admits this
                    // peer before any pattern traffic flows.
                    let hello = Msg::from_parts(Arc::clone(&self.pool), &[], &[]);
                    let _ = conn.outbound.try_send(hello);
                }
                self.conns.insert(conn);
                // A close that raced this registration must not strand the
                // fresh worker pair.
                if self.shutdown.is_raised() {
                    self.conns.close_all();
                }
                Ok(())
            }
            Err(e) => {
                if pid != 0 {
                    self.peers.remove(pid);
                }
                Err(e)
            }
        }
    }

    /// First call runs the close sequence; later calls are no-ops.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        trace!(pattern = %self.pattern, "closing socket");

        self.shutdown.raise();
        if let Some(listener) = self.listener_slot().take() {
            listener.close();
        }
        self.conns.close_all();
        self.tasks.join_all();
        let _ = self.events.send(SocketEvent::Closed);
        debug!(pattern = %self.pattern, "socket closed");
        Ok(())
    }

    // ---- engine helpers --------------------------------------------------

    pub(crate) fn worker_ctx(&self) -> WorkerCtx {
        WorkerCtx {
            pool: Arc::clone(&self.pool),
            peers: Arc::clone(&self.peers),
            inbound: self.inbound_tx.clone(),
            stats: Arc::clone(&self.stats),
            events: self.events.clone(),
            peer_cap: self.pattern.peer_cap(),
            max_msg_size: self.opts.max_msg_size,
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    /// Effective deadline for a send.
    pub fn send_deadline(&self, explicit: Option<std::time::Duration>) -> Deadline {
        Deadline::after(explicit.or(self.opts.send_timeout))
    }

    /// Effective deadline for a receive.
    pub fn recv_deadline(&self, explicit: Option<std::time::Duration>) -> Deadline {
        Deadline::after(explicit.or(self.opts.recv_timeout))
    }

    /// Build an outbound message, enforcing the configured payload ceiling.
    pub fn make_msg(&self, header: &[u8], payload: &[u8]) -> Result<Msg> {
        if payload.len() > self.opts.max_msg_size {
            return Err(Error::MessageTooLarge {
                size: payload.len(),
                max: self.opts.max_msg_size,
            });
        }
        Ok(Msg::from_parts(Arc::clone(&self.pool), header, payload))
    }

    /// Next message from any connection, honoring `deadline` and shutdown.
    pub fn recv_inbound(&self, deadline: Deadline) -> Result<Msg> {
        loop {
            if self.shutdown.is_raised() {
                return Err(Error::Closed);
            }
            match self.inbound_rx.recv_timeout(deadline.slice()) {
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

    /// Blocking enqueue to one peer's outbound queue.
    ///
    /// Back-pressure: waits while the queue is full. Fails with `Timeout` on
    /// deadline, `Closed` on shutdown, `NoPeer` when the connection behind
    /// the peer has gone away.
    pub fn route_to_peer(&self, peer: &Peer, mut msg: Msg, deadline: Deadline) -> Result<()> {
        msg.set_addr(peer.addr.clone());
        msg.set_peer(peer.id);
        loop {
            if self.shutdown.is_raised() {
                return Err(Error::Closed);
            }
            match peer.outbound.send_timeout(msg, deadline.slice()) {
                Ok(()) => return Ok(()),
                Err(flume::SendTimeoutError::Timeout(m)) => {
                    if deadline.expired() {
                        return Err(Error::Timeout);
                    }
                    msg = m;
                }
                Err(flume::SendTimeoutError::Disconnected(_)) => return Err(Error::NoPeer),
            }
        }
    }

    /// Non-blocking enqueue for broadcast paths: a full queue drops the
    /// message for that peer only.
    pub fn try_route(&self, peer: &Peer, mut msg: Msg) -> bool {
        msg.set_addr(peer.addr.clone());
        msg.set_peer(peer.id);
        match peer.outbound.try_send(msg) {
            Ok(()) => true,
            Err(_) => {
                self.stats.note_dropped_full();
                false
            }
        }
    }

    fn listener_slot(&self) -> std::sync::MutexGuard<'_, Option<Arc<dyn Driver>>> {
        self.listener.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SocketCore {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn dial_loop(core: &Arc<SocketCore>, addr: &Addr) {
    let mut backoff = ReconnectState::new(&core.opts);
    loop {
        if core.shutdown.is_raised() {
            return;
        }
        match core.attempt_dial(addr) {
            Ok(()) => return,
            Err(e) => {
                trace!(%addr, error = %e, attempt = backoff.attempt(), "dial attempt failed");
                let _ = core.events.send(SocketEvent::DialFailed {
                    addr: addr.clone(),
                    reason: e.to_string(),
                });
                if sleep_interruptibly(&core.shutdown, backoff.next_delay()) {
                    return;
                }
            }
        }
    }
}
