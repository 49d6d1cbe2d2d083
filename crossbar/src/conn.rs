//! Connections and their worker pairs.
//!
//! One connection == one transport handle. Each owns a receiver thread and
//! a sender thread; the receiver feeds the socket-wide inbound queue, the
//! sender drains the connection's outbound queue. Dialed connections carry a
//! fixed peer; a listener's single handle is multiplexed (peer 0) and the
//! receiver resolves peers by source address.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use hashbrown::HashMap;
use tracing::{trace, warn};

use crossbar_core::deadline::{Deadline, POLL_INTERVAL};
use crossbar_core::error::{Error, Result};
use crossbar_core::monitor::{EventSender, SocketEvent, SocketStats};
use crossbar_core::msg::Msg;
use crossbar_core::peer::{PeerId, PeerRegistry};
use crossbar_core::pool::BufferPool;
use crossbar_core::transport::Driver;

use crate::task::ShutdownFlag;

/// Everything a worker thread needs from the owning socket.
#[derive(Clone)]
pub(crate) struct WorkerCtx {
    pub pool: Arc<BufferPool>,
    pub peers: Arc<PeerRegistry>,
    pub inbound: flume::Sender<Msg>,
    pub stats: Arc<SocketStats>,
    pub events: EventSender,
    /// Pattern-imposed bound on simultaneous peers (PAIR: 1).
    pub peer_cap: Option<usize>,
    /// Inbound datagrams above this are dropped.
    pub max_msg_size: usize,
    /// Socket-wide cancellation signal.
    pub shutdown: Arc<ShutdownFlag>,
}

/// One live transport handle bound into a socket.
pub(crate) struct Connection {
    pub id: u64,
    /// Fixed peer for dialed connections; 0 for the multiplexed listener.
    pub peer: PeerId,
    pub driver: Arc<dyn Driver>,
    pub outbound: flume::Sender<Msg>,
    stop: Arc<ShutdownFlag>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl Connection {
    /// Start the worker pair for `driver` and return the live connection.
    pub fn spawn(
        id: u64,
        driver: Arc<dyn Driver>,
        peer: PeerId,
        outbound: (flume::Sender<Msg>, flume::Receiver<Msg>),
        ctx: WorkerCtx,
        linger: Option<Duration>,
    ) -> Result<Arc<Self>> {
        let (outbound_tx, outbound_rx) = outbound;
        let conn = Arc::new(Self {
            id,
            peer,
            driver,
            outbound: outbound_tx,
            stop: ShutdownFlag::new(),
            workers: Mutex::new(Vec::with_capacity(2)),
            stopped: AtomicBool::new(false),
        });

        let recv_handle = {
            let conn = Arc::clone(&conn);
            let ctx = ctx.clone();
            std::thread::Builder::new()
                .name(format!("cb-recv-{id}"))
                .spawn(move || recv_loop(&conn, &ctx))
                .map_err(Error::from)?
        };
        let send_handle = {
            let conn = Arc::clone(&conn);
            std::thread::Builder::new()
                .name(format!("cb-send-{id}"))
                .spawn(move || send_loop(&conn, &outbound_rx, &ctx, linger))
                .map_err(Error::from)?
        };

        {
            let mut workers = conn
                .workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            workers.push(recv_handle);
            workers.push(send_handle);
        }
        Ok(conn)
    }

    /// Stop the worker pair, then close the transport. Idempotent.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.stop.raise();
        let handles = std::mem::take(
            &mut *self
                .workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for handle in handles {
            let _ = handle.join();
        }
        self.driver.close();
        trace!(conn = self.id, "connection stopped");
    }

    fn should_exit(&self, ctx: &WorkerCtx) -> bool {
        self.stop.is_raised() || ctx.shutdown.is_raised()
    }
}

/// Registry of a socket's live connections.
#[derive(Default)]
pub(crate) struct ConnRegistry {
    map: Mutex<HashMap<u64, Arc<Connection>>>,
    next: AtomicU64,
}

impl ConnRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next connection id.
    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn insert(&self, conn: Arc<Connection>) {
        self.lock().insert(conn.id, conn);
    }

    /// Stop a connection's workers, then drop the entry.
    pub fn unregister(&self, id: u64) -> bool {
        let conn = self.lock().get(&id).cloned();
        match conn {
            Some(conn) => {
                conn.stop();
                self.lock().remove(&id);
                true
            }
            None => false,
        }
    }

    /// Stop and remove every connection. Idempotent.
    pub fn close_all(&self) {
        let conns: Vec<_> = self.lock().drain().map(|(_, c)| c).collect();
        for conn in conns {
            conn.stop();
        }
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Arc<Connection>>> {
        self.map.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Receiver worker: kernel → inbound queue.
fn recv_loop(conn: &Connection, ctx: &WorkerCtx) {
    // The short read deadline is what makes shutdown observable.
    if let Err(e) = conn.driver.set_read_timeout(Some(POLL_INTERVAL)) {
        warn!(conn = conn.id, error = %e, "cannot arm read deadline; receiver exiting");
        return;
    }
    let max = conn.driver.max_payload();

    loop {
        if conn.should_exit(ctx) {
            break;
        }

        let mut buf = ctx.pool.get(max);
        buf.resize(max, 0);

        match conn.driver.recv(&mut buf) {
            Ok((n, src)) => {
                buf.truncate(n);

                let pid = if conn.peer != 0 {
                    conn.peer
                } else {
                    resolve_peer(conn, ctx, &src)
                };
                if pid == 0 {
                    // Admission refused; the datagram dies here.
                    ctx.pool.put(buf);
                    continue;
                }
                if n == 0 {
                    // Zero-length datagram: a dialer announcing itself.
                    // The admission above is its whole effect.
                    ctx.pool.put(buf);
                    continue;
                }
                if n > ctx.max_msg_size {
                    ctx.pool.put(buf);
                    ctx.stats.note_recv_error();
                    warn!(conn = conn.id, len = n, "dropping datagram above size ceiling");
                    continue;
                }
                ctx.peers.note_recv(pid);
                ctx.stats.note_recvd();

                let msg = Msg::from_recv(Arc::clone(&ctx.pool), buf, src, pid);
                if !enqueue_inbound(conn, ctx, msg) {
                    break;
                }
            }
            Err(e) => {
                ctx.pool.put(buf);
                if e.is_retriable() {
                    continue;
                }
                if e.is_closed() {
                    break;
                }
                ctx.stats.note_recv_error();
                warn!(conn = conn.id, error = %e, "receive error");
            }
        }
    }
    trace!(conn = conn.id, "receiver exiting");
}

/// Resolve (or admit) the peer behind `src` on a multiplexed connection.
///
/// Returns 0 when the source is turned away.
fn resolve_peer(conn: &Connection, ctx: &WorkerCtx, src: &crossbar_core::addr::Addr) -> PeerId {
    if let Some(peer) = ctx.peers.get_by_addr(src) {
        return peer.id;
    }

    if let Some(cap) = ctx.peer_cap {
        if ctx.peers.count() >= cap {
            ctx.stats.note_refused_peer();
            let _ = ctx.events.send(SocketEvent::PeerRefused(src.clone()));
            warn!(conn = conn.id, addr = %src, "refusing peer beyond pattern cap");
            return 0;
        }
    }

    let (pid, created) = ctx.peers.add(src.clone(), conn.outbound.clone());
    if created {
        let _ = ctx.events.send(SocketEvent::PeerConnected {
            peer: pid,
            addr: src.clone(),
        });
        trace!(conn = conn.id, peer = pid, addr = %src, "peer admitted");
    }
    pid
}

/// Blocking enqueue with shutdown observation. Returns false when the
/// worker should exit.
fn enqueue_inbound(conn: &Connection, ctx: &WorkerCtx, msg: Msg) -> bool {
    let mut pending = msg;
    loop {
        if conn.should_exit(ctx) {
            return false;
        }
        match ctx.inbound.send_timeout(pending, POLL_INTERVAL) {
            Ok(()) => return true,
            Err(flume::SendTimeoutError::Timeout(m)) => {
                // Queue full: back-pressure propagates into kernel buffers.
                pending = m;
            }
            Err(flume::SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}

/// Sender worker: outbound queue → kernel.
fn send_loop(
    conn: &Connection,
    outbound: &flume::Receiver<Msg>,
    ctx: &WorkerCtx,
    linger: Option<Duration>,
) {
    // A bounded write deadline keeps this thread joinable when kernel
    // buffers fill; full buffers retry until shutdown.
    let _ = conn.driver.set_write_timeout(Some(POLL_INTERVAL));

    loop {
        if conn.should_exit(ctx) {
            break;
        }
        match outbound.recv_timeout(POLL_INTERVAL) {
            Ok(msg) => send_one(conn, ctx, &msg),
            Err(flume::RecvTimeoutError::Timeout) => {}
            Err(flume::RecvTimeoutError::Disconnected) => {
                trace!(conn = conn.id, "sender exiting: outbound producers gone");
                return;
            }
        }
    }

    // Best-effort drain of what is already queued, bounded by linger.
    // Messages not yet enqueued are not waited for.
    let deadline = Deadline::after(linger);
    while !deadline.expired() {
        match outbound.try_recv() {
            Ok(msg) => send_one(conn, ctx, &msg),
            Err(_) => break,
        }
    }
    trace!(conn = conn.id, "sender exiting");
}

fn send_one(conn: &Connection, ctx: &WorkerCtx, msg: &Msg) {
    loop {
        let result = if conn.peer != 0 {
            conn.driver.send(msg.bytes())
        } else {
            match msg.addr() {
                Some(dst) => conn.driver.send_to(msg.bytes(), dst),
                None => Err(Error::InvalidAddress(
                    "outbound message without destination".to_string(),
                )),
            }
        };

        match result {
            Ok(_) => {
                ctx.stats.note_sent();
                if msg.peer() != 0 {
                    ctx.peers.note_send(msg.peer());
                }
                return;
            }
            Err(e) if e.is_timeout() => {
                // Kernel buffer full: back-pressure towards the peer.
                if conn.should_exit(ctx) {
                    return;
                }
            }
            Err(e) => {
                ctx.stats.note_send_error();
                if matches!(e.kind(), Error::ConnRefused) {
                    // Datagram sockets report peer death on send; retire it.
                    retire_peer(conn, ctx, msg);
                } else if !e.is_closed() {
                    warn!(conn = conn.id, error = %e, "send error; message dropped");
                }
                return;
            }
        }
    }
}

fn retire_peer(conn: &Connection, ctx: &WorkerCtx, msg: &Msg) {
    let removed = if conn.peer != 0 {
        ctx.peers
            .get(conn.peer)
            .map(|p| p.addr)
            .filter(|_| ctx.peers.remove(conn.peer))
            .map(|addr| (conn.peer, addr))
    } else {
        msg.addr().and_then(|dst| {
            ctx.peers
                .remove_by_addr(dst)
                .map(|pid| (pid, dst.clone()))
        })
    };

    if let Some((pid, addr)) = removed {
        trace!(conn = conn.id, peer = pid, %addr, "peer retired after refused send");
        let _ = ctx.events.send(SocketEvent::PeerDisconnected { peer: pid, addr });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crossbar_core::addr::Addr;
    use crossbar_core::transport::UdpDriver;

    fn test_ctx(peer_cap: Option<usize>) -> (WorkerCtx, flume::Receiver<Msg>) {
        let (inbound_tx, inbound_rx) = flume::bounded(16);
        let (events, _monitor) = crossbar_core::monitor::channel();
        let ctx = WorkerCtx {
            pool: Arc::new(BufferPool::new(2048)),
            peers: PeerRegistry::new(),
            inbound: inbound_tx,
            stats: Arc::new(SocketStats::default()),
            events,
            peer_cap,
            max_msg_size: 65_536,
            shutdown: ShutdownFlag::new(),
        };
        (ctx, inbound_rx)
    }

    #[test]
    fn test_worker_pair_roundtrip_and_unregister() {
        let listener =
            Arc::new(UdpDriver::bind("127.0.0.1:0".parse().unwrap()).unwrap());
        let Addr::Inet(listen_sa) = listener.local_addr().unwrap() else {
            unreachable!()
        };

        let (ctx, inbound_rx) = test_ctx(None);
        let conns = ConnRegistry::new();
        let id = conns.next_id();
        let (outbound_tx, outbound_rx) = flume::bounded(16);
        let conn = Connection::spawn(
            id,
            listener,
            0,
            (outbound_tx, outbound_rx),
            ctx.clone(),
            Some(Duration::from_millis(200)),
        )
        .unwrap();
        conns.insert(Arc::clone(&conn));

        let remote = UdpDriver::dial(listen_sa).unwrap();
        remote.send(b"hello").unwrap();

        let msg = inbound_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(msg.payload(), b"hello");
        assert_ne!(msg.peer(), 0);
        assert_eq!(ctx.peers.count(), 1);
        assert_eq!(ctx.stats.snapshot().msgs_recvd, 1);
        let src = msg.addr().unwrap().clone();

        // Route a reply back through the outbound queue.
        let mut reply = Msg::from_parts(Arc::clone(&ctx.pool), &[], b"world");
        reply.set_addr(src);
        conn.outbound.send(reply).unwrap();

        remote
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let mut buf = [0u8; 32];
        let (n, _) = remote.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"world");

        assert!(conns.unregister(id));
        assert_eq!(conns.count(), 0);
        assert!(!conns.unregister(id));
    }

    #[test]
    fn test_presence_datagram_admits_without_delivery() {
        let listener =
            Arc::new(UdpDriver::bind("127.0.0.1:0".parse().unwrap()).unwrap());
        let Addr::Inet(listen_sa) = listener.local_addr().unwrap() else {
            unreachable!()
        };

        let (ctx, inbound_rx) = test_ctx(None);
        let conns = ConnRegistry::new();
        let id = conns.next_id();
        let (outbound_tx, outbound_rx) = flume::bounded(16);
        let conn = Connection::spawn(
            id,
            listener,
            0,
            (outbound_tx, outbound_rx),
            ctx.clone(),
            None,
        )
        .unwrap();
        conns.insert(conn);

        let remote = UdpDriver::dial(listen_sa).unwrap();
        remote.send(b"").unwrap();

        // The peer appears but no message does.
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while ctx.peers.count() == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(ctx.peers.count(), 1);
        assert!(inbound_rx.recv_timeout(Duration::from_millis(50)).is_err());

        conns.close_all();
        assert_eq!(conns.count(), 0);
    }

    #[test]
    fn test_peer_cap_refuses_second_source() {
        let listener =
            Arc::new(UdpDriver::bind("127.0.0.1:0".parse().unwrap()).unwrap());
        let Addr::Inet(listen_sa) = listener.local_addr().unwrap() else {
            unreachable!()
        };

        let (ctx, inbound_rx) = test_ctx(Some(1));
        let conns = ConnRegistry::new();
        let id = conns.next_id();
        let (outbound_tx, outbound_rx) = flume::bounded(16);
        let conn = Connection::spawn(
            id,
            listener,
            0,
            (outbound_tx, outbound_rx),
            ctx.clone(),
            None,
        )
        .unwrap();
        conns.insert(conn);

        let first = UdpDriver::dial(listen_sa).unwrap();
        first.send(b"one").unwrap();
        let msg = inbound_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(msg.payload(), b"one");

        let second = UdpDriver::dial(listen_sa).unwrap();
        second.send(b"two").unwrap();

        // The second source is turned away: no message, no peer entry.
        assert!(inbound_rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(ctx.peers.count(), 1);
        assert!(ctx.stats.snapshot().refused_peers >= 1);

        conns.close_all();
    }
}
