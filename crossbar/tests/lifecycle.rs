//! Close semantics and leak discipline.

mod common;

use std::time::Duration;

use crossbar::prelude::*;

#[cfg(target_os = "linux")]
fn live_thread_count() -> usize {
    let status = std::fs::read_to_string("/proc/self/status").unwrap();
    status
        .lines()
        .find_map(|line| line.strip_prefix("Threads:"))
        .and_then(|v| v.trim().parse().ok())
        .unwrap()
}

#[test]
fn close_is_idempotent() {
    let socket = BusSocket::new().unwrap();
    socket.close().unwrap();
    socket.close().unwrap();
    assert!(socket.send(b"x").unwrap_err().is_closed());
}

#[test]
fn close_releases_every_surface() {
    let addr = common::unix_addr("lc-surfaces");

    let rep = RepSocket::new().unwrap();
    rep.listen(&addr).unwrap();
    rep.close().unwrap();

    assert!(rep.recv().unwrap_err().is_closed());
    assert!(rep.send(b"x").unwrap_err().is_closed());
    assert!(rep.listen(&addr).unwrap_err().is_closed());
    assert!(rep.dial(&addr).unwrap_err().is_closed());
}

/// The listener's filesystem entry disappears with the socket.
#[test]
fn unix_listener_cleans_up_its_path() {
    let addr = common::unix_addr("lc-cleanup");
    let path = addr.strip_prefix("unix://").unwrap().to_string();

    let pull = PullSocket::new().unwrap();
    pull.listen(&addr).unwrap();
    assert!(std::path::Path::new(&path).exists());

    pull.close().unwrap();
    assert!(!std::path::Path::new(&path).exists());
}

/// Open-use-close cycles leave no threads behind.
#[cfg(target_os = "linux")]
#[test]
fn repeated_open_close_leaks_nothing() {
    common::init_tracing();

    // Warm up allocator-side threads before baselining.
    for _ in 0..2 {
        run_cycle();
    }
    let before = live_thread_count();

    for _ in 0..30 {
        run_cycle();
    }

    // Give detached teardown a moment to settle.
    std::thread::sleep(Duration::from_millis(300));
    let after = live_thread_count();
    assert!(
        after as i64 - before as i64 <= 5,
        "thread leak: {before} -> {after}"
    );
}

#[cfg(target_os = "linux")]
fn run_cycle() {
    let addr = common::unix_addr("lc-cycle");

    let rep = RepSocket::new().unwrap();
    rep.listen(&addr).unwrap();

    let req = ReqSocket::new().unwrap();
    req.dial_and_wait(&addr).unwrap();

    req.send(b"once").unwrap();
    let request = rep.recv_timeout(Duration::from_secs(2)).unwrap();
    rep.send(request.payload()).unwrap();
    let reply = req.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(reply.payload(), b"once");

    req.close().unwrap();
    rep.close().unwrap();
}

/// Listening twice on one socket is refused.
#[test]
fn second_listener_is_rejected() {
    let socket = PullSocket::new().unwrap();
    socket.listen(&common::unix_addr("lc-one")).unwrap();
    let err = socket.listen(&common::unix_addr("lc-two")).unwrap_err();
    assert!(matches!(err, Error::AlreadyListening));
}

/// Oversized payloads are rejected at send, before any syscall.
#[test]
fn max_message_size_enforced_at_send() {
    let opts = SocketOptions::default().with_max_msg_size(1024);
    let addr = common::unix_addr("lc-maxsize");

    let bus = BusSocket::with_options(opts).unwrap();
    bus.listen(&addr).unwrap();

    let other = BusSocket::new().unwrap();
    other.dial_and_wait(&addr).unwrap();
    assert!(common::wait_until(Duration::from_secs(2), || {
        bus.peer_count() == 1
    }));

    let big = vec![0u8; 2048];
    assert!(matches!(
        bus.send(&big),
        Err(Error::MessageTooLarge { size: 2048, max: 1024 })
    ));
}

/// Every pooled buffer handed out comes back: after a full exchange and
/// close, gets balance against puts (plus oversized discards).
#[test]
fn buffer_pool_balances_after_close() {
    let addr = common::unix_addr("lc-pool");

    let rep = RepSocket::new().unwrap();
    rep.listen(&addr).unwrap();

    let req = ReqSocket::new().unwrap();
    req.dial_and_wait(&addr).unwrap();

    req.send(b"accounted").unwrap();
    let request = rep.recv_timeout(Duration::from_secs(2)).unwrap();
    rep.send(request.payload()).unwrap();
    drop(request);
    let reply = req.recv_timeout(Duration::from_secs(2)).unwrap();
    drop(reply);

    req.close().unwrap();
    rep.close().unwrap();

    let sockets: [&dyn Socket; 2] = [&req, &rep];
    for socket in sockets {
        let stats = socket.pool_stats();
        assert_eq!(
            stats.gets,
            stats.puts + stats.oversized,
            "pool imbalance: {stats:?}"
        );
    }
}

/// Monitor events narrate the socket lifecycle.
#[test]
fn monitor_reports_listening_and_peers() {
    let addr = common::unix_addr("lc-monitor");

    let bus = BusSocket::new().unwrap();
    let monitor = bus.monitor();
    bus.listen(&addr).unwrap();

    let other = BusSocket::new().unwrap();
    other.dial_and_wait(&addr).unwrap();

    let first = monitor.recv_timeout(Duration::from_secs(2)).unwrap();
    assert!(matches!(first, SocketEvent::Listening(_)));

    let second = monitor.recv_timeout(Duration::from_secs(2)).unwrap();
    assert!(matches!(second, SocketEvent::PeerConnected { .. }));
}
