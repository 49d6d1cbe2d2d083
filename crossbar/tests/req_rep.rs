//! Request/reply round trips, correlation, and close behavior.

mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbar::prelude::*;

#[test]
fn echo_100_roundtrips_over_unix() {
    common::init_tracing();
    let addr = common::unix_addr("rep-echo");

    let rep = RepSocket::new().unwrap();
    rep.listen(&addr).unwrap();

    let server = thread::spawn(move || {
        for _ in 0..100 {
            let request = rep.recv().unwrap();
            let mut reply = b"echo:".to_vec();
            reply.extend_from_slice(request.payload());
            rep.send(&reply).unwrap();
        }
    });

    let req = ReqSocket::new().unwrap();
    req.dial_and_wait(&addr).unwrap();

    for i in 0..100 {
        let payload = format!("msg-{i}");
        req.send(payload.as_bytes()).unwrap();
        let reply = req.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(reply.payload(), format!("echo:msg-{i}").as_bytes());
    }

    server.join().unwrap();
}

#[test]
fn echo_roundtrip_over_udp() {
    common::init_tracing();

    let rep = RepSocket::new().unwrap();
    rep.listen("ip://127.0.0.1:0").unwrap();
    let addr = rep.local_addr().unwrap().to_string();

    let server = thread::spawn(move || {
        let request = rep.recv().unwrap();
        assert_eq!(request.payload(), b"over-udp");
        rep.send(b"ack").unwrap();
    });

    let req = ReqSocket::new().unwrap();
    req.dial_and_wait(&addr).unwrap();
    req.send(b"over-udp").unwrap();
    let reply = req.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(reply.payload(), b"ack");

    server.join().unwrap();
}

/// A second send replaces the outstanding request; the reply to the first
/// one is discarded as stale.
#[test]
fn stale_reply_is_discarded() {
    common::init_tracing();
    let addr = common::unix_addr("rep-stale");

    let rep = RepSocket::new().unwrap();
    rep.listen(&addr).unwrap();

    let req = ReqSocket::new().unwrap();
    req.dial_and_wait(&addr).unwrap();

    // First request reaches the replier.
    req.send(b"first").unwrap();
    let first = rep.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(first.payload(), b"first");

    // Replace it before the replier answers.
    req.send(b"second").unwrap();

    // The replier answers the first (now stale), then the second.
    rep.send(b"reply-to-first").unwrap();
    let second = rep.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(second.payload(), b"second");
    rep.send(b"reply-to-second").unwrap();

    let reply = req.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(reply.payload(), b"reply-to-second");
}

#[test]
fn pending_recv_released_on_close() {
    common::init_tracing();
    let addr = common::unix_addr("rep-close");

    let rep = RepSocket::new().unwrap();
    rep.listen(&addr).unwrap();

    let req = Arc::new(ReqSocket::new().unwrap());
    req.dial_and_wait(&addr).unwrap();
    req.send(b"unanswered").unwrap();

    let waiter = {
        let req = Arc::clone(&req);
        thread::spawn(move || req.recv().unwrap_err())
    };

    thread::sleep(Duration::from_millis(100));
    req.close().unwrap();

    let err = waiter.join().unwrap();
    assert!(err.is_closed());
}

/// With a dial still pending, send waits for the peer instead of failing
/// with `NoPeer`.
#[test]
fn send_blocks_until_pending_dial_connects() {
    common::init_tracing();
    let addr = common::unix_addr("rep-late-bind");

    let req = ReqSocket::new().unwrap();
    // Background dialer: the listener does not exist yet, so the first
    // attempts fail and back off.
    req.dial(&addr).unwrap();

    let rep = RepSocket::new().unwrap();
    let addr_for_server = addr.clone();
    let server = thread::spawn(move || {
        thread::sleep(Duration::from_millis(300));
        rep.listen(&addr_for_server).unwrap();
        let request = rep.recv().unwrap();
        rep.send(request.payload()).unwrap();
    });

    // Blocks across the late bind, then completes.
    req.send_timeout(b"patience", Duration::from_secs(10)).unwrap();
    let reply = req.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(reply.payload(), b"patience");

    server.join().unwrap();
}

#[test]
fn automatic_resend_recovers_a_lost_request() {
    common::init_tracing();
    let addr = common::unix_addr("rep-resend");

    // Replier that ignores the first request and answers the second copy.
    let rep = RepSocket::new().unwrap();
    rep.listen(&addr).unwrap();

    let server = thread::spawn(move || {
        let first = rep.recv().unwrap();
        assert_eq!(first.payload(), b"retry-me");
        // Drop it on the floor; the resend arrives as a fresh request.
        let second = rep.recv().unwrap();
        assert_eq!(second.payload(), b"retry-me");
        rep.send(b"finally").unwrap();
    });

    let opts = SocketOptions::default().with_req_resend_ivl(Duration::from_millis(100));
    let req = ReqSocket::with_options(opts).unwrap();
    req.dial_and_wait(&addr).unwrap();

    req.send(b"retry-me").unwrap();
    let reply = req.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(reply.payload(), b"finally");

    server.join().unwrap();
}
