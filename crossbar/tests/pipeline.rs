//! PUSH/PULL load balancing.

mod common;

use std::time::Duration;

use crossbar::prelude::*;

/// Nine sends over three always-ready workers land three-each, in exact
/// cyclic rotation (modulo the starting offset).
#[test]
fn round_robin_is_exactly_cyclic() {
    common::init_tracing();
    let addr = common::unix_addr("push-rr");

    let push = PushSocket::new().unwrap();
    push.listen(&addr).unwrap();

    let pulls: Vec<PullSocket> = (0..3)
        .map(|_| {
            let pull = PullSocket::new().unwrap();
            pull.dial_and_wait(&addr).unwrap();
            pull
        })
        .collect();

    assert!(common::wait_until(Duration::from_secs(2), || {
        push.peer_count() == 3
    }));

    for i in 0..9 {
        push.send(format!("t-{i}").as_bytes()).unwrap();
    }

    let mut per_pull_indices: Vec<Vec<u32>> = Vec::new();
    for pull in &pulls {
        let mut indices = Vec::new();
        for _ in 0..3 {
            let msg = pull.recv_timeout(Duration::from_secs(2)).unwrap();
            let text = String::from_utf8(msg.to_vec()).unwrap();
            let idx: u32 = text.strip_prefix("t-").unwrap().parse().unwrap();
            indices.push(idx);
        }
        // Nothing extra arrives.
        assert!(pull
            .recv_timeout(Duration::from_millis(100))
            .unwrap_err()
            .is_timeout());
        indices.sort_unstable();
        per_pull_indices.push(indices);
    }

    // Each worker got a single residue class mod 3: exact cyclic rotation.
    let mut residues: Vec<u32> = Vec::new();
    for indices in &per_pull_indices {
        let r = indices[0] % 3;
        assert!(indices.iter().all(|i| i % 3 == r), "not cyclic: {indices:?}");
        residues.push(r);
    }
    residues.sort_unstable();
    assert_eq!(residues, vec![0, 1, 2]);
}

/// Each message reaches exactly one worker.
#[test]
fn messages_are_never_duplicated() {
    common::init_tracing();
    let addr = common::unix_addr("push-once");

    let push = PushSocket::new().unwrap();
    push.listen(&addr).unwrap();

    let pull_a = PullSocket::new().unwrap();
    pull_a.dial_and_wait(&addr).unwrap();
    let pull_b = PullSocket::new().unwrap();
    pull_b.dial_and_wait(&addr).unwrap();

    assert!(common::wait_until(Duration::from_secs(2), || {
        push.peer_count() == 2
    }));

    for i in 0..10 {
        push.send(format!("job-{i}").as_bytes()).unwrap();
    }

    let mut seen = Vec::new();
    for pull in [&pull_a, &pull_b] {
        while let Ok(msg) = pull.recv_timeout(Duration::from_millis(300)) {
            seen.push(String::from_utf8(msg.to_vec()).unwrap());
        }
    }
    seen.sort();
    let expected: Vec<String> = (0..10).map(|i| format!("job-{i}")).collect();
    let mut expected = expected;
    expected.sort();
    assert_eq!(seen, expected);
}

#[test]
fn push_without_workers_blocks_until_timeout() {
    let push = PushSocket::new().unwrap();
    let err = push
        .send_timeout(b"nowhere", Duration::from_millis(50))
        .unwrap_err();
    assert!(err.is_timeout());
}

#[test]
fn wrong_directions_are_rejected() {
    let push = PushSocket::new().unwrap();
    assert!(matches!(push.recv(), Err(Error::NotSupported)));

    let pull = PullSocket::new().unwrap();
    assert!(matches!(pull.send(b"x"), Err(Error::NotSupported)));
}
