//! Peer tracking.
//!
//! One [`Peer`] entry per live remote, indexed both by identifier and by
//! address. Identifiers are strictly increasing within a socket and never
//! reused while the socket lives.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::addr::Addr;
use crate::msg::Msg;

/// Opaque peer identifier, unique within one socket. Zero means "none".
pub type PeerId = u64;

/// Connection state of a peer entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
}

/// One connected remote.
#[derive(Debug, Clone)]
pub struct Peer {
    pub id: PeerId,
    pub addr: Addr,
    pub state: PeerState,
    /// Outbound queue endpoint of the connection that reaches this peer.
    pub outbound: flume::Sender<Msg>,
    pub connected_at: Instant,
    pub last_seen: Instant,
    pub msgs_in: u64,
    pub msgs_out: u64,
}

#[derive(Debug, Default)]
struct Table {
    by_id: HashMap<PeerId, Peer>,
    by_addr: HashMap<Addr, PeerId>,
    next_id: PeerId,
}

/// Registry of peers for one socket.
///
/// Writes take the exclusive lock; reads share it. `all` clones the entries
/// out so iteration never holds the lock.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    table: RwLock<Table>,
}

impl PeerRegistry {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add a peer for `addr`, or return the existing entry's id.
    ///
    /// Returns `(id, true)` when a new entry was created.
    pub fn add(&self, addr: Addr, outbound: flume::Sender<Msg>) -> (PeerId, bool) {
        let mut table = self.write();
        if let Some(&id) = table.by_addr.get(&addr) {
            return (id, false);
        }

        table.next_id += 1;
        let id = table.next_id;
        let now = Instant::now();
        let peer = Peer {
            id,
            addr: addr.clone(),
            state: PeerState::Connected,
            outbound,
            connected_at: now,
            last_seen: now,
            msgs_in: 0,
            msgs_out: 0,
        };
        table.by_id.insert(id, peer);
        table.by_addr.insert(addr, id);
        (id, true)
    }

    /// Remove a peer. The entry transitions to `Disconnected` before it is
    /// dropped. Returns false when the id was not present.
    pub fn remove(&self, id: PeerId) -> bool {
        let mut table = self.write();
        match table.by_id.remove(&id) {
            Some(mut peer) => {
                peer.state = PeerState::Disconnected;
                table.by_addr.remove(&peer.addr);
                true
            }
            None => false,
        }
    }

    /// Remove the peer registered under `addr`, returning its id.
    pub fn remove_by_addr(&self, addr: &Addr) -> Option<PeerId> {
        let id = {
            let table = self.read();
            table.by_addr.get(addr).copied()
        }?;
        self.remove(id).then_some(id)
    }

    /// Look up a peer by id (cloned snapshot).
    #[must_use]
    pub fn get(&self, id: PeerId) -> Option<Peer> {
        self.read().by_id.get(&id).cloned()
    }

    /// Look up a peer by address (cloned snapshot).
    #[must_use]
    pub fn get_by_addr(&self, addr: &Addr) -> Option<Peer> {
        let table = self.read();
        let id = table.by_addr.get(addr)?;
        table.by_id.get(id).cloned()
    }

    /// Snapshot of every peer, decoupled from the table.
    #[must_use]
    pub fn all(&self) -> Vec<Peer> {
        self.read().by_id.values().cloned().collect()
    }

    /// Snapshot of peers in the `Connected` state, ordered by id so
    /// round-robin cursors see a stable rotation.
    #[must_use]
    pub fn connected(&self) -> SmallVec<[Peer; 8]> {
        let mut peers: SmallVec<[Peer; 8]> = self
            .read()
            .by_id
            .values()
            .filter(|p| p.state == PeerState::Connected)
            .cloned()
            .collect();
        peers.sort_unstable_by_key(|p| p.id);
        peers
    }

    /// Number of live entries.
    #[must_use]
    pub fn count(&self) -> usize {
        self.read().by_id.len()
    }

    /// Visit peers until `f` returns false.
    pub fn range<F: FnMut(&Peer) -> bool>(&self, mut f: F) {
        let table = self.read();
        for peer in table.by_id.values() {
            if !f(peer) {
                break;
            }
        }
    }

    /// Update a peer's `last_seen` stamp and inbound counter.
    pub fn note_recv(&self, id: PeerId) {
        if let Some(peer) = self.write().by_id.get_mut(&id) {
            peer.last_seen = Instant::now();
            peer.msgs_in += 1;
        }
    }

    /// Update a peer's outbound counter.
    pub fn note_send(&self, id: PeerId) {
        if let Some(peer) = self.write().by_id.get_mut(&id) {
            peer.msgs_out += 1;
        }
    }

    /// Change a peer's state.
    pub fn set_state(&self, id: PeerId, state: PeerState) {
        if let Some(peer) = self.write().by_id.get_mut(&id) {
            peer.state = state;
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Table> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Table> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u16) -> Addr {
        Addr::parse(&format!("ip://127.0.0.1:{n}")).unwrap()
    }

    fn chan() -> flume::Sender<Msg> {
        flume::bounded(1).0
    }

    #[test]
    fn test_ids_strictly_increase() {
        let reg = PeerRegistry::new();
        let (a, _) = reg.add(addr(1), chan());
        let (b, _) = reg.add(addr(2), chan());
        assert!(b > a);
        assert_ne!(a, 0);

        // Removal does not recycle ids.
        assert!(reg.remove(b));
        let (c, _) = reg.add(addr(3), chan());
        assert!(c > b);
    }

    #[test]
    fn test_add_is_idempotent_per_addr() {
        let reg = PeerRegistry::new();
        let (a, created) = reg.add(addr(1), chan());
        assert!(created);
        let (b, created) = reg.add(addr(1), chan());
        assert!(!created);
        assert_eq!(a, b);
        assert_eq!(reg.count(), 1);
    }

    #[test]
    fn test_indices_stay_consistent() {
        let reg = PeerRegistry::new();
        let (id, _) = reg.add(addr(7), chan());
        assert_eq!(reg.get_by_addr(&addr(7)).unwrap().id, id);

        assert!(reg.remove(id));
        assert!(reg.get(id).is_none());
        assert!(reg.get_by_addr(&addr(7)).is_none());
        assert!(!reg.remove(id));
    }

    #[test]
    fn test_remove_by_addr() {
        let reg = PeerRegistry::new();
        let (id, _) = reg.add(addr(9), chan());
        assert_eq!(reg.remove_by_addr(&addr(9)), Some(id));
        assert_eq!(reg.remove_by_addr(&addr(9)), None);
    }

    #[test]
    fn test_connected_snapshot_sorted() {
        let reg = PeerRegistry::new();
        for n in 1..=5 {
            reg.add(addr(n), chan());
        }
        reg.set_state(3, PeerState::Disconnecting);

        let snap = reg.connected();
        assert_eq!(snap.len(), 4);
        assert!(snap.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[test]
    fn test_range_early_exit() {
        let reg = PeerRegistry::new();
        for n in 1..=10 {
            reg.add(addr(n), chan());
        }
        let mut seen = 0;
        reg.range(|_| {
            seen += 1;
            seen < 3
        });
        assert_eq!(seen, 3);
    }
}
