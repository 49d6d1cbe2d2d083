//! The unit of transfer: one datagram with routing metadata.
//!
//! A [`Msg`] owns a pooled buffer holding protocol header bytes (if any)
//! followed by the payload. Dropping the message returns the buffer to its
//! pool; ownership passes hand to hand from receiver thread to engine to
//! application (or engine to sender thread) and is never shared.

use std::sync::Arc;

use bytes::{BufMut, BytesMut};

use crate::addr::Addr;
use crate::peer::PeerId;
use crate::pool::BufferPool;

/// One complete datagram plus routing metadata.
#[derive(Debug)]
pub struct Msg {
    buf: Option<BytesMut>,
    header_len: usize,
    addr: Option<Addr>,
    peer: PeerId,
    pool: Arc<BufferPool>,
}

impl Msg {
    /// Build an outbound message from header and payload slices.
    ///
    /// The buffer comes from `pool` and is returned there on drop.
    #[must_use]
    pub fn from_parts(pool: Arc<BufferPool>, header: &[u8], payload: &[u8]) -> Self {
        let mut buf = pool.get(header.len() + payload.len());
        buf.put_slice(header);
        buf.put_slice(payload);
        Self {
            buf: Some(buf),
            header_len: header.len(),
            addr: None,
            peer: 0,
            pool,
        }
    }

    /// Wrap a buffer filled by a receiver thread.
    ///
    /// The header split is unknown at this point; the engine that parses the
    /// datagram calls [`Msg::set_header_len`].
    #[must_use]
    pub fn from_recv(pool: Arc<BufferPool>, buf: BytesMut, src: Addr, peer: PeerId) -> Self {
        Self {
            buf: Some(buf),
            header_len: 0,
            addr: Some(src),
            peer,
            pool,
        }
    }

    /// The full datagram: header bytes followed by payload.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }

    /// The protocol header bytes (empty for header-less patterns).
    #[must_use]
    pub fn header(&self) -> &[u8] {
        &self.bytes()[..self.header_len]
    }

    /// The application payload.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.bytes()[self.header_len..]
    }

    /// Total datagram length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    /// True when the datagram is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }

    /// Record where the header ends after parsing an inbound datagram.
    ///
    /// `header_len` must not exceed the datagram length.
    pub fn set_header_len(&mut self, header_len: usize) {
        debug_assert!(header_len <= self.len());
        self.header_len = header_len.min(self.len());
    }

    /// Source (inbound) or destination (outbound) address, when known.
    #[must_use]
    pub fn addr(&self) -> Option<&Addr> {
        self.addr.as_ref()
    }

    /// Set the destination address for routing by a sender thread.
    pub fn set_addr(&mut self, addr: Addr) {
        self.addr = Some(addr);
    }

    /// Internal peer identifier (0 = unknown).
    #[must_use]
    pub const fn peer(&self) -> PeerId {
        self.peer
    }

    /// Record the peer this message belongs to.
    pub fn set_peer(&mut self, peer: PeerId) {
        self.peer = peer;
    }

    /// An independently owned copy backed by a fresh pool buffer.
    ///
    /// Routing metadata is not carried over; the copy is re-routed by
    /// whoever enqueues it.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        let mut buf = self.pool.get(self.len());
        buf.put_slice(self.bytes());
        Self {
            buf: Some(buf),
            header_len: self.header_len,
            addr: None,
            peer: 0,
            pool: Arc::clone(&self.pool),
        }
    }

    /// Copy the payload into an owned `Vec`.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.payload().to_vec()
    }
}

impl Drop for Msg {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.put(buf);
        }
    }
}
