//! Reusable datagram buffer pool.
//!
//! Receiver threads and engines acquire a buffer per datagram; dropping a
//! [`crate::msg::Msg`] returns the buffer here. Buffers above the pooling
//! ceiling are discarded on return rather than kept alive.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use bytes::BytesMut;

/// Default buffer capacity: one maximum-size datagram.
pub const DEFAULT_BUF_CAPACITY: usize = 65_536;

/// Default shelf depth before returned buffers are discarded.
pub const DEFAULT_MAX_BUFFERS: usize = 64;

/// Pool of reusable byte buffers.
///
/// `get` pops a pooled buffer when one with enough capacity is available and
/// allocates otherwise; `put` returns a buffer for reuse. All counters are
/// relaxed atomics; they are monotonic and never block the hot path.
#[derive(Debug)]
pub struct BufferPool {
    shelf: Mutex<Vec<BytesMut>>,
    /// Capacity used for fresh allocations.
    buf_capacity: usize,
    /// Buffers that grew beyond this are not pooled on `put`.
    max_pooled: usize,
    /// Shelf depth cap.
    max_buffers: usize,

    gets: AtomicU64,
    puts: AtomicU64,
    misses: AtomicU64,
    oversized: AtomicU64,
}

/// Point-in-time snapshot of pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub gets: u64,
    pub puts: u64,
    pub misses: u64,
    pub oversized: u64,
}

impl BufferPool {
    /// Create a pool allocating buffers of `buf_capacity` bytes.
    #[must_use]
    pub fn new(buf_capacity: usize) -> Self {
        Self::with_limits(buf_capacity, buf_capacity * 2, DEFAULT_MAX_BUFFERS)
    }

    /// Create a pool with explicit pooling ceiling and shelf depth.
    #[must_use]
    pub fn with_limits(buf_capacity: usize, max_pooled: usize, max_buffers: usize) -> Self {
        Self {
            shelf: Mutex::new(Vec::with_capacity(max_buffers.min(16))),
            buf_capacity,
            max_pooled,
            max_buffers,
            gets: AtomicU64::new(0),
            puts: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            oversized: AtomicU64::new(0),
        }
    }

    /// Acquire a cleared buffer with capacity for at least `size` bytes.
    ///
    /// The buffer belongs to the caller until it is handed back with
    /// [`BufferPool::put`].
    #[must_use]
    pub fn get(&self, size: usize) -> BytesMut {
        self.gets.fetch_add(1, Ordering::Relaxed);

        {
            let mut shelf = self
                .shelf
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            while let Some(mut buf) = shelf.pop() {
                if buf.capacity() >= size {
                    buf.clear();
                    return buf;
                }
                // Undersized stray; let it drop and keep looking.
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        BytesMut::with_capacity(size.max(self.buf_capacity))
    }

    /// Return a buffer for reuse.
    ///
    /// Buffers that grew beyond the pooling ceiling are discarded, as is
    /// anything arriving once the shelf is full.
    pub fn put(&self, buf: BytesMut) {
        if buf.capacity() > self.max_pooled {
            self.oversized.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.puts.fetch_add(1, Ordering::Relaxed);

        let mut shelf = self
            .shelf
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if shelf.len() < self.max_buffers {
            shelf.push(buf);
        }
    }

    /// Capacity used for fresh allocations.
    #[inline]
    #[must_use]
    pub const fn buf_capacity(&self) -> usize {
        self.buf_capacity
    }

    /// Snapshot of the pool counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            gets: self.gets.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            oversized: self.oversized.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_allocates_on_empty_pool() {
        let pool = BufferPool::new(1024);
        let buf = pool.get(100);
        assert!(buf.capacity() >= 1024);

        let stats = pool.stats();
        assert_eq!(stats.gets, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_put_then_get_reuses() {
        let pool = BufferPool::new(1024);
        let buf = pool.get(100);
        pool.put(buf);

        let _buf = pool.get(100);
        let stats = pool.stats();
        assert_eq!(stats.gets, 2);
        assert_eq!(stats.puts, 1);
        // Second get was served from the shelf.
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_oversized_request_allocates_exact() {
        let pool = BufferPool::new(1024);
        let buf = pool.get(10_000);
        assert!(buf.capacity() >= 10_000);
    }

    #[test]
    fn test_oversized_return_discarded() {
        let pool = BufferPool::with_limits(1024, 2048, 8);
        let buf = BytesMut::with_capacity(1 << 20);
        pool.put(buf);

        let stats = pool.stats();
        assert_eq!(stats.oversized, 1);
        assert_eq!(stats.puts, 0);
    }

    #[test]
    fn test_shelf_depth_cap() {
        let pool = BufferPool::with_limits(64, 128, 2);
        for _ in 0..4 {
            pool.put(BytesMut::with_capacity(64));
        }
        // All four puts are counted even though only two were kept.
        assert_eq!(pool.stats().puts, 4);
    }

    #[test]
    fn test_cleared_on_reuse() {
        let pool = BufferPool::new(64);
        let mut buf = pool.get(16);
        buf.extend_from_slice(b"stale");
        pool.put(buf);

        let buf = pool.get(16);
        assert!(buf.is_empty());
    }
}
