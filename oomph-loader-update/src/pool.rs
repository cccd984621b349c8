//! Bounded pool of reusable request-body buffers.
//!
//! Buffers are handed out as RAII [`PooledBuffer`] guards and go back to the
//! pool on drop. A buffer that grew beyond the pool's retained-capacity
//! ceiling is dropped instead of pooled, so one oversized request cannot pin
//! a large allocation for the rest of the process.

use std::fmt;
use std::ops::{Deref, DerefMut};

use parking_lot::Mutex;

/// Largest buffer capacity the pool will keep (1 MiB).
pub const MAX_RETAINED_CAPACITY: usize = 1024 * 1024;

/// Default number of idle buffers kept by [`BufferPool::default`].
const DEFAULT_MAX_BUFFERS: usize = 4;

/// Thread-safe pool of `Vec<u8>` buffers.
pub struct BufferPool {
    buffers: Mutex<Vec<Vec<u8>>>,
    /// Maximum number of idle buffers held at once.
    max_buffers: usize,
    /// Buffers with a larger capacity than this are discarded on release.
    max_retained_capacity: usize,
    /// Capacity of freshly allocated buffers.
    initial_capacity: usize,
}

impl BufferPool {
    /// Create a pool holding at most `max_buffers` idle buffers, each no larger
    /// than `max_retained_capacity`.
    ///
    /// New buffers are allocated with `max_retained_capacity` up front so a
    /// typical request body never reallocates.
    #[must_use]
    pub fn new(max_buffers: usize, max_retained_capacity: usize) -> Self {
        Self::with_initial_capacity(max_buffers, max_retained_capacity, max_retained_capacity)
    }

    /// Like [`BufferPool::new`] but with an explicit capacity for new buffers.
    #[must_use]
    pub fn with_initial_capacity(
        max_buffers: usize,
        max_retained_capacity: usize,
        initial_capacity: usize,
    ) -> Self {
        Self {
            buffers: Mutex::new(Vec::with_capacity(max_buffers.min(16))),
            max_buffers,
            max_retained_capacity,
            initial_capacity: initial_capacity.min(max_retained_capacity),
        }
    }

    /// Take an empty buffer from the pool, allocating one if none is idle.
    pub fn get(&self) -> PooledBuffer<'_> {
        let buf = self
            .buffers
            .lock()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.initial_capacity));

        PooledBuffer {
            buf: Some(buf),
            pool: self,
        }
    }

    /// Number of idle buffers currently held.
    pub fn idle(&self) -> usize {
        self.buffers.lock().len()
    }

    fn put(&self, mut buf: Vec<u8>) {
        if buf.capacity() > self.max_retained_capacity {
            log::debug!(
                "Dropping oversized request buffer ({} bytes > {} byte ceiling)",
                buf.capacity(),
                self.max_retained_capacity
            );
            return;
        }

        buf.clear();
        let mut buffers = self.buffers.lock();
        if buffers.len() < self.max_buffers {
            buffers.push(buf);
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUFFERS, MAX_RETAINED_CAPACITY)
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("idle", &self.idle())
            .field("max_buffers", &self.max_buffers)
            .field("max_retained_capacity", &self.max_retained_capacity)
            .finish()
    }
}

/// A buffer borrowed from a [`BufferPool`]. Returned to the pool on drop.
pub struct PooledBuffer<'a> {
    buf: Option<Vec<u8>>,
    pool: &'a BufferPool,
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.put(buf);
        }
    }
}

impl Deref for PooledBuffer<'_> {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        // Only `Drop` takes the buffer out.
        self.buf.as_ref().expect("pooled buffer already released")
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.buf.as_mut().expect("pooled buffer already released")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_buffer_is_reused_after_drop() {
        let pool = BufferPool::with_initial_capacity(2, 1024, 64);
        {
            let mut buf = pool.get();
            buf.extend_from_slice(b"hello");
        }
        assert_eq!(pool.idle(), 1);

        let buf = pool.get();
        assert!(buf.is_empty(), "Reused buffer must come back cleared");
        assert!(buf.capacity() >= 64);
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn test_oversized_buffer_is_discarded() {
        let pool = BufferPool::with_initial_capacity(2, 1024, 64);
        {
            let mut buf = pool.get();
            buf.resize(4096, 0);
        }
        assert_eq!(pool.idle(), 0, "Buffer above the ceiling must not be pooled");
    }

    #[test]
    fn test_buffer_at_ceiling_is_kept() {
        let pool = BufferPool::with_initial_capacity(2, 1024, 1024);
        {
            let mut buf = pool.get();
            buf.extend_from_slice(&[7u8; 1024]);
            assert_eq!(buf.capacity(), 1024);
        }
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_idle_count_is_bounded() {
        let pool = BufferPool::with_initial_capacity(2, 1024, 16);
        let a = pool.get();
        let b = pool.get();
        let c = pool.get();
        drop(a);
        drop(b);
        drop(c);
        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn test_default_pool_uses_one_mib_buffers() {
        let pool = BufferPool::default();
        let buf = pool.get();
        assert_eq!(buf.capacity(), MAX_RETAINED_CAPACITY);
    }

    #[test]
    fn test_concurrent_get_and_release() {
        let pool = Arc::new(BufferPool::with_initial_capacity(4, 1024, 32));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let mut buf = pool.get();
                        buf.push(i as u8);
                        assert_eq!(buf.len(), 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(pool.idle() <= 4);
    }
}
