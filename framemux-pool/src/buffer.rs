//! Reusable response buffers.
//!
//! Every open response stream holds one buffer of [`MAX_FRAME_LENGTH`]
//! bytes. Streams are short-lived and created at request rate, so buffers
//! are recycled through a bounded lock-free queue instead of being
//! reallocated per response.

use bytes::BytesMut;
use crossbeam_queue::ArrayQueue;
use framemux_protocol::MAX_FRAME_LENGTH;

/// A bounded pool of frame buffers shared by response streams.
///
/// `acquire()` pops a recycled buffer or allocates a new one. `release()`
/// returns a buffer, dropping it if the pool already holds `capacity`
/// buffers.
#[derive(Debug)]
pub struct BufferPool {
    pool: ArrayQueue<BytesMut>,
}

impl BufferPool {
    /// Creates a pool that retains at most `capacity` idle buffers.
    ///
    /// A capacity of 0 is bumped to 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            pool: ArrayQueue::new(capacity.max(1)),
        }
    }

    /// Takes a buffer of exactly [`MAX_FRAME_LENGTH`] bytes.
    ///
    /// Buffer contents are unspecified; callers track how much of it is filled.
    pub fn acquire(&self) -> BytesMut {
        let mut buf = self
            .pool
            .pop()
            .unwrap_or_else(|| BytesMut::with_capacity(MAX_FRAME_LENGTH));
        buf.resize(MAX_FRAME_LENGTH, 0);
        buf
    }

    /// Returns a buffer to the pool.
    pub fn release(&self, mut buf: BytesMut) {
        buf.clear();
        let _ = self.pool.push(buf);
    }

    /// Number of idle buffers currently held.
    pub fn available(&self) -> usize {
        self.pool.len()
    }

    /// Maximum number of idle buffers retained.
    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }
}
