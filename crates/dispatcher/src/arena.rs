//! Reusable scratch buffers for draining response bodies.
//!
//! Workers check a buffer out of the [`BufferArena`], accumulate a
//! response body into it, copy the result into an exactly-sized owned
//! allocation and hand the buffer back. Reusing the scratch buffer avoids
//! the repeated grow-and-reallocate cycle of building every body from an
//! empty vector.
//!
//! The arena is an explicit value owned by the dispatcher and shared with
//! its workers through an `Arc`; there is no process-wide pool.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use bytes::BytesMut;

/// Counters describing arena usage since construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArenaStats {
    /// Buffers allocated because the pool was empty.
    pub allocated: u64,
    /// Checkouts served from the pool.
    pub reused: u64,
    /// Returned buffers dropped because the pool was full or they had grown too large.
    pub discarded: u64,
}

/// Pool of scratch byte buffers with acquire-use-release discipline.
pub struct BufferArena {
    free: Mutex<Vec<BytesMut>>,
    buffer_capacity: usize,
    max_pooled: usize,
    max_retained_capacity: usize,
    allocated: AtomicU64,
    reused: AtomicU64,
    discarded: AtomicU64,
}

impl BufferArena {
    /// Create an empty arena.
    ///
    /// * `buffer_capacity` - initial capacity of newly allocated buffers.
    /// * `max_pooled` - how many idle buffers are kept for reuse.
    /// * `max_retained_capacity` - buffers that grew beyond this are freed on return.
    pub fn new(buffer_capacity: usize, max_pooled: usize, max_retained_capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(max_pooled)),
            buffer_capacity,
            max_pooled,
            max_retained_capacity,
            allocated: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// Build an arena from the dispatcher configuration.
    pub fn from_config(config: &fanout_core::DispatcherConfig) -> Self {
        Self::new(
            config.arena_buffer_bytes,
            config.arena_max_pooled,
            config.arena_max_retained_bytes,
        )
    }

    /// Check out an empty scratch buffer.
    ///
    /// The buffer returns to the arena when the guard is dropped, on every
    /// path including early returns and errors.
    pub fn checkout(&self) -> ArenaBuffer<'_> {
        let pooled = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        let buf = match pooled {
            Some(buf) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                buf
            }
            None => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                BytesMut::with_capacity(self.buffer_capacity)
            }
        };

        ArenaBuffer { arena: self, buf }
    }

    /// Number of idle buffers currently pooled.
    pub fn idle(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            allocated: self.allocated.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }

    fn give_back(&self, mut buf: BytesMut) {
        buf.clear();
        if buf.capacity() > self.max_retained_capacity {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() < self.max_pooled {
            free.push(buf);
        } else {
            drop(free);
            self.discarded.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl std::fmt::Debug for BufferArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferArena")
            .field("buffer_capacity", &self.buffer_capacity)
            .field("max_pooled", &self.max_pooled)
            .field("idle", &self.idle())
            .field("stats", &self.stats())
            .finish()
    }
}

/// A scratch buffer checked out of a [`BufferArena`].
///
/// Exclusively owned by the borrower until dropped.
pub struct ArenaBuffer<'a> {
    arena: &'a BufferArena,
    buf: BytesMut,
}

impl Deref for ArenaBuffer<'_> {
    type Target = BytesMut;

    fn deref(&self) -> &BytesMut {
        &self.buf
    }
}

impl DerefMut for ArenaBuffer<'_> {
    fn deref_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }
}

impl Drop for ArenaBuffer<'_> {
    fn drop(&mut self) {
        self.arena.give_back(std::mem::take(&mut self.buf));
    }
}
