//! Lock-free audio-to-UI snapshot queues
//!
//! Each queue is a single-producer single-consumer ring of `capacity + 1`
//! slots, where `capacity + 1` is a power of two so slot indices are a
//! bitmask of free-running counters. The producer owns `write_pos`, the
//! consumer owns `read_pos`:
//!
//! - the producer fills the slot, then publishes it with a `Release` store
//!   of `write_pos`; the consumer `Acquire`s `write_pos` before reading, so it
//!   never sees a partially written entry
//! - the consumer releases a slot back with a `Release` store of `read_pos`
//!
//! Clearing (stop, seek) is a flag rather than a reset of both counters:
//! while it is set the producer skips pushes, and the consumer drains by
//! jumping `read_pos` to `write_pos` and then drops the flag.

mod snapshot;

#[cfg(test)]
mod tests;

use std::cell::UnsafeCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

pub use snapshot::{ChannelSnapshot, ChannelSyncState, PatternSnapshot, PatternState};

use crate::error::{MixerError, Result};

/// Default entries per queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 255;

/// Entries that carry the time they become audible.
pub trait Timestamped {
    /// Nanoseconds on the [`SyncClock`]
    fn timestamp(&self) -> u64;
}

/// Monotonic clock shared by the audio and UI threads.
#[derive(Debug, Clone, Copy)]
pub struct SyncClock {
    origin: Instant,
}

impl SyncClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }

    /// Nanoseconds since the clock was created
    pub fn now_ns(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }
}

impl Default for SyncClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-capacity SPSC ring buffer. Use [`SyncQueue::split`] to get the
/// two endpoints.
pub struct SyncQueue<T> {
    slots: Box<[UnsafeCell<T>]>,
    mask: usize,
    write_pos: AtomicUsize,
    read_pos: AtomicUsize,
    clearing: AtomicBool,
}

// SAFETY: a slot is only written by the producer while it is outside
// `read_pos..write_pos`, and only read by the consumer while inside it. The
// counters hand slots over with Release/Acquire pairs.
unsafe impl<T: Send> Sync for SyncQueue<T> {}

impl<T: Copy + Default> SyncQueue<T> {
    /// `capacity + 1` must be a power of two (7, 15, 255, ...).
    pub fn new(capacity: usize) -> Result<Self> {
        let slots = capacity.checked_add(1).filter(|n| n.is_power_of_two() && *n > 1);
        let Some(slots) = slots else {
            return Err(MixerError::InvalidQueueCapacity(capacity));
        };
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(slots)
            .map_err(|_| MixerError::Allocation {
                what: "sync queue",
                bytes: slots * std::mem::size_of::<T>(),
            })?;
        buffer.extend((0..slots).map(|_| UnsafeCell::new(T::default())));

        Ok(Self {
            slots: buffer.into_boxed_slice(),
            mask: capacity,
            write_pos: AtomicUsize::new(0),
            read_pos: AtomicUsize::new(0),
            clearing: AtomicBool::new(false),
        })
    }

    /// Hand out the producer and consumer ends.
    pub fn split(self) -> (SyncProducer<T>, SyncConsumer<T>) {
        let queue = Arc::new(self);
        (
            SyncProducer {
                queue: Arc::clone(&queue),
            },
            SyncConsumer { queue },
        )
    }
}

impl<T> SyncQueue<T> {
    /// Maximum entries held at once
    pub fn capacity(&self) -> usize {
        self.mask
    }

    /// Entries currently queued (a snapshot; the other side may be moving)
    pub fn len(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_clearing(&self) -> bool {
        self.clearing.load(Ordering::Acquire)
    }

    fn request_clear(&self) {
        self.clearing.store(true, Ordering::Release);
    }
}

/// Audio-thread end of a [`SyncQueue`].
pub struct SyncProducer<T> {
    queue: Arc<SyncQueue<T>>,
}

impl<T: Copy> SyncProducer<T> {
    /// Queue an entry. Returns `false` when the queue is full or being
    /// cleared; the entry is dropped and the caller carries on.
    pub fn push(&mut self, entry: T) -> bool {
        let queue = &*self.queue;
        if queue.is_clearing() {
            return false;
        }
        let write = queue.write_pos.load(Ordering::Relaxed);
        let read = queue.read_pos.load(Ordering::Acquire);
        if write.wrapping_sub(read) >= queue.mask {
            return false;
        }
        // SAFETY: the slot is outside `read..write`, so the consumer is not
        // reading it, and we are the only producer.
        unsafe {
            *queue.slots[write & queue.mask].get() = entry;
        }
        queue.write_pos.store(write.wrapping_add(1), Ordering::Release);
        true
    }

    /// Ask the consumer to drop everything queued so far.
    pub fn request_clear(&self) {
        self.queue.request_clear();
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// UI-thread end of a [`SyncQueue`].
pub struct SyncConsumer<T> {
    queue: Arc<SyncQueue<T>>,
}

impl<T: Copy> SyncConsumer<T> {
    /// Finish a pending clear. Returns `true` if one was pending.
    fn drain_if_clearing(&self) -> bool {
        let queue = &*self.queue;
        if !queue.is_clearing() {
            return false;
        }
        let write = queue.write_pos.load(Ordering::Acquire);
        queue.read_pos.store(write, Ordering::Release);
        queue.clearing.store(false, Ordering::Release);
        true
    }

    /// Copy of the oldest entry without removing it
    pub fn peek(&self) -> Option<T> {
        if self.drain_if_clearing() {
            return None;
        }
        let queue = &*self.queue;
        let read = queue.read_pos.load(Ordering::Relaxed);
        let write = queue.write_pos.load(Ordering::Acquire);
        if read == write {
            return None;
        }
        // SAFETY: the slot is inside `read..write`; the producer will not
        // touch it until `read_pos` moves past it.
        Some(unsafe { *queue.slots[read & queue.mask].get() })
    }

    /// Remove and return the oldest entry
    pub fn pop(&mut self) -> Option<T> {
        let entry = self.peek()?;
        let queue = &*self.queue;
        let read = queue.read_pos.load(Ordering::Relaxed);
        queue.read_pos.store(read.wrapping_add(1), Ordering::Release);
        Some(entry)
    }

    /// Drop everything queued. The producer keeps pushing afterwards.
    pub fn clear(&mut self) {
        self.queue.request_clear();
        self.drain_if_clearing();
    }

    /// Whether a clear has been requested and not yet handled
    pub fn is_clearing(&self) -> bool {
        self.queue.is_clearing()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl<T: Copy + Timestamped> SyncConsumer<T> {
    /// Timestamp of the oldest entry
    pub fn peek_timestamp(&self) -> Option<u64> {
        self.peek().map(|entry| entry.timestamp())
    }

    /// Pop every entry due at `now_ns` and return the newest of them.
    ///
    /// Entries still in the future stay queued.
    pub fn pop_due(&mut self, now_ns: u64) -> Option<T> {
        let mut latest = None;
        while self.peek_timestamp().is_some_and(|ts| ts <= now_ns) {
            latest = self.pop();
        }
        latest
    }
}
