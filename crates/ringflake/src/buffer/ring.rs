use core::fmt;
use std::sync::OnceLock;

use crossbeam_utils::CachePadded;
use parking_lot::Mutex;
use portable_atomic::{AtomicI64, AtomicU8, Ordering};

use crate::buffer::policy::{
    self, PaddingListener, RejectedPutHandler, RejectedTakeHandler,
};
use crate::error::{Error, Result};

/// Slot state: the producer may (over)write the slot.
const CAN_PUT: u8 = 0;
/// Slot state: the slot holds an identifier not yet consumed.
const CAN_TAKE: u8 = 1;

/// Sequence sentinel: no slot produced, no slot consumed.
const START_POINT: i64 = -1;

/// Default padding factor, in percent of the buffer size.
pub const DEFAULT_PADDING_PERCENT: u32 = 50;

/// A fixed-capacity ring of precomputed identifiers.
///
/// The ring is an array of slots with a parallel array of per-slot state
/// flags, coordinated by two monotonically increasing sequences:
///
/// - `tail` is the producer frontier, the sequence of the last slot
///   produced;
/// - `cursor` is the consumer frontier, the sequence of the last slot
///   consumed.
///
/// [`put`] is serialized (the padding executor is the only producer) and
/// publishes a slot by writing it, flipping its flag to can-take, and then
/// advancing `tail`. [`take`] is lock-free: consumers claim a sequence
/// with a single CAS on `cursor` and coordinate with the producer purely
/// through the per-slot flags, so the ring never laps itself.
///
/// `tail`, `cursor`, and every flag live in their own cache line. Under
/// heavy consumer contention this padding, not the CAS itself, is the
/// dominant throughput factor.
///
/// [`put`]: RingBuffer::put
/// [`take`]: RingBuffer::take
pub struct RingBuffer {
    buffer_size: i64,
    index_mask: i64,
    slots: Box<[AtomicI64]>,
    flags: Box<[CachePadded<AtomicU8>]>,

    /// Producer frontier. Starts at the sentinel `-1`.
    tail: CachePadded<AtomicI64>,
    /// Consumer frontier. Starts at the sentinel `-1`.
    cursor: CachePadded<AtomicI64>,

    /// Remaining-identifier count below which consumers request a refill.
    padding_threshold: i64,

    /// Serializes the producer side, standing in for a dedicated producer
    /// task.
    put_lock: Mutex<()>,

    rejected_put_handler: OnceLock<RejectedPutHandler>,
    rejected_take_handler: OnceLock<RejectedTakeHandler>,
    padding_listener: OnceLock<PaddingListener>,
}

impl RingBuffer {
    /// Creates a ring with `buffer_size` slots.
    ///
    /// `padding_factor` is a percentage in `1..=99`: consumers request an
    /// asynchronous refill once fewer than
    /// `buffer_size * padding_factor / 100` identifiers remain.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if `buffer_size` is not a positive
    /// power of two, or `padding_factor` is out of range.
    pub fn new(buffer_size: i64, padding_factor: u32) -> Result<Self> {
        if buffer_size <= 0 {
            return Err(Error::InvalidConfig {
                reason: format!("ring buffer size must be positive, got {buffer_size}"),
            });
        }
        if buffer_size.count_ones() != 1 {
            return Err(Error::InvalidConfig {
                reason: format!("ring buffer size must be a power of two, got {buffer_size}"),
            });
        }
        if !(1..=99).contains(&padding_factor) {
            return Err(Error::InvalidConfig {
                reason: format!("padding factor must be in 1..=99, got {padding_factor}"),
            });
        }

        let size = buffer_size as usize;
        Ok(Self {
            buffer_size,
            index_mask: buffer_size - 1,
            slots: (0..size).map(|_| AtomicI64::new(0)).collect(),
            flags: (0..size)
                .map(|_| CachePadded::new(AtomicU8::new(CAN_PUT)))
                .collect(),
            tail: CachePadded::new(AtomicI64::new(START_POINT)),
            cursor: CachePadded::new(AtomicI64::new(START_POINT)),
            padding_threshold: buffer_size * i64::from(padding_factor) / 100,
            put_lock: Mutex::new(()),
            rejected_put_handler: OnceLock::new(),
            rejected_take_handler: OnceLock::new(),
            padding_listener: OnceLock::new(),
        })
    }

    /// Puts one identifier into the next free slot and publishes it by
    /// advancing `tail`.
    ///
    /// Returns `false`, after applying the rejected-put policy, when the
    /// ring is full or the next slot has not been consumed yet. The
    /// padding executor treats a `false` as the end of its current pass.
    pub fn put(&self, uid: i64) -> bool {
        let _guard = self.put_lock.lock();

        let current_tail = self.tail.load(Ordering::Acquire);
        let current_cursor = self.cursor.load(Ordering::Acquire);

        // tail caught the cursor: the ring is full
        let distance = current_tail
            - if current_cursor == START_POINT {
                0
            } else {
                current_cursor
            };
        if distance == self.buffer_size - 1 {
            self.reject_put(uid);
            return false;
        }

        // A consumer that advanced `cursor` over this slot may not have
        // reset its flag yet. Reject rather than spin; the producer must
        // never block.
        let next_index = self.slot_index(current_tail + 1);
        if self.flags[next_index].load(Ordering::Acquire) != CAN_PUT {
            self.reject_put(uid);
            return false;
        }

        // Slot, then flag, then tail. The slot and its flag must be
        // visible to any consumer that observes the new tail.
        self.slots[next_index].store(uid, Ordering::Relaxed);
        self.flags[next_index].store(CAN_TAKE, Ordering::Release);
        self.tail.fetch_add(1, Ordering::Release);
        true
    }

    /// Takes the identifier at the next cursor position.
    ///
    /// Lock-free: any number of consumers may call this concurrently, and
    /// the CAS on `cursor` is their only mutual exclusion. Crossing the
    /// low-water mark fires the padding listener (non-blocking).
    ///
    /// # Errors
    /// Returns [`Error::BufferEmpty`], after applying the rejected-take
    /// policy, when `cursor` has caught up with `tail`. This is transient
    /// while the padding executor is alive.
    ///
    /// # Panics
    /// Panics if the claimed slot is not in can-take state, which would
    /// mean the producer/consumer flag discipline was violated.
    pub fn take(&self) -> Result<i64> {
        let current_cursor = self.cursor.load(Ordering::Acquire);

        // Compare-and-advance. Losing the race means retrying against the
        // refreshed cursor, never going back.
        let next_cursor = loop {
            let old = self.cursor.load(Ordering::Acquire);
            let current_tail = self.tail.load(Ordering::Acquire);
            if old == current_tail {
                self.reject_take();
                return Err(Error::BufferEmpty);
            }
            match self.cursor.compare_exchange_weak(
                old,
                old + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break old + 1,
                Err(_) => core::hint::spin_loop(),
            }
        };
        assert!(
            next_cursor >= current_cursor,
            "cursor moved back: {next_cursor} < {current_cursor}"
        );

        // Request an asynchronous refill once the remainder falls below
        // the threshold. The wake-up is idempotent; redundant requests
        // coalesce inside the executor.
        let current_tail = self.tail.load(Ordering::Acquire);
        let rest = current_tail - next_cursor;
        if rest < self.padding_threshold {
            tracing::info!(
                "reached padding threshold:{} tail:{current_tail} cursor:{next_cursor} rest:{rest}",
                self.padding_threshold,
            );
            if let Some(listener) = self.padding_listener.get() {
                listener();
            }
        }

        let next_index = self.slot_index(next_cursor);
        assert!(
            self.flags[next_index].load(Ordering::Acquire) == CAN_TAKE,
            "slot {next_index} not in can-take state at consume time"
        );

        // Read the slot before resetting its flag. The reverse order would
        // let the producer overwrite the slot in between, and a consumer a
        // full lap later would take the same identifier twice.
        let uid = self.slots[next_index].load(Ordering::Relaxed);
        self.flags[next_index].store(CAN_PUT, Ordering::Release);

        Ok(uid)
    }

    /// Installs a custom rejected-put policy. Set once at wiring time;
    /// later calls are ignored.
    pub fn set_rejected_put_handler(&self, handler: RejectedPutHandler) {
        let _ = self.rejected_put_handler.set(handler);
    }

    /// Installs a custom rejected-take policy. Set once at wiring time;
    /// later calls are ignored.
    pub fn set_rejected_take_handler(&self, handler: RejectedTakeHandler) {
        let _ = self.rejected_take_handler.set(handler);
    }

    /// Installs the refill wake-up fired on low-water crossings. Set once
    /// at wiring time; later calls are ignored.
    pub fn set_padding_listener(&self, listener: PaddingListener) {
        let _ = self.padding_listener.set(listener);
    }

    /// Producer frontier sequence (`-1` before the first put).
    pub fn tail(&self) -> i64 {
        self.tail.load(Ordering::Acquire)
    }

    /// Consumer frontier sequence (`-1` before the first take).
    pub fn cursor(&self) -> i64 {
        self.cursor.load(Ordering::Acquire)
    }

    /// Number of slots.
    pub fn buffer_size(&self) -> i64 {
        self.buffer_size
    }

    /// Remaining-identifier count below which a refill is requested.
    pub fn padding_threshold(&self) -> i64 {
        self.padding_threshold
    }

    fn slot_index(&self, sequence: i64) -> usize {
        (sequence & self.index_mask) as usize
    }

    fn reject_put(&self, uid: i64) {
        match self.rejected_put_handler.get() {
            Some(handler) => handler(self, uid),
            None => policy::discard_put(self, uid),
        }
    }

    fn reject_take(&self) {
        match self.rejected_take_handler.get() {
            Some(handler) => handler(self),
            None => policy::warn_rejected_take(self),
        }
    }
}

impl fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("buffer_size", &self.buffer_size)
            .field("tail", &self.tail.load(Ordering::Acquire))
            .field("cursor", &self.cursor.load(Ordering::Acquire))
            .field("padding_threshold", &self.padding_threshold)
            .finish()
    }
}
