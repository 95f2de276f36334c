use std::sync::Arc;

use crate::bits::{BitLayout, ParsedUid};
use crate::buffer::{PaddingExecutor, RingBuffer};
use crate::error::{Error, Result};
use crate::generator::builder::CachedGeneratorBuilder;

/// A cached UID generator.
///
/// Identifiers are precomputed one logical second at a time into a
/// lock-free [`RingBuffer`] by a background [`PaddingExecutor`], so a
/// [`next_id`] call is a single CAS plus two atomic loads on the hot
/// path. Any number of threads may share one generator.
///
/// Because a full second's block is minted up front, consumption under
/// load runs ahead of the wall clock: the embedded timestamp is a logical
/// value that starts at construction time and only moves forward. That is
/// what makes the generator immune to wall-clock regressions, at the
/// price of exhausting the timestamp field early under sustained
/// over-consumption.
///
/// # Example
/// ```no_run
/// use ringflake::{CachedGenerator, FixedWorkerIdAssigner};
///
/// let generator = CachedGenerator::builder()
///     .build(&FixedWorkerIdAssigner::new(1))
///     .unwrap();
///
/// let uid = generator.next_id().unwrap();
/// println!("{}", generator.parse(uid));
/// ```
///
/// [`next_id`]: CachedGenerator::next_id
pub struct CachedGenerator {
    worker_id: i64,
    epoch_seconds: i64,
    layout: BitLayout,
    ring: Arc<RingBuffer>,
    executor: PaddingExecutor,
}

impl CachedGenerator {
    /// Starts configuring a generator.
    pub fn builder() -> CachedGeneratorBuilder {
        CachedGeneratorBuilder::new()
    }

    pub(crate) fn from_parts(
        worker_id: i64,
        epoch_seconds: i64,
        layout: BitLayout,
        ring: Arc<RingBuffer>,
        executor: PaddingExecutor,
    ) -> Self {
        Self {
            worker_id,
            epoch_seconds,
            layout,
            ring,
            executor,
        }
    }

    /// Returns the next identifier.
    ///
    /// # Errors
    /// [`Error::BufferEmpty`] when consumers have outrun the padding
    /// executor. Transient: the crossing already requested a refill, so
    /// callers may retry.
    pub fn next_id(&self) -> Result<i64> {
        self.ring.take()
    }

    /// Decodes an identifier into its packed fields. Pure; works for any
    /// identifier produced with the same layout and epoch.
    pub fn parse(&self, uid: i64) -> ParsedUid {
        let (delta_seconds, worker_id, sequence) = self.layout.parse(uid);
        ParsedUid {
            uid,
            timestamp: self.epoch_seconds + delta_seconds,
            worker_id,
            sequence,
        }
    }

    /// The worker id embedded in this generator's identifiers.
    pub fn worker_id(&self) -> i64 {
        self.worker_id
    }

    /// The epoch the timestamp field counts from.
    pub fn epoch_seconds(&self) -> i64 {
        self.epoch_seconds
    }

    /// The bit partition in effect.
    pub fn layout(&self) -> BitLayout {
        self.layout
    }

    /// Stops the padding executor's threads. Called automatically on
    /// drop; after it returns the cached remainder can still be taken,
    /// but nothing is refilled.
    pub fn shutdown(&self) {
        self.executor.shutdown();
    }

    #[cfg(test)]
    pub(crate) fn ring(&self) -> &RingBuffer {
        &self.ring
    }
}

/// Mints the full identifier block for one logical second: the sequence
/// field occupies the low bits, so the block is numerically contiguous
/// starting at sequence zero.
pub(crate) fn next_ids_for_one_second(
    layout: BitLayout,
    epoch_seconds: i64,
    worker_id: i64,
    second: i64,
) -> Result<Vec<i64>> {
    let delta_seconds = second - epoch_seconds;
    if delta_seconds > layout.max_delta_seconds() {
        return Err(Error::CapacityExhausted {
            delta_seconds,
            max_delta_seconds: layout.max_delta_seconds(),
        });
    }

    let first = layout.allocate(delta_seconds, worker_id, 0);
    Ok((0..=layout.max_sequence()).map(|offset| first + offset).collect())
}
