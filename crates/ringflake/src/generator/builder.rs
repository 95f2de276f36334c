use core::time::Duration;
use std::sync::Arc;

use crate::bits::BitLayout;
use crate::buffer::{
    DEFAULT_PADDING_PERCENT, PaddingExecutor, RejectedPutHandler, RejectedTakeHandler, RingBuffer,
    UidProvider,
};
use crate::error::{Error, Result};
use crate::generator::cached::{CachedGenerator, next_ids_for_one_second};
use crate::time::{DEFAULT_EPOCH_SECONDS, current_second};
use crate::worker::WorkerIdAssigner;

/// Default boost power: the ring holds 2^3 seconds worth of identifiers.
const DEFAULT_BOOST_POWER: u32 = 3;

/// Largest slot count the ring is allowed to reach.
const MAX_BUFFER_SIZE: i64 = 1 << 30;

/// Startup configuration for a [`CachedGenerator`].
///
/// Defaults: 28 timestamp bits, 22 worker bits, 13 sequence bits, the
/// crate's default epoch, boost power 3, padding factor 50, no scheduled
/// padding, and the default rejection policies (discard + WARN for puts,
/// WARN for takes).
///
/// Every knob is validated in [`build`]; nothing panics on bad input.
///
/// [`build`]: CachedGeneratorBuilder::build
pub struct CachedGeneratorBuilder {
    epoch_seconds: i64,
    timestamp_bits: u32,
    worker_bits: u32,
    sequence_bits: u32,
    boost_power: u32,
    padding_factor: u32,
    schedule_interval: Option<Duration>,
    rejected_put_handler: Option<RejectedPutHandler>,
    rejected_take_handler: Option<RejectedTakeHandler>,
}

impl Default for CachedGeneratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CachedGeneratorBuilder {
    pub fn new() -> Self {
        Self {
            epoch_seconds: DEFAULT_EPOCH_SECONDS,
            timestamp_bits: 28,
            worker_bits: 22,
            sequence_bits: 13,
            boost_power: DEFAULT_BOOST_POWER,
            padding_factor: DEFAULT_PADDING_PERCENT,
            schedule_interval: None,
            rejected_put_handler: None,
            rejected_take_handler: None,
        }
    }

    /// Sets the second the timestamp field counts from. Must not lie in
    /// the future at build time.
    pub fn epoch_seconds(mut self, epoch_seconds: i64) -> Self {
        self.epoch_seconds = epoch_seconds;
        self
    }

    /// Sets the three field widths. Together with the sign bit they must
    /// cover exactly 64 bits.
    pub fn bits(mut self, timestamp_bits: u32, worker_bits: u32, sequence_bits: u32) -> Self {
        self.timestamp_bits = timestamp_bits;
        self.worker_bits = worker_bits;
        self.sequence_bits = sequence_bits;
        self
    }

    /// Sets the ring-size boost: the ring holds `2^boost_power` seconds
    /// worth of identifiers. Must be positive.
    pub fn boost_power(mut self, boost_power: u32) -> Self {
        self.boost_power = boost_power;
        self
    }

    /// Sets the refill threshold as a percentage (`1..=99`) of the ring
    /// size.
    pub fn padding_factor(mut self, padding_factor: u32) -> Self {
        self.padding_factor = padding_factor;
        self
    }

    /// Enables periodic padding on top of the low-water trigger.
    pub fn schedule_interval(mut self, interval: Duration) -> Self {
        self.schedule_interval = Some(interval);
        self
    }

    /// Replaces the default discard policy for rejected puts.
    pub fn rejected_put_handler(mut self, handler: RejectedPutHandler) -> Self {
        self.rejected_put_handler = Some(handler);
        self
    }

    /// Replaces the default policy for rejected takes.
    pub fn rejected_take_handler(mut self, handler: RejectedTakeHandler) -> Self {
        self.rejected_take_handler = Some(handler);
        self
    }

    /// Builds the generator: obtains a worker id, sizes and fills the
    /// ring, and starts the padding machinery.
    ///
    /// # Errors
    /// [`Error::InvalidConfig`] for any out-of-range knob or worker id,
    /// [`Error::WorkerIdAssignment`] from the assigner, and
    /// [`Error::CapacityExhausted`] if the epoch is already so far in the
    /// past that the initial fill overruns the timestamp field.
    pub fn build(self, assigner: &dyn WorkerIdAssigner) -> Result<CachedGenerator> {
        let layout = BitLayout::new(self.timestamp_bits, self.worker_bits, self.sequence_bits)?;

        if self.boost_power == 0 {
            return Err(Error::InvalidConfig {
                reason: format!("boost power must be positive, got {}", self.boost_power),
            });
        }
        if let Some(interval) = self.schedule_interval {
            if interval.is_zero() {
                return Err(Error::InvalidConfig {
                    reason: "schedule interval must be positive".into(),
                });
            }
        }
        if self.epoch_seconds < 0 || self.epoch_seconds > current_second() {
            return Err(Error::InvalidConfig {
                reason: format!(
                    "epoch {} must be nonnegative and not in the future",
                    self.epoch_seconds
                ),
            });
        }

        let worker_id = assigner.assign_worker_id()?;
        if worker_id < 0 || worker_id > layout.max_worker_id() {
            return Err(Error::InvalidConfig {
                reason: format!(
                    "worker id {worker_id} out of range 0..={}",
                    layout.max_worker_id()
                ),
            });
        }

        let buffer_size = (layout.max_sequence() + 1)
            .checked_shl(self.boost_power)
            .filter(|size| (1..=MAX_BUFFER_SIZE).contains(size))
            .ok_or_else(|| Error::InvalidConfig {
                reason: format!(
                    "ring size ((1 << {}) << {}) is out of bounds",
                    self.sequence_bits, self.boost_power
                ),
            })?;
        let ring = Arc::new(RingBuffer::new(buffer_size, self.padding_factor)?);
        tracing::info!(
            "initialized ring buffer, size:{buffer_size} padding_factor:{}",
            self.padding_factor,
        );

        if let Some(handler) = self.rejected_put_handler {
            ring.set_rejected_put_handler(handler);
        }
        if let Some(handler) = self.rejected_take_handler {
            ring.set_rejected_take_handler(handler);
        }

        let epoch_seconds = self.epoch_seconds;
        let provide: UidProvider = Box::new(move |second| {
            next_ids_for_one_second(layout, epoch_seconds, worker_id, second)
        });

        let executor = PaddingExecutor::new(Arc::clone(&ring), provide, self.schedule_interval);
        tracing::info!(
            "initialized padding executor, using_schedule:{} interval:{:?}",
            self.schedule_interval.is_some(),
            self.schedule_interval,
        );
        ring.set_padding_listener(executor.padding_listener());

        // fill every slot before serving the first take
        executor.padding_buffer()?;
        executor.start();

        tracing::info!(
            "initialized cached generator, worker_id:{worker_id} timestamp_bits:{} \
             worker_bits:{} sequence_bits:{} epoch:{epoch_seconds}",
            layout.timestamp_bits(),
            layout.worker_bits(),
            layout.sequence_bits(),
        );

        Ok(CachedGenerator::from_parts(
            worker_id,
            epoch_seconds,
            layout,
            ring,
            executor,
        ))
    }
}
