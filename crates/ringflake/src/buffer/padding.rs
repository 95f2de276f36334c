use core::time::Duration;
use std::sync::{Arc, Weak, mpsc};
use std::thread::{self, JoinHandle};

use crossbeam_utils::CachePadded;
use parking_lot::Mutex;
use portable_atomic::{AtomicBool, AtomicI64, Ordering};

use crate::buffer::policy::PaddingListener;
use crate::buffer::ring::RingBuffer;
use crate::error::Result;
use crate::time::current_second;

/// Supplies the batch of identifiers for one logical second.
///
/// Must return exactly one full second's worth of identifiers (the
/// layout's `max_sequence + 1`), in increasing order. Errors mean the
/// second cannot be represented any more (timestamp field exhausted) and
/// permanently end padding.
pub type UidProvider = Box<dyn Fn(i64) -> Result<Vec<i64>> + Send + Sync>;

enum Signal {
    Pad,
    Stop,
}

/// Owns the ring buffer's single producer.
///
/// The executor advances a logical "next second" counter and pushes that
/// second's precomputed batch into the ring, one identifier at a time,
/// until the ring rejects a put. Three triggers share one interlock (the
/// `running` flag), so at most one padding pass is in flight at any
/// moment:
///
/// - a synchronous fill ([`padding_buffer`]), run on the caller at
///   startup;
/// - an asynchronous fill ([`async_padding`]), a non-blocking wake of the
///   dedicated worker thread, requested by consumers crossing the ring's
///   low-water mark;
/// - an optional periodic timer driving the asynchronous path.
///
/// The counter starts at the wall-clock second of construction and is
/// never re-read from the clock afterwards: under load it runs ahead of
/// real time, and a wall-clock regression cannot drag it backwards. The
/// price is that the timestamp field can be exhausted early; see
/// [`Error::CapacityExhausted`].
///
/// [`padding_buffer`]: PaddingExecutor::padding_buffer
/// [`async_padding`]: PaddingExecutor::async_padding
/// [`Error::CapacityExhausted`]: crate::Error::CapacityExhausted
pub struct PaddingExecutor {
    inner: Arc<PaddingInner>,
    schedule_interval: Option<Duration>,
    worker: Mutex<Option<JoinHandle<()>>>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

struct PaddingInner {
    ring: Arc<RingBuffer>,
    provide: UidProvider,

    /// Last logical second a batch was produced for. Advanced by the
    /// padding loop only.
    last_second: CachePadded<AtomicI64>,
    /// True while one trigger is inside the padding loop.
    running: AtomicBool,
    stopped: AtomicBool,
    wake: mpsc::SyncSender<Signal>,
}

impl PaddingExecutor {
    /// Creates the executor and spawns its padding worker thread.
    ///
    /// `last_second` is seeded with the current wall-clock second; the
    /// epoch is subtracted later, by the provider, so the seed is
    /// equivalent to "start from now". Pass a `schedule_interval` to also
    /// pad on a timer; the timer does not start until [`start`] is
    /// called.
    ///
    /// [`start`]: PaddingExecutor::start
    pub fn new(
        ring: Arc<RingBuffer>,
        provide: UidProvider,
        schedule_interval: Option<Duration>,
    ) -> Self {
        // Capacity 1: a full slot means a wake-up is already queued, and
        // further requests coalesce with it.
        let (wake, signals) = mpsc::sync_channel(1);

        let inner = Arc::new(PaddingInner {
            ring,
            provide,
            last_second: CachePadded::new(AtomicI64::new(current_second())),
            running: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            wake,
        });

        let worker = {
            let inner = Arc::clone(&inner);
            thread::Builder::new()
                .name("ringflake-padding-worker".into())
                .spawn(move || worker_loop(&inner, &signals))
                .expect("failed to spawn padding worker thread")
        };

        Self {
            inner,
            schedule_interval,
            worker: Mutex::new(Some(worker)),
            scheduler: Mutex::new(None),
        }
    }

    /// Starts the periodic trigger, if an interval was configured.
    pub fn start(&self) {
        let Some(interval) = self.schedule_interval else {
            return;
        };
        let mut scheduler = self.scheduler.lock();
        if scheduler.is_some() {
            return;
        }
        let inner = Arc::downgrade(&self.inner);
        let handle = thread::Builder::new()
            .name("ringflake-padding-scheduler".into())
            .spawn(move || schedule_loop(&inner, interval))
            .expect("failed to spawn padding scheduler thread");
        *scheduler = Some(handle);
        tracing::info!("padding scheduler started, interval:{interval:?}");
    }

    /// Fills the ring on the calling thread until a put is rejected.
    ///
    /// # Errors
    /// Propagates [`Error::CapacityExhausted`] from the provider; nothing
    /// further is produced in that case.
    ///
    /// [`Error::CapacityExhausted`]: crate::Error::CapacityExhausted
    pub fn padding_buffer(&self) -> Result<()> {
        self.inner.padding_loop()
    }

    /// Requests an asynchronous fill.
    ///
    /// Non-blocking and idempotent: while a pass is running, or after
    /// shutdown, the request is dropped. Multiple threshold crossings
    /// collapse onto a single pass.
    pub fn async_padding(&self) {
        self.inner.async_padding();
    }

    /// Last logical second a batch has been produced for.
    pub fn last_second(&self) -> i64 {
        self.inner.last_second.load(Ordering::Acquire)
    }

    /// Builds the wake-up closure handed to the ring buffer's low-water
    /// trigger.
    ///
    /// Holds only a weak reference to the executor, so the buffer keeping
    /// the listener does not keep the executor alive.
    pub fn padding_listener(&self) -> PaddingListener {
        let inner = Arc::downgrade(&self.inner);
        Box::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.async_padding();
            }
        })
    }

    /// Stops the timer, signals the worker, and joins both threads.
    ///
    /// Idempotent. An in-flight padding pass finishes its current batch;
    /// after return, no further trigger is honored.
    pub fn shutdown(&self) {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(scheduler) = self.scheduler.lock().take() {
            scheduler.thread().unpark();
            if scheduler.join().is_err() {
                tracing::error!("padding scheduler panicked during shutdown");
            }
        }

        if let Some(worker) = self.worker.lock().take() {
            let _ = self.inner.wake.send(Signal::Stop);
            if worker.join().is_err() {
                tracing::error!("padding worker panicked during shutdown");
            }
        }

        tracing::info!("padding executor shut down");
    }
}

impl Drop for PaddingExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl PaddingInner {
    fn async_padding(&self) {
        if self.stopped.load(Ordering::Acquire) || self.running.load(Ordering::Acquire) {
            return;
        }
        // A full wake slot already carries a pending request; coalesce.
        let _ = self.wake.try_send(Signal::Pad);
    }

    /// One padding pass: advance the logical second, produce its batch,
    /// put each identifier in order, and stop on the first rejected put.
    fn padding_loop(&self) -> Result<()> {
        // at most one trigger pads at a time
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::info!("padding already in progress. {:?}", self.ring);
            return Ok(());
        }

        tracing::info!(
            "padding pass starting, last_second:{}. {:?}",
            self.last_second.load(Ordering::Acquire),
            self.ring,
        );

        let result = self.fill_until_rejected();

        self.running.store(false, Ordering::Release);
        tracing::info!(
            "padding pass finished, last_second:{}. {:?}",
            self.last_second.load(Ordering::Acquire),
            self.ring,
        );
        result
    }

    fn fill_until_rejected(&self) -> Result<()> {
        loop {
            let second = self.last_second.fetch_add(1, Ordering::AcqRel) + 1;
            let uids = (self.provide)(second)?;
            for uid in uids {
                if !self.ring.put(uid) {
                    return Ok(());
                }
            }
        }
    }
}

fn worker_loop(inner: &PaddingInner, signals: &mpsc::Receiver<Signal>) {
    tracing::debug!("padding worker started");
    while let Ok(signal) = signals.recv() {
        match signal {
            Signal::Pad => {
                if inner.stopped.load(Ordering::Acquire) {
                    break;
                }
                if let Err(e) = inner.padding_loop() {
                    tracing::error!("padding pass aborted: {e}");
                }
            }
            Signal::Stop => break,
        }
    }
    tracing::debug!("padding worker stopped");
}

fn schedule_loop(inner: &Weak<PaddingInner>, interval: Duration) {
    loop {
        // Unparked early on shutdown; a spurious wake-up only means one
        // extra idempotent trigger.
        thread::park_timeout(interval);
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if inner.stopped.load(Ordering::Acquire) {
            break;
        }
        inner.async_padding();
    }
    tracing::debug!("padding scheduler stopped");
}
