//! Error types for cached UID generation.
//!
//! This module defines the central `Error` enum covering every failure a
//! generator can report. Startup problems (`InvalidConfig`,
//! `WorkerIdAssignment`) are fatal for construction; `BufferEmpty` is a
//! transient consumer-side condition that callers may retry;
//! `CapacityExhausted` means the timestamp field has been used up and the
//! process can no longer produce identifiers.
//!
//! Invariant violations inside the ring buffer (a cursor moving backward, a
//! slot whose flag is not in the expected state at consume time) are not
//! represented here: they indicate memory corruption or a coordination bug
//! and abort via `assert!`.

/// A result type defaulting to the crate-wide [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Unified error type for UID generation.
#[derive(Clone, thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A startup parameter failed validation.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// The logical clock advanced past what the timestamp field can hold.
    ///
    /// Once raised, every later padding pass fails the same way: the
    /// generator is permanently out of identifiers.
    #[error("timestamp field exhausted: delta {delta_seconds}s exceeds max {max_delta_seconds}s")]
    CapacityExhausted {
        delta_seconds: i64,
        max_delta_seconds: i64,
    },

    /// A consumer found the ring buffer empty.
    ///
    /// Transient: the padding executor refills the ring in the background,
    /// so callers may retry.
    #[error("no cached UID available: the ring buffer is empty")]
    BufferEmpty,

    /// The worker-id assigner could not produce an identity for this
    /// process.
    #[error("worker id assignment failed: {context}")]
    WorkerIdAssignment { context: String },
}
