use crate::buffer::ring::RingBuffer;

/// Policy applied when `put` rejects an identifier (ring full, or the next
/// slot has not been consumed yet).
///
/// Receives the buffer and the discarded identifier. Installed once at
/// wiring time; the default policy logs at WARN and drops the identifier,
/// which is safe because a rejected identifier is simply never issued.
pub type RejectedPutHandler = Box<dyn Fn(&RingBuffer, i64) + Send + Sync>;

/// Policy applied when `take` finds the ring empty.
///
/// An observation hook (logging, metrics): the caller still receives
/// [`Error::BufferEmpty`] after it runs, so `take` stays non-blocking no
/// matter what the policy does.
///
/// [`Error::BufferEmpty`]: crate::Error::BufferEmpty
pub type RejectedTakeHandler = Box<dyn Fn(&RingBuffer) + Send + Sync>;

/// Non-blocking wake-up of the padding executor, fired by consumers that
/// cross the low-water mark.
pub type PaddingListener = Box<dyn Fn() + Send + Sync>;

/// Default put policy: log and discard.
pub(crate) fn discard_put(ring: &RingBuffer, uid: i64) {
    tracing::warn!("rejected put for uid:{uid}. {ring:?}");
}

/// Default take policy: log. The caller sees the empty-buffer error either
/// way.
pub(crate) fn warn_rejected_take(ring: &RingBuffer) {
    tracing::warn!("rejected take. {ring:?}");
}
