use core::fmt;

use crate::error::{Error, Result};

/// Bit partition of a 64-bit identifier.
///
/// An identifier packs three fields below a fixed zero sign bit, from most
/// to least significant:
///
/// ```text
///  Bit Index:  high bits                               low bits
///              +------+---------------+------------+--------------+
///  Field:      | sign | delta seconds | worker id  | sequence     |
///              +------+---------------+------------+--------------+
///              |  1   |      T        |     W      |      S       |
///              |<------------- MSB -- 64 bits -- LSB ------------>|
/// ```
///
/// `1 + T + W + S` must equal 64. The widths are chosen once at startup,
/// so the layout is a runtime value rather than a type-level constant:
/// the same deployment can trade timestamp range for worker count or
/// per-second throughput without recompiling.
///
/// # Example
/// ```
/// use ringflake::BitLayout;
///
/// let layout = BitLayout::new(28, 22, 13).unwrap();
/// let uid = layout.allocate(3, 5, 7);
/// assert_eq!(layout.parse(uid), (3, 5, 7));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitLayout {
    timestamp_bits: u32,
    worker_bits: u32,
    sequence_bits: u32,

    max_delta_seconds: i64,
    max_worker_id: i64,
    max_sequence: i64,

    timestamp_shift: u32,
    worker_shift: u32,
}

impl BitLayout {
    /// Total width of an identifier.
    pub const TOTAL_BITS: u32 = 64;

    /// The sign bit is fixed to zero to keep identifiers nonnegative.
    pub const SIGN_BITS: u32 = 1;

    /// Creates a layout from the three field widths.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] unless the widths, plus the sign
    /// bit, cover exactly 64 bits. A zero `sequence_bits` is permitted:
    /// it degenerates to one identifier per second.
    pub fn new(timestamp_bits: u32, worker_bits: u32, sequence_bits: u32) -> Result<Self> {
        let allocated = Self::SIGN_BITS + timestamp_bits + worker_bits + sequence_bits;
        if allocated != Self::TOTAL_BITS {
            return Err(Error::InvalidConfig {
                reason: format!(
                    "bit widths must cover exactly {} bits, got 1 + {timestamp_bits} + \
                     {worker_bits} + {sequence_bits} = {allocated}",
                    Self::TOTAL_BITS
                ),
            });
        }

        Ok(Self {
            timestamp_bits,
            worker_bits,
            sequence_bits,
            max_delta_seconds: !(-1_i64 << timestamp_bits),
            max_worker_id: !(-1_i64 << worker_bits),
            max_sequence: !(-1_i64 << sequence_bits),
            timestamp_shift: worker_bits + sequence_bits,
            worker_shift: sequence_bits,
        })
    }

    /// Packs the three fields into one identifier.
    ///
    /// The fields are OR-ed after shifting, with no masking: callers are
    /// responsible for pre-validating that each value fits its width. The
    /// sign bit stays clear for any in-range inputs.
    pub const fn allocate(&self, delta_seconds: i64, worker_id: i64, sequence: i64) -> i64 {
        (delta_seconds << self.timestamp_shift) | (worker_id << self.worker_shift) | sequence
    }

    /// Recovers `(delta_seconds, worker_id, sequence)` from an identifier.
    pub const fn parse(&self, uid: i64) -> (i64, i64, i64) {
        let sequence = uid & self.max_sequence;
        let worker_id = (uid >> self.worker_shift) & self.max_worker_id;
        let delta_seconds = (uid >> self.timestamp_shift) & self.max_delta_seconds;
        (delta_seconds, worker_id, sequence)
    }

    /// Width of the timestamp field.
    pub const fn timestamp_bits(&self) -> u32 {
        self.timestamp_bits
    }

    /// Width of the worker-id field.
    pub const fn worker_bits(&self) -> u32 {
        self.worker_bits
    }

    /// Width of the sequence field.
    pub const fn sequence_bits(&self) -> u32 {
        self.sequence_bits
    }

    /// Largest representable number of seconds since the epoch.
    pub const fn max_delta_seconds(&self) -> i64 {
        self.max_delta_seconds
    }

    /// Largest representable worker id.
    pub const fn max_worker_id(&self) -> i64 {
        self.max_worker_id
    }

    /// Largest representable intra-second sequence.
    pub const fn max_sequence(&self) -> i64 {
        self.max_sequence
    }

    /// Left shift applied to the timestamp field.
    pub const fn timestamp_shift(&self) -> u32 {
        self.timestamp_shift
    }

    /// Left shift applied to the worker-id field.
    pub const fn worker_shift(&self) -> u32 {
        self.worker_shift
    }
}

/// Decoded view of an identifier, for diagnostics.
///
/// `timestamp` is absolute wall-clock seconds (the configured epoch plus
/// the embedded delta). The `Display` rendering is a JSON-shaped string
/// meant for log lines and debugging; it is not a stable machine format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParsedUid {
    pub uid: i64,
    /// Seconds since the Unix epoch at which the identifier was minted,
    /// per the generator's logical clock.
    pub timestamp: i64,
    pub worker_id: i64,
    pub sequence: i64,
}

impl fmt::Display for ParsedUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{\"UID\":\"{}\",\"timestamp\":\"{}\",\"workerId\":\"{}\",\"sequence\":\"{}\"}}",
            self.uid, self.timestamp, self.worker_id, self.sequence
        )
    }
}
