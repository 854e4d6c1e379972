//! Error types for m3tsz decoding and encoding.

use thiserror::Error;

use crate::scheme::TimeUnit;

/// Error raised while decoding an m3tsz stream.
///
/// Every variant is terminal for the iterator that produced it: the error is
/// recorded as the iterator's sticky error and `next()` keeps returning
/// `false` until the iterator is reset.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer bits remain in the source than the read requested.
    #[error("stream exhausted: requested {requested} bits, {remaining} remaining")]
    StreamExhausted { requested: u8, remaining: usize },

    /// An update-mult opcode carried a multiplier above the supported maximum.
    #[error("invalid multiplier {mult}, max is {max}")]
    InvalidMultiplier { mult: u8, max: u8 },

    /// The iterator was used after `close()`.
    #[error("iterator is closed")]
    ClosedIteratorUse,

    /// A time unit marker carried a byte that is not a known unit.
    #[error("invalid time unit byte {0}")]
    InvalidTimeUnit(u8),

    /// The current time unit has no delta-of-delta bucket table.
    #[error("time encoding scheme for time unit {0:?} doesn't exist")]
    MissingTimeScheme(TimeUnit),

    /// An annotation marker declared a non-positive length.
    #[error("unexpected annotation length {0}")]
    InvalidAnnotationLength(i64),

    /// The annotation length varint ran past ten bytes.
    #[error("annotation length varint overflows a 64-bit integer")]
    VarintOverflow,

    /// A float window update described more than 64 bits.
    #[error("invalid xor window: {leading} leading zeros with {meaningful} meaningful bits")]
    InvalidXorWindow { leading: u8, meaningful: u8 },
}

/// Error raised by the reference [`Encoder`](crate::Encoder).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// `encode()` was called after `finish()`.
    #[error("cannot encode after the stream has been finished")]
    Finished,

    /// The time unit is `None` or has no delta-of-delta bucket table.
    #[error("time unit {0:?} cannot be used to encode timestamps")]
    UnsupportedTimeUnit(TimeUnit),

    /// The delta of delta is not a whole number of the active time unit.
    #[error("delta of delta {dod_nanos}ns is not a multiple of {unit:?}")]
    UnalignedDelta { dod_nanos: i64, unit: TimeUnit },

    /// The delta of delta does not fit the widest bucket of the active unit.
    #[error("delta of delta {dod} does not fit in {bits} bits")]
    DeltaOutOfRange { dod: i64, bits: u8 },

    /// Timestamps must not move backwards.
    #[error("timestamp {timestamp} is before previous timestamp {prev}")]
    OutOfOrder { timestamp: i64, prev: i64 },
}
