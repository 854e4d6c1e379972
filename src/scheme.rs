//! Wire-format tables for m3tsz streams.
//!
//! These values must match the encoder that produced the persisted data
//! exactly: a mismatch does not fail, it silently corrupts every datapoint
//! after the first.
//!
//! | Item | Encoding |
//! |------|----------|
//! | Marker | `100000000` + 2-bit marker value |
//! | Zero delta-of-delta | `0` |
//! | Small delta-of-delta | `10` + 7 bits |
//! | Medium delta-of-delta | `110` + 9 bits |
//! | Large delta-of-delta | `1110` + 12 bits |
//! | Default delta-of-delta | `1111` + 32 bits (s, ms) or 64 bits (µs, ns) |
//! | Float XOR | `0` zero, `10` contained window, `11` + 6 + 6 bits new window |
//! | Int sig | 6 bits holding `sig - 1` |
//! | Int mult | 3 bits, at most [`MAX_MULT`] |

use serde::{Deserialize, Serialize};

// ── Value opcodes ──────────────────────────────────────────────────────

pub const OPCODE_ZERO_SIG: u64 = 0x0;
pub const OPCODE_NON_ZERO_SIG: u64 = 0x1;
pub const OPCODE_UPDATE: u64 = 0x0;
pub const OPCODE_NO_UPDATE: u64 = 0x1;
pub const OPCODE_UPDATE_SIG: u64 = 0x1;
pub const OPCODE_NO_UPDATE_SIG: u64 = 0x0;
pub const OPCODE_UPDATE_MULT: u64 = 0x1;
pub const OPCODE_NO_UPDATE_MULT: u64 = 0x0;
pub const OPCODE_POSITIVE: u64 = 0x0;
pub const OPCODE_NEGATIVE: u64 = 0x1;
pub const OPCODE_REPEAT: u64 = 0x1;
pub const OPCODE_NO_REPEAT: u64 = 0x0;
pub const OPCODE_FLOAT_MODE: u64 = 0x1;
pub const OPCODE_INT_MODE: u64 = 0x0;

pub const OPCODE_ZERO_VALUE_XOR: u64 = 0x0;
pub const OPCODE_CONTAINED_VALUE_XOR: u64 = 0x2;
pub const OPCODE_UNCONTAINED_VALUE_XOR: u64 = 0x3;

/// Width of the `sig - 1` field.
pub const NUM_SIG_BITS: u8 = 6;
/// Width of the multiplier field.
pub const NUM_MULT_BITS: u8 = 3;
/// Largest multiplier a stream may carry; the scale is `10^mult`.
pub const MAX_MULT: u8 = 6;

pub const NUM_LEADING_ZEROS_BITS: u8 = 6;
pub const NUM_MEANINGFUL_BITS_BITS: u8 = 6;

/// `10^mult` for every legal multiplier.
pub const MULTIPLIERS: [f64; MAX_MULT as usize + 1] =
    [1.0, 10.0, 100.0, 1_000.0, 10_000.0, 100_000.0, 1_000_000.0];

/// Token for "timestamp delta and value unchanged" in int-optimized streams:
/// zero delta-of-delta bucket, update, repeat.
pub const FAST_PATH_INT_OPTIMIZED: u64 = 0b001;
pub const FAST_PATH_INT_OPTIMIZED_BITS: u8 = 3;
/// Token for the same in float-only streams: zero bucket, zero XOR.
pub const FAST_PATH_FLOAT: u64 = 0b00;
pub const FAST_PATH_FLOAT_BITS: u8 = 2;

// ── Time units ─────────────────────────────────────────────────────────

/// Time unit byte carried by time unit markers.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum TimeUnit {
    #[default]
    None = 0,
    Second = 1,
    Millisecond = 2,
    Microsecond = 3,
    Nanosecond = 4,
    Minute = 5,
    Hour = 6,
    Day = 7,
    Year = 8,
}

impl TimeUnit {
    /// Parses a wire byte; `None` for bytes outside the unit table.
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0 => Self::None,
            1 => Self::Second,
            2 => Self::Millisecond,
            3 => Self::Microsecond,
            4 => Self::Nanosecond,
            5 => Self::Minute,
            6 => Self::Hour,
            7 => Self::Day,
            8 => Self::Year,
            _ => return None,
        })
    }

    #[inline]
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Length of one unit in nanoseconds, `None` for [`TimeUnit::None`].
    pub fn nanos(self) -> Option<i64> {
        match self {
            Self::None => None,
            Self::Second => Some(1_000_000_000),
            Self::Millisecond => Some(1_000_000),
            Self::Microsecond => Some(1_000),
            Self::Nanosecond => Some(1),
            Self::Minute => Some(60 * 1_000_000_000),
            Self::Hour => Some(3_600 * 1_000_000_000),
            Self::Day => Some(86_400 * 1_000_000_000),
            Self::Year => Some(365 * 86_400 * 1_000_000_000),
        }
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::None
    }
}

// ── Delta-of-delta buckets ─────────────────────────────────────────────

/// One prefix-code bucket of a timestamp encoding scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBucket {
    pub opcode: u64,
    pub num_opcode_bits: u8,
    pub num_value_bits: u8,
}

impl TimeBucket {
    const fn new(opcode: u64, num_opcode_bits: u8, num_value_bits: u8) -> Self {
        Self {
            opcode,
            num_opcode_bits,
            num_value_bits,
        }
    }

    /// Smallest delta-of-delta (in units) this bucket can hold.
    pub fn min(&self) -> i64 {
        if self.num_value_bits == 0 {
            0
        } else if self.num_value_bits >= 64 {
            i64::MIN
        } else {
            -(1i64 << (self.num_value_bits - 1))
        }
    }

    /// Largest delta-of-delta (in units) this bucket can hold.
    pub fn max(&self) -> i64 {
        if self.num_value_bits == 0 {
            0
        } else if self.num_value_bits >= 64 {
            i64::MAX
        } else {
            (1i64 << (self.num_value_bits - 1)) - 1
        }
    }
}

/// Prefix-code table for delta-of-delta values of one time unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeEncodingScheme {
    pub zero_bucket: TimeBucket,
    pub buckets: [TimeBucket; 3],
    pub default_bucket: TimeBucket,
}

impl TimeEncodingScheme {
    const fn new(bucket_value_bits: [u8; 3], default_value_bits: u8) -> Self {
        Self {
            zero_bucket: TimeBucket::new(0b0, 1, 0),
            buckets: [
                TimeBucket::new(0b10, 2, bucket_value_bits[0]),
                TimeBucket::new(0b110, 3, bucket_value_bits[1]),
                TimeBucket::new(0b1110, 4, bucket_value_bits[2]),
            ],
            default_bucket: TimeBucket::new(0b1111, 4, default_value_bits),
        }
    }

    /// Returns the table used for `unit`, if the unit can carry compact deltas.
    pub fn for_unit(unit: TimeUnit) -> Option<&'static TimeEncodingScheme> {
        match unit {
            TimeUnit::Second => Some(&SECOND_SCHEME),
            TimeUnit::Millisecond => Some(&MILLISECOND_SCHEME),
            TimeUnit::Microsecond => Some(&MICROSECOND_SCHEME),
            TimeUnit::Nanosecond => Some(&NANOSECOND_SCHEME),
            _ => None,
        }
    }
}

static SECOND_SCHEME: TimeEncodingScheme = TimeEncodingScheme::new([7, 9, 12], 32);
static MILLISECOND_SCHEME: TimeEncodingScheme = TimeEncodingScheme::new([7, 9, 12], 32);
static MICROSECOND_SCHEME: TimeEncodingScheme = TimeEncodingScheme::new([7, 9, 12], 64);
static NANOSECOND_SCHEME: TimeEncodingScheme = TimeEncodingScheme::new([7, 9, 12], 64);

// ── Markers ────────────────────────────────────────────────────────────

pub const MARKER_OPCODE: u64 = 0x100;
pub const NUM_MARKER_OPCODE_BITS: u8 = 9;
pub const NUM_MARKER_VALUE_BITS: u8 = 2;
/// Opcode plus value: the width peeked when probing for a marker.
pub const NUM_MARKER_BITS: u8 = NUM_MARKER_OPCODE_BITS + NUM_MARKER_VALUE_BITS;

/// In-band markers interleaved with timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    EndOfStream = 0,
    Annotation = 1,
    TimeUnit = 2,
}

impl Marker {
    pub fn from_value(v: u64) -> Option<Self> {
        match v {
            0 => Some(Self::EndOfStream),
            1 => Some(Self::Annotation),
            2 => Some(Self::TimeUnit),
            _ => None,
        }
    }

    /// The full opcode-plus-value bit pattern for this marker.
    #[inline]
    pub fn bits(self) -> u64 {
        (MARKER_OPCODE << NUM_MARKER_VALUE_BITS) | self as u64
    }
}

/// Sign-extend an `n`-bit value stored in a `u64` to a full `i64`.
#[inline]
pub fn sign_extend(value: u64, bits: u8) -> i64 {
    if bits == 0 {
        return 0;
    }
    if bits >= 64 {
        return value as i64;
    }
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

/// Leading and trailing zero counts of an XOR; a zero XOR has no window.
#[inline]
pub fn leading_and_trailing_zeros(v: u64) -> (u8, u8) {
    if v == 0 {
        return (64, 0);
    }
    (v.leading_zeros() as u8, v.trailing_zeros() as u8)
}

/// Number of significant bits needed to hold `v`.
#[inline]
pub fn num_sig(v: u64) -> u8 {
    (64 - v.leading_zeros()) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_ranges() {
        let scheme = TimeEncodingScheme::for_unit(TimeUnit::Second).unwrap();
        assert_eq!(scheme.buckets[0].min(), -64);
        assert_eq!(scheme.buckets[0].max(), 63);
        assert_eq!(scheme.buckets[1].min(), -256);
        assert_eq!(scheme.buckets[1].max(), 255);
        assert_eq!(scheme.buckets[2].min(), -2048);
        assert_eq!(scheme.buckets[2].max(), 2047);
        assert_eq!(scheme.buckets[2].opcode, 0b1110);
        assert_eq!(scheme.default_bucket.opcode, 0b1111);
        assert_eq!(scheme.default_bucket.num_opcode_bits, 4);
        assert_eq!(scheme.default_bucket.num_value_bits, 32);

        let scheme = TimeEncodingScheme::for_unit(TimeUnit::Nanosecond).unwrap();
        assert_eq!(scheme.default_bucket.min(), i64::MIN);
        assert_eq!(scheme.default_bucket.max(), i64::MAX);
    }

    #[test]
    fn test_no_scheme_for_coarse_units() {
        assert!(TimeEncodingScheme::for_unit(TimeUnit::None).is_none());
        assert!(TimeEncodingScheme::for_unit(TimeUnit::Minute).is_none());
        assert!(TimeEncodingScheme::for_unit(TimeUnit::Year).is_none());
    }

    #[test]
    fn test_marker_bits() {
        assert_eq!(Marker::EndOfStream.bits(), 0b100_0000_0000);
        assert_eq!(Marker::Annotation.bits(), 0b100_0000_0001);
        assert_eq!(Marker::TimeUnit.bits(), 0b100_0000_0010);
        assert_eq!(Marker::from_value(3), None);
    }

    #[test]
    fn test_time_unit_bytes() {
        for b in 0..=8u8 {
            assert_eq!(TimeUnit::from_byte(b).unwrap().as_byte(), b);
        }
        assert_eq!(TimeUnit::from_byte(9), None);
        assert_eq!(TimeUnit::Second.nanos(), Some(1_000_000_000));
        assert_eq!(TimeUnit::None.nanos(), None);
    }

    #[test]
    fn test_sign_extend() {
        assert_eq!(sign_extend(0x7F, 7), -1);
        assert_eq!(sign_extend(0x3F, 7), 63);
        assert_eq!(sign_extend(0x40, 7), -64);
        assert_eq!(sign_extend(u64::MAX, 64), -1);
    }

    #[test]
    fn test_zero_counts() {
        assert_eq!(leading_and_trailing_zeros(0), (64, 0));
        assert_eq!(leading_and_trailing_zeros(1), (63, 0));
        assert_eq!(leading_and_trailing_zeros(0x8000_0000_0000_0000), (0, 63));
        assert_eq!(num_sig(0), 0);
        assert_eq!(num_sig(1), 1);
        assert_eq!(num_sig(u64::MAX), 64);
    }
}
