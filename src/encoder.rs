use bytes::Bytes;

use crate::bitbuffer::BitBuffer;
use crate::decoder::DataPoint;
use crate::error::EncodeError;
use crate::options::Options;
use crate::scheme::{
    leading_and_trailing_zeros, num_sig, Marker, TimeEncodingScheme, TimeUnit, MAX_MULT,
    MULTIPLIERS, NUM_LEADING_ZEROS_BITS, NUM_MARKER_BITS, NUM_MEANINGFUL_BITS_BITS, NUM_MULT_BITS,
    NUM_SIG_BITS, OPCODE_CONTAINED_VALUE_XOR, OPCODE_FLOAT_MODE, OPCODE_INT_MODE,
    OPCODE_NEGATIVE, OPCODE_NON_ZERO_SIG, OPCODE_NO_REPEAT, OPCODE_NO_UPDATE,
    OPCODE_NO_UPDATE_MULT, OPCODE_NO_UPDATE_SIG, OPCODE_POSITIVE, OPCODE_REPEAT,
    OPCODE_UNCONTAINED_VALUE_XOR, OPCODE_UPDATE, OPCODE_UPDATE_MULT, OPCODE_UPDATE_SIG,
    OPCODE_ZERO_SIG, OPCODE_ZERO_VALUE_XOR,
};
use crate::timestamp::initial_time_unit;

/// Scaled integers at or above this magnitude are not exact once rescaled.
const MAX_INT_MAGNITUDE: f64 = (1u64 << 52) as f64;

/// Reference m3tsz encoder.
///
/// Produces streams that [`ReaderIterator`](crate::ReaderIterator) reads back
/// bit for bit. Used to build fixtures, fileset data and benchmarks.
///
/// # Example
/// ```
/// use m3tsz::{DataPoint, Encoder, Options, TimeUnit};
///
/// let start = 1_600_000_000_000_000_000;
/// let mut enc = Encoder::new(start, Options::default());
/// enc.encode(DataPoint::new(start, 12.0), TimeUnit::Second, None).unwrap();
/// enc.encode(DataPoint::new(start + 60_000_000_000, 12.5), TimeUnit::Second, Some(b"x".as_slice())).unwrap();
/// let bytes = enc.finish();
/// assert!(!bytes.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct Encoder {
    buf: BitBuffer,
    opts: Options,
    /// Block start; written in full before the first timestamp.
    start: i64,
    /// Number of data points encoded so far.
    count: u64,
    prev_time: i64,
    /// Previous delta in nanoseconds.
    prev_delta: i64,
    time_unit: TimeUnit,
    /// Bits of the last value, whichever codec carried it.
    prev_value_bits: u64,
    /// Whether the last value went out as an XOR float.
    is_float: bool,
    prev_float_bits: u64,
    prev_xor: u64,
    int_val: f64,
    sig: u8,
    mult: u8,
    finished: bool,
}

impl Encoder {
    /// Creates an encoder for a block starting at `start_nanos`.
    pub fn new(start_nanos: i64, opts: Options) -> Self {
        Self {
            buf: BitBuffer::with_capacity(128),
            opts,
            start: start_nanos,
            count: 0,
            prev_time: start_nanos,
            prev_delta: 0,
            time_unit: initial_time_unit(start_nanos, opts.default_time_unit),
            prev_value_bits: 0,
            is_float: false,
            prev_float_bits: 0,
            prev_xor: 0,
            int_val: 0.0,
            sig: 0,
            mult: 0,
            finished: false,
        }
    }

    /// Appends a datapoint stamped in `unit`, with an optional annotation.
    ///
    /// Timestamps must not go backwards, and every delta of delta must be a
    /// whole number of `unit`s that fits the unit's widest bucket. A datapoint
    /// that changes the unit is stored with a raw nanosecond delta instead.
    /// On error the stream may hold a partial datapoint and should be
    /// discarded.
    pub fn encode(
        &mut self,
        dp: DataPoint,
        unit: TimeUnit,
        annotation: Option<&[u8]>,
    ) -> Result<(), EncodeError> {
        if self.finished {
            return Err(EncodeError::Finished);
        }
        if TimeEncodingScheme::for_unit(unit).is_none() {
            return Err(EncodeError::UnsupportedTimeUnit(unit));
        }
        if dp.timestamp_nanos < self.prev_time {
            return Err(EncodeError::OutOfOrder {
                timestamp: dp.timestamp_nanos,
                prev: self.prev_time,
            });
        }

        if self.count == 0 {
            self.buf.write_bits(self.start as u64, 64);
        }
        self.write_time(dp.timestamp_nanos, unit, annotation.unwrap_or_default())?;

        if self.count == 0 {
            self.write_first_value(dp.value);
        } else {
            self.write_next_value(dp.value);
        }

        self.count += 1;
        Ok(())
    }

    /// Writes the end-of-stream marker and returns the stream. An encoder
    /// that never saw a datapoint yields an empty stream. Later calls return
    /// the same bytes; later `encode()` calls fail.
    pub fn finish(&mut self) -> Bytes {
        if !self.finished && self.count > 0 {
            self.buf.write_bits(Marker::EndOfStream.bits(), NUM_MARKER_BITS);
        }
        self.finished = true;
        Bytes::copy_from_slice(self.buf.as_bytes())
    }

    /// The stream written so far, without an end-of-stream marker unless
    /// [`finish`](Self::finish) was called.
    pub fn as_bytes(&self) -> &[u8] {
        self.buf.as_bytes()
    }

    /// Number of bits written so far.
    pub fn len_bits(&self) -> usize {
        self.buf.len_bits()
    }

    /// Returns the number of data points encoded so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn options(&self) -> &Options {
        &self.opts
    }

    // ── timestamps ─────────────────────────────────────────────────────

    fn write_time(&mut self, t: i64, unit: TimeUnit, annotation: &[u8]) -> Result<(), EncodeError> {
        if !annotation.is_empty() {
            self.write_annotation(annotation);
        }

        let unit_changed = unit != self.time_unit;
        if unit_changed {
            self.buf.write_bits(Marker::TimeUnit.bits(), NUM_MARKER_BITS);
            self.buf.write_byte(unit.as_byte());
            self.time_unit = unit;
        }

        let delta = t.wrapping_sub(self.prev_time);
        let dod = delta.wrapping_sub(self.prev_delta);
        if unit_changed {
            // Readers restart their delta after a unit change.
            self.buf.write_bits(dod as u64, 64);
            self.prev_delta = 0;
        } else {
            self.write_delta_of_delta(dod)?;
            self.prev_delta = delta;
        }
        self.prev_time = t;
        Ok(())
    }

    fn write_delta_of_delta(&mut self, dod_nanos: i64) -> Result<(), EncodeError> {
        let unit = self.time_unit;
        let (scheme, unit_nanos) = match (TimeEncodingScheme::for_unit(unit), unit.nanos()) {
            (Some(scheme), Some(nanos)) => (scheme, nanos),
            _ => return Err(EncodeError::UnsupportedTimeUnit(unit)),
        };
        if dod_nanos % unit_nanos != 0 {
            return Err(EncodeError::UnalignedDelta { dod_nanos, unit });
        }
        let dod = dod_nanos / unit_nanos;

        if dod == 0 {
            let zero = &scheme.zero_bucket;
            self.buf.write_bits(zero.opcode, zero.num_opcode_bits);
            return Ok(());
        }

        let bucket = scheme
            .buckets
            .iter()
            .find(|b| dod >= b.min() && dod <= b.max())
            .unwrap_or(&scheme.default_bucket);
        if dod < bucket.min() || dod > bucket.max() {
            return Err(EncodeError::DeltaOutOfRange {
                dod,
                bits: bucket.num_value_bits,
            });
        }

        self.buf.write_bits(bucket.opcode, bucket.num_opcode_bits);
        self.buf.write_bits(dod as u64 & bitmask(bucket.num_value_bits), bucket.num_value_bits);
        Ok(())
    }

    fn write_annotation(&mut self, annotation: &[u8]) {
        self.buf.write_bits(Marker::Annotation.bits(), NUM_MARKER_BITS);
        // Length is stored minus one as a zigzag varint.
        let x = annotation.len() as i64 - 1;
        let mut ux = ((x << 1) ^ (x >> 63)) as u64;
        while ux >= 0x80 {
            self.buf.write_byte((ux as u8) | 0x80);
            ux >>= 7;
        }
        self.buf.write_byte(ux as u8);
        self.buf.write_bytes(annotation);
    }

    // ── values ─────────────────────────────────────────────────────────

    fn write_first_value(&mut self, value: f64) {
        let bits = value.to_bits();
        self.prev_value_bits = bits;

        if !self.opts.int_optimized {
            self.write_full_float(bits);
            return;
        }

        match self.as_scaled_int(value) {
            None => {
                self.buf.write_bits(OPCODE_FLOAT_MODE, 1);
                self.write_full_float(bits);
            }
            Some((scaled, mult)) => {
                self.buf.write_bits(OPCODE_INT_MODE, 1);
                self.write_int_update(scaled, mult);
            }
        }
    }

    fn write_next_value(&mut self, value: f64) {
        let bits = value.to_bits();

        if !self.opts.int_optimized {
            self.write_xor(bits);
            self.prev_value_bits = bits;
            return;
        }

        if bits == self.prev_value_bits {
            self.buf.write_bits(OPCODE_UPDATE, 1);
            self.buf.write_bits(OPCODE_REPEAT, 1);
            return;
        }
        self.prev_value_bits = bits;

        match self.as_scaled_int(value) {
            None if self.is_float => {
                self.buf.write_bits(OPCODE_NO_UPDATE, 1);
                self.write_xor(bits);
            }
            None => {
                self.buf.write_bits(OPCODE_UPDATE, 1);
                self.buf.write_bits(OPCODE_NO_REPEAT, 1);
                self.buf.write_bits(OPCODE_FLOAT_MODE, 1);
                self.write_full_float(bits);
            }
            Some((scaled, mult)) => {
                let diff = scaled - self.int_val;
                let needs_update =
                    self.is_float || mult != self.mult || num_sig(diff.abs() as u64) > self.sig;
                if needs_update {
                    self.buf.write_bits(OPCODE_UPDATE, 1);
                    self.buf.write_bits(OPCODE_NO_REPEAT, 1);
                    self.buf.write_bits(OPCODE_INT_MODE, 1);
                    self.write_int_update(scaled, mult);
                } else {
                    self.buf.write_bits(OPCODE_NO_UPDATE, 1);
                    self.write_int_diff(diff);
                    self.int_val = scaled;
                }
            }
        }
    }

    /// Writes the sig and mult fields followed by the diff.
    fn write_int_update(&mut self, scaled: f64, mult: u8) {
        let diff = scaled - self.int_val;
        let sig = num_sig(diff.abs() as u64);

        if sig != self.sig {
            self.buf.write_bits(OPCODE_UPDATE_SIG, 1);
            if sig == 0 {
                self.buf.write_bits(OPCODE_ZERO_SIG, 1);
            } else {
                self.buf.write_bits(OPCODE_NON_ZERO_SIG, 1);
                self.buf.write_bits((sig - 1) as u64, NUM_SIG_BITS);
            }
            self.sig = sig;
        } else {
            self.buf.write_bits(OPCODE_NO_UPDATE_SIG, 1);
        }

        if mult != self.mult {
            self.buf.write_bits(OPCODE_UPDATE_MULT, 1);
            self.buf.write_bits(mult as u64, NUM_MULT_BITS);
            self.mult = mult;
        } else {
            self.buf.write_bits(OPCODE_NO_UPDATE_MULT, 1);
        }

        self.write_int_diff(diff);
        self.int_val = scaled;
        self.is_float = false;
    }

    /// Sign bit, then the magnitude in `sig` bits. The sign opcode names the
    /// operation the reader applies: add for a non-negative diff.
    fn write_int_diff(&mut self, diff: f64) {
        let sign = if diff >= 0.0 {
            OPCODE_NEGATIVE
        } else {
            OPCODE_POSITIVE
        };
        self.buf.write_bits(sign, 1);
        self.buf.write_bits(diff.abs() as u64, self.sig);
    }

    fn write_full_float(&mut self, bits: u64) {
        self.buf.write_bits(bits, 64);
        self.prev_float_bits = bits;
        self.prev_xor = bits;
        self.is_float = true;
    }

    fn write_xor(&mut self, bits: u64) {
        let xor = bits ^ self.prev_float_bits;
        self.prev_float_bits = bits;

        if xor == 0 {
            self.buf.write_bits(OPCODE_ZERO_VALUE_XOR, 1);
            self.prev_xor = 0;
            return;
        }

        let (prev_leading, prev_trailing) = leading_and_trailing_zeros(self.prev_xor);
        let (leading, trailing) = leading_and_trailing_zeros(xor);

        if leading >= prev_leading && trailing >= prev_trailing {
            // Fits the previous window.
            let meaningful = 64 - prev_leading - prev_trailing;
            self.buf.write_bits(OPCODE_CONTAINED_VALUE_XOR, 2);
            self.buf.write_bits(xor >> prev_trailing, meaningful);
        } else {
            let meaningful = 64 - leading - trailing;
            self.buf.write_bits(OPCODE_UNCONTAINED_VALUE_XOR, 2);
            self.buf.write_bits(leading as u64, NUM_LEADING_ZEROS_BITS);
            self.buf.write_bits((meaningful - 1) as u64, NUM_MEANINGFUL_BITS_BITS);
            self.buf.write_bits(xor >> trailing, meaningful);
        }
        self.prev_xor = xor;
    }

    /// The value as an integer scaled by `10^mult`, if some legal multiplier
    /// reproduces it exactly. The current multiplier is preferred.
    fn as_scaled_int(&self, value: f64) -> Option<(f64, u8)> {
        if !value.is_finite() || (value == 0.0 && value.is_sign_negative()) {
            return None;
        }
        if !self.is_float && self.count > 0 {
            if let Some(scaled) = scale_exact(value, self.mult) {
                return Some((scaled, self.mult));
            }
        }
        (0..=MAX_MULT).find_map(|mult| scale_exact(value, mult).map(|scaled| (scaled, mult)))
    }
}

/// `value * 10^mult` if that is an integer the reader turns back into
/// exactly `value`.
fn scale_exact(value: f64, mult: u8) -> Option<f64> {
    let m = MULTIPLIERS[mult as usize];
    let scaled = (value * m).round();
    if scaled.abs() >= MAX_INT_MAGNITUDE {
        return None;
    }
    let back = if mult == 0 { scaled } else { scaled / m };
    (back.to_bits() == value.to_bits()).then_some(scaled)
}

/// Returns a bitmask with the lowest `n` bits set. Handles `n == 64` without overflow.
#[inline]
fn bitmask(n: u8) -> u64 {
    if n >= 64 {
        u64::MAX
    } else {
        (1u64 << n) - 1
    }
}
