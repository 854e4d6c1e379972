//! Delta-of-delta timestamp reconstruction, in-band markers and annotations.

use crate::bitbuffer::BitReader;
use crate::error::DecodeError;
use crate::options::Options;
use crate::scheme::{
    sign_extend, Marker, TimeEncodingScheme, TimeUnit, MARKER_OPCODE, NUM_MARKER_BITS,
    NUM_MARKER_VALUE_BITS,
};

/// Longest zigzag varint the annotation length may use.
const MAX_VARINT_LEN: usize = 10;

/// Outcome of a successful [`TimestampIterator::read_timestamp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampEvent {
    /// The first timestamp of the stream was read.
    First,
    /// A subsequent timestamp was read.
    Next,
    /// The end-of-stream marker was reached.
    EndOfStream,
}

/// Timestamp decoding state.
#[derive(Debug, Clone)]
pub struct TimestampIterator {
    pub prev_time: i64,
    /// Previous delta in nanoseconds.
    pub prev_time_delta: i64,
    pub time_unit: TimeUnit,
    /// Set while a time unit marker is being applied.
    time_unit_changed: bool,
    /// Whether the last read timestamp followed a time unit change.
    unit_changed_last: bool,
    started: bool,
    done: bool,
    annotation: Vec<u8>,
    default_time_unit: TimeUnit,
}

impl TimestampIterator {
    pub fn new(opts: &Options) -> Self {
        Self {
            prev_time: 0,
            prev_time_delta: 0,
            time_unit: TimeUnit::None,
            time_unit_changed: false,
            unit_changed_last: false,
            started: false,
            done: false,
            annotation: Vec::new(),
            default_time_unit: opts.default_time_unit,
        }
    }

    /// Zeroes all state, keeping the annotation buffer's allocation.
    pub fn reset(&mut self) {
        self.prev_time = 0;
        self.prev_time_delta = 0;
        self.time_unit = TimeUnit::None;
        self.time_unit_changed = false;
        self.unit_changed_last = false;
        self.started = false;
        self.done = false;
        self.annotation.clear();
    }

    /// Annotation attached to the last read timestamp; empty when absent.
    #[inline]
    pub fn annotation(&self) -> &[u8] {
        &self.annotation
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Whether the last read timestamp came right after a time unit change.
    #[inline]
    pub fn time_unit_changed(&self) -> bool {
        self.unit_changed_last
    }

    /// Advances by the previous delta without reading anything. Used when a
    /// fast-path token repeats both the delta and the value.
    #[inline]
    pub fn advance_unchanged(&mut self) {
        self.prev_time = self.prev_time.wrapping_add(self.prev_time_delta);
        self.annotation.clear();
        self.unit_changed_last = false;
    }

    /// Reads the next timestamp, along with any markers in front of it.
    pub fn read_timestamp(&mut self, reader: &mut BitReader) -> Result<TimestampEvent, DecodeError> {
        self.annotation.clear();
        self.unit_changed_last = false;

        let event = if !self.started {
            if reader.is_exhausted() {
                self.done = true;
                return Ok(TimestampEvent::EndOfStream);
            }
            self.read_first_timestamp(reader)?;
            self.started = true;
            TimestampEvent::First
        } else {
            self.read_next_timestamp(reader)?;
            TimestampEvent::Next
        };

        if self.done {
            return Ok(TimestampEvent::EndOfStream);
        }

        // The encoder restarts its delta after a unit change, since the old
        // delta need not be a multiple of the new unit.
        if self.time_unit_changed {
            self.prev_time_delta = 0;
            self.time_unit_changed = false;
            self.unit_changed_last = true;
        }
        Ok(event)
    }

    fn read_first_timestamp(&mut self, reader: &mut BitReader) -> Result<(), DecodeError> {
        // Always nanoseconds: the block start need not align to any unit.
        let start = reader.read_bits(64)? as i64;
        if self.time_unit == TimeUnit::None {
            self.time_unit = initial_time_unit(start, self.default_time_unit);
        }

        let dod = self.read_marker_or_delta_of_delta(reader)?;
        if self.done {
            return Ok(());
        }
        self.prev_time_delta = self.prev_time_delta.wrapping_add(dod);
        self.prev_time = start.wrapping_add(self.prev_time_delta);
        Ok(())
    }

    fn read_next_timestamp(&mut self, reader: &mut BitReader) -> Result<(), DecodeError> {
        let dod = self.read_marker_or_delta_of_delta(reader)?;
        if self.done {
            return Ok(());
        }
        self.prev_time_delta = self.prev_time_delta.wrapping_add(dod);
        self.prev_time = self.prev_time.wrapping_add(self.prev_time_delta);
        Ok(())
    }

    fn read_marker_or_delta_of_delta(&mut self, reader: &mut BitReader) -> Result<i64, DecodeError> {
        loop {
            match self.try_read_marker(reader)? {
                Some(Marker::EndOfStream) => {
                    self.done = true;
                    return Ok(0);
                }
                Some(Marker::Annotation) => self.read_annotation(reader)?,
                Some(Marker::TimeUnit) => self.read_time_unit(reader)?,
                None => return self.read_delta_of_delta(reader),
            }
        }
    }

    /// Consumes a marker if one is next; otherwise leaves the cursor alone.
    fn try_read_marker(&self, reader: &mut BitReader) -> Result<Option<Marker>, DecodeError> {
        let mut peek = reader.lookahead();
        let Ok(bits) = peek.read_bits(NUM_MARKER_BITS) else {
            return Ok(None);
        };
        if bits >> NUM_MARKER_VALUE_BITS != MARKER_OPCODE {
            return Ok(None);
        }
        let value = bits & ((1 << NUM_MARKER_VALUE_BITS) - 1);
        let marker = Marker::from_value(value);
        if marker.is_some() {
            peek.commit();
        }
        Ok(marker)
    }

    fn read_time_unit(&mut self, reader: &mut BitReader) -> Result<(), DecodeError> {
        let b = reader.read_byte()?;
        let unit = TimeUnit::from_byte(b).ok_or(DecodeError::InvalidTimeUnit(b))?;
        if unit.is_valid() && unit != self.time_unit {
            self.time_unit_changed = true;
        }
        self.time_unit = unit;
        Ok(())
    }

    fn read_annotation(&mut self, reader: &mut BitReader) -> Result<(), DecodeError> {
        // The encoder stores length - 1.
        let len = read_varint(reader)?.wrapping_add(1);
        if len <= 0 {
            return Err(DecodeError::InvalidAnnotationLength(len));
        }
        let len = len as usize;
        if reader.remaining() < len.saturating_mul(8) {
            return Err(DecodeError::StreamExhausted {
                requested: 8,
                remaining: reader.remaining(),
            });
        }
        self.annotation.clear();
        self.annotation.reserve(len);
        for _ in 0..len {
            self.annotation.push(reader.read_byte()?);
        }
        Ok(())
    }

    fn read_delta_of_delta(&mut self, reader: &mut BitReader) -> Result<i64, DecodeError> {
        if self.time_unit_changed {
            // Right after a unit change the encoder writes raw nanoseconds.
            return Ok(reader.read_bits(64)? as i64);
        }

        let scheme = TimeEncodingScheme::for_unit(self.time_unit)
            .ok_or(DecodeError::MissingTimeScheme(self.time_unit))?;
        let unit_nanos = self
            .time_unit
            .nanos()
            .ok_or(DecodeError::MissingTimeScheme(self.time_unit))?;

        let mut cb = reader.read_bits(1)?;
        if cb == scheme.zero_bucket.opcode {
            return Ok(0);
        }

        let mut bucket = &scheme.default_bucket;
        for candidate in &scheme.buckets {
            cb = (cb << 1) | reader.read_bits(1)?;
            if cb == candidate.opcode {
                bucket = candidate;
                break;
            }
        }

        let raw = reader.read_bits(bucket.num_value_bits)?;
        let dod = sign_extend(raw, bucket.num_value_bits);
        Ok(dod.wrapping_mul(unit_nanos))
    }
}

/// The unit assumed for a stream whose block start is `start`: the default
/// unit if the start is aligned to it, else none.
pub fn initial_time_unit(start: i64, default_unit: TimeUnit) -> TimeUnit {
    match default_unit.nanos() {
        Some(nanos) if start % nanos == 0 => default_unit,
        _ => TimeUnit::None,
    }
}

/// Reads a zigzag-encoded LEB128 varint from unaligned bytes.
fn read_varint(reader: &mut BitReader) -> Result<i64, DecodeError> {
    let mut ux: u64 = 0;
    let mut shift = 0u32;
    for i in 0..MAX_VARINT_LEN {
        let b = reader.read_byte()?;
        if b < 0x80 {
            if i == MAX_VARINT_LEN - 1 && b > 1 {
                return Err(DecodeError::VarintOverflow);
            }
            ux |= (b as u64) << shift;
            let x = (ux >> 1) as i64;
            return Ok(if ux & 1 != 0 { !x } else { x });
        }
        ux |= ((b & 0x7F) as u64) << shift;
        shift += 7;
    }
    Err(DecodeError::VarintOverflow)
}
