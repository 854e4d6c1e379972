use std::fmt;

use bytes::Bytes;

use crate::bitbuffer::BitReader;
use crate::error::DecodeError;
use crate::float::FloatIterator;
use crate::int::IntIterator;
use crate::options::Options;
use crate::scheme::{
    TimeUnit, FAST_PATH_FLOAT, FAST_PATH_FLOAT_BITS, FAST_PATH_INT_OPTIMIZED,
    FAST_PATH_INT_OPTIMIZED_BITS, OPCODE_FLOAT_MODE, OPCODE_REPEAT, OPCODE_UPDATE,
};
use crate::timestamp::{TimestampEvent, TimestampIterator};

/// A single time-series data point: a Unix timestamp in nanoseconds and an
/// f64 value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DataPoint {
    pub timestamp_nanos: i64,
    pub value: f64,
}

impl DataPoint {
    /// Creates a new `DataPoint`.
    pub fn new(timestamp_nanos: i64, value: f64) -> Self {
        Self {
            timestamp_nanos,
            value,
        }
    }
}

impl fmt::Display for DataPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{timestamp: {}, value: {}}}", self.timestamp_nanos, self.value)
    }
}

/// Lifecycle of a [`ReaderIterator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterState {
    /// Bound to a source, nothing decoded yet.
    Fresh,
    /// At least one datapoint decoded; more may follow.
    Reading,
    /// The end-of-stream marker was reached.
    Done,
    /// A decode error was recorded; see [`ReaderIterator::err`].
    Errored,
    /// `close()` was called. Only `reset()` leaves this state.
    Closed,
}

/// Which codec carries the values of the stream right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueMode {
    Int,
    Float,
}

/// Pull-based decoder over one m3tsz stream.
///
/// Call [`next`](Self::next) until it returns `false`, reading each datapoint
/// through [`current`](Self::current), then check [`err`](Self::err) to tell a
/// clean end from a failure.
///
/// # Example
/// ```
/// use m3tsz::{DataPoint, Encoder, Options, ReaderIterator, TimeUnit};
///
/// let start = 1_600_000_000_000_000_000;
/// let mut enc = Encoder::new(start, Options::default());
/// enc.encode(DataPoint::new(start, 12.5), TimeUnit::Second, None).unwrap();
/// enc.encode(DataPoint::new(start + 10_000_000_000, 13.0), TimeUnit::Second, None).unwrap();
/// let bytes = enc.finish();
///
/// let mut iter = ReaderIterator::new(bytes, Options::default());
/// let mut values = Vec::new();
/// while iter.next() {
///     let (dp, _unit, _annotation) = iter.current();
///     values.push(dp.value);
/// }
/// assert!(iter.err().is_none());
/// assert_eq!(values, vec![12.5, 13.0]);
/// ```
#[derive(Debug)]
pub struct ReaderIterator {
    reader: BitReader,
    opts: Options,
    state: IterState,
    err: Option<DecodeError>,
    ts: TimestampIterator,
    float: FloatIterator,
    int: IntIterator,
    mode: ValueMode,
    curr: DataPoint,
}

impl ReaderIterator {
    /// Creates an iterator over `source`.
    pub fn new(source: impl Into<Bytes>, opts: Options) -> Self {
        Self {
            reader: BitReader::new(source.into()),
            opts,
            state: IterState::Fresh,
            err: None,
            ts: TimestampIterator::new(&opts),
            float: FloatIterator::default(),
            int: IntIterator::default(),
            mode: ValueMode::Int,
            curr: DataPoint::default(),
        }
    }

    /// Moves to the next datapoint. Returns `false` at the end of the stream,
    /// on error, or once closed; it then keeps returning `false` until
    /// [`reset`](Self::reset).
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        match self.state {
            IterState::Done | IterState::Errored | IterState::Closed => return false,
            IterState::Fresh | IterState::Reading => {}
        }

        match self.advance() {
            Ok(true) => {
                self.state = IterState::Reading;
                true
            }
            Ok(false) => {
                self.state = IterState::Done;
                false
            }
            Err(e) => {
                self.err = Some(e);
                self.state = IterState::Errored;
                false
            }
        }
    }

    /// The last decoded datapoint, its time unit and its annotation.
    ///
    /// The annotation borrows the iterator's buffer, which the next call to
    /// `next()` overwrites; copy it to keep it.
    #[inline]
    pub fn current(&self) -> (DataPoint, TimeUnit, &[u8]) {
        (self.curr, self.ts.time_unit, self.ts.annotation())
    }

    /// The sticky error, if decoding failed or the iterator is closed.
    #[inline]
    pub fn err(&self) -> Option<&DecodeError> {
        self.err.as_ref()
    }

    #[inline]
    pub fn state(&self) -> IterState {
        self.state
    }

    #[inline]
    pub fn options(&self) -> &Options {
        &self.opts
    }

    /// Rebinds the iterator to `source` and clears all decoding state. The
    /// options are kept.
    pub fn reset(&mut self, source: impl Into<Bytes>) {
        self.reader.reset(source.into());
        self.state = IterState::Fresh;
        self.err = None;
        self.ts.reset();
        self.float = FloatIterator::default();
        self.int = IntIterator::default();
        self.mode = ValueMode::Int;
        self.curr = DataPoint::default();
    }

    /// Closes the iterator. Later calls to `next()` return `false` and
    /// `err()` reports [`DecodeError::ClosedIteratorUse`]. Idempotent.
    pub fn close(&mut self) {
        if self.state == IterState::Closed {
            return;
        }
        self.state = IterState::Closed;
        self.err = Some(DecodeError::ClosedIteratorUse);
        // Let go of the source so a pooled iterator does not pin it.
        self.reader.clear();
    }

    /// Decodes one datapoint; `Ok(false)` on a clean end of stream.
    fn advance(&mut self) -> Result<bool, DecodeError> {
        if self.state == IterState::Reading && !self.ts.time_unit_changed() && self.try_fast_path() {
            return Ok(true);
        }

        match self.ts.read_timestamp(&mut self.reader)? {
            TimestampEvent::EndOfStream => return Ok(false),
            TimestampEvent::First => self.read_first_value()?,
            TimestampEvent::Next => self.read_next_value()?,
        }

        self.curr = DataPoint::new(self.ts.prev_time, self.value());
        Ok(true)
    }

    /// Consumes the shortest token, "delta and value unchanged", if it is
    /// next in the stream.
    fn try_fast_path(&mut self) -> bool {
        let (token, width) = if self.opts.int_optimized {
            (FAST_PATH_INT_OPTIMIZED, FAST_PATH_INT_OPTIMIZED_BITS)
        } else {
            (FAST_PATH_FLOAT, FAST_PATH_FLOAT_BITS)
        };

        let mut peek = self.reader.lookahead();
        match peek.read_bits(width) {
            Ok(bits) if bits == token => peek.commit(),
            _ => return false,
        }

        self.ts.advance_unchanged();
        if !self.opts.int_optimized {
            // Same effect as the zero-XOR opcode the token stands for.
            self.float.repeat();
        }
        self.curr.timestamp_nanos = self.ts.prev_time;
        true
    }

    fn read_first_value(&mut self) -> Result<(), DecodeError> {
        if !self.opts.int_optimized {
            self.mode = ValueMode::Float;
            return self.float.read_full_float(&mut self.reader);
        }

        if self.reader.read_bits(1)? == OPCODE_FLOAT_MODE {
            self.mode = ValueMode::Float;
            return self.float.read_full_float(&mut self.reader);
        }

        self.mode = ValueMode::Int;
        self.int.read_sig_mult(&mut self.reader)?;
        self.int.read_int_val_diff(&mut self.reader)
    }

    fn read_next_value(&mut self) -> Result<(), DecodeError> {
        if !self.opts.int_optimized {
            return self.float.read_next_float(&mut self.reader);
        }

        if self.reader.read_bits(1)? == OPCODE_UPDATE {
            if self.reader.read_bits(1)? == OPCODE_REPEAT {
                return Ok(());
            }

            if self.reader.read_bits(1)? == OPCODE_FLOAT_MODE {
                self.float.read_full_float(&mut self.reader)?;
                self.mode = ValueMode::Float;
                return Ok(());
            }

            self.int.read_sig_mult(&mut self.reader)?;
            self.int.read_int_val_diff(&mut self.reader)?;
            self.mode = ValueMode::Int;
            return Ok(());
        }

        match self.mode {
            ValueMode::Float => self.float.read_next_float(&mut self.reader),
            ValueMode::Int => self.int.read_int_val_diff(&mut self.reader),
        }
    }

    #[inline]
    fn value(&self) -> f64 {
        match self.mode {
            ValueMode::Float => self.float.value(),
            ValueMode::Int => self.int.value(),
        }
    }
}

/// An owned copy of one decoded datapoint.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPoint {
    pub dp: DataPoint,
    pub unit: TimeUnit,
    /// `None` when no annotation was attached to this datapoint.
    pub annotation: Option<Vec<u8>>,
}

/// One-shot decoding helpers.
pub struct Decoder;

impl Decoder {
    /// Decodes every datapoint of `source` into owned values.
    pub fn decode(source: impl Into<Bytes>, opts: Options) -> Result<Vec<DecodedPoint>, DecodeError> {
        let mut iter = ReaderIterator::new(source, opts);
        let mut points = Vec::new();
        while iter.next() {
            let (dp, unit, annotation) = iter.current();
            points.push(DecodedPoint {
                dp,
                unit,
                annotation: (!annotation.is_empty()).then(|| annotation.to_vec()),
            });
        }
        match iter.err() {
            Some(e) => Err(e.clone()),
            None => Ok(points),
        }
    }

    /// Decodes every datapoint of `source`, dropping units and annotations.
    pub fn decode_datapoints(
        source: impl Into<Bytes>,
        opts: Options,
    ) -> Result<Vec<DataPoint>, DecodeError> {
        Ok(Self::decode(source, opts)?.into_iter().map(|p| p.dp).collect())
    }
}
