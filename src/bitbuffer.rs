use bytes::Bytes;

use crate::error::DecodeError;

/// A growable bit buffer that supports writing individual bits and
/// multi-bit values, most significant bit first. Backs the reference encoder.
#[derive(Debug, Clone, Default)]
pub struct BitBuffer {
    bytes: Vec<u8>,
    /// Number of valid bits in the last byte (1..=8, or 0 if empty).
    bit_count: u8,
}

impl BitBuffer {
    /// Creates a new empty `BitBuffer`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a `BitBuffer` with the given pre-allocated capacity in bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            bit_count: 0,
        }
    }

    /// Returns the total number of bits written.
    #[inline]
    pub fn len_bits(&self) -> usize {
        if self.bytes.is_empty() {
            0
        } else {
            (self.bytes.len() - 1) * 8 + self.bit_count as usize
        }
    }

    /// Returns `true` if no bits have been written.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns a reference to the underlying byte slice. Trailing bits of
    /// the last byte are zero.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the buffer and returns the raw byte vector.
    #[inline]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Writes a single bit.
    #[inline]
    pub fn write_bit(&mut self, bit: bool) {
        if self.bit_count == 0 || self.bit_count == 8 {
            self.bytes.push(0);
            self.bit_count = 0;
        }
        if bit {
            if let Some(last) = self.bytes.last_mut() {
                *last |= 1 << (7 - self.bit_count);
            }
        }
        self.bit_count += 1;
    }

    /// Writes the lowest `n` bits of `value` (big-endian order). `n` must be <= 64.
    pub fn write_bits(&mut self, value: u64, n: u8) {
        debug_assert!(n <= 64);
        for i in (0..n).rev() {
            self.write_bit((value >> i) & 1 == 1);
        }
    }

    /// Writes eight bits at the current (possibly unaligned) position.
    #[inline]
    pub fn write_byte(&mut self, b: u8) {
        self.write_bits(b as u64, 8);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.write_byte(b);
        }
    }
}

/// A cursor for reading bits sequentially from a byte source.
///
/// Reads are most significant bit first. A failed read leaves the cursor
/// where it was, so a truncated stream keeps failing on every later read of
/// the same width.
#[derive(Debug, Clone, Default)]
pub struct BitReader {
    bytes: Bytes,
    /// Total number of valid bits.
    total_bits: usize,
    /// Current bit position (0-indexed from the start).
    pos: usize,
}

impl BitReader {
    /// Creates a new `BitReader` over `bytes`.
    pub fn new(bytes: Bytes) -> Self {
        let total_bits = bytes.len() * 8;
        Self {
            bytes,
            total_bits,
            pos: 0,
        }
    }

    /// Rebinds the reader to a new source and rewinds it.
    pub fn reset(&mut self, bytes: Bytes) {
        self.total_bits = bytes.len() * 8;
        self.bytes = bytes;
        self.pos = 0;
    }

    /// Drops the current source, leaving an empty reader.
    pub fn clear(&mut self) {
        self.reset(Bytes::new());
    }

    /// Returns the number of bits remaining.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.total_bits.saturating_sub(self.pos)
    }

    /// Returns `true` if there are no more bits to read.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.total_bits
    }

    /// Returns the current bit position.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Reads a single bit.
    #[inline]
    pub fn read_bit(&mut self) -> Result<bool, DecodeError> {
        Ok(self.read_bits(1)? == 1)
    }

    /// Reads eight bits as a byte.
    #[inline]
    pub fn read_byte(&mut self) -> Result<u8, DecodeError> {
        Ok(self.read_bits(8)? as u8)
    }

    /// Reads `n` bits as a `u64` (big-endian). `n` must be <= 64.
    pub fn read_bits(&mut self, n: u8) -> Result<u64, DecodeError> {
        let value = self.bits_at(self.pos, n)?;
        self.pos += n as usize;
        Ok(value)
    }

    /// Returns the next `n` bits without advancing the position.
    #[inline]
    pub fn peek_bits(&self, n: u8) -> Result<u64, DecodeError> {
        self.bits_at(self.pos, n)
    }

    /// Starts a lookahead transaction at the current position. Reads through
    /// the returned handle only move the real cursor once it is committed.
    #[inline]
    pub fn lookahead(&mut self) -> Lookahead<'_> {
        let pos = self.pos;
        Lookahead { reader: self, pos }
    }

    fn bits_at(&self, pos: usize, n: u8) -> Result<u64, DecodeError> {
        debug_assert!(n <= 64);
        let remaining = self.total_bits.saturating_sub(pos);
        if remaining < n as usize {
            return Err(DecodeError::StreamExhausted {
                requested: n,
                remaining,
            });
        }

        let mut value: u64 = 0;
        let mut pos = pos;
        let mut left = n as usize;
        while left > 0 {
            let byte = self.bytes[pos / 8];
            let avail = 8 - pos % 8;
            let take = avail.min(left);
            let chunk = (byte >> (avail - take)) & (((1u16 << take) - 1) as u8);
            value = (value << take) | chunk as u64;
            pos += take;
            left -= take;
        }
        Ok(value)
    }
}

/// A speculative read over a [`BitReader`].
///
/// Dropping the handle discards everything read through it.
#[derive(Debug)]
pub struct Lookahead<'a> {
    reader: &'a mut BitReader,
    pos: usize,
}

impl Lookahead<'_> {
    /// Reads `n` bits from the lookahead cursor.
    pub fn read_bits(&mut self, n: u8) -> Result<u64, DecodeError> {
        let value = self.reader.bits_at(self.pos, n)?;
        self.pos += n as usize;
        Ok(value)
    }

    /// Publishes the lookahead cursor to the underlying reader.
    #[inline]
    pub fn commit(self) {
        self.reader.pos = self.pos;
    }
}
