//! Gorilla-style XOR reconstruction of `f64` values.

use crate::bitbuffer::BitReader;
use crate::error::DecodeError;
use crate::scheme::{
    leading_and_trailing_zeros, NUM_LEADING_ZEROS_BITS, NUM_MEANINGFUL_BITS_BITS,
    OPCODE_CONTAINED_VALUE_XOR, OPCODE_ZERO_VALUE_XOR,
};

/// Float decoding state: the reference bit pattern and the previous XOR,
/// whose leading/trailing zeros define the reusable window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FloatIterator {
    pub prev_float_bits: u64,
    pub prev_xor: u64,
}

impl FloatIterator {
    /// Reads a full 64-bit pattern. The pattern also becomes the previous
    /// XOR, so a following contained-window update reuses its window.
    pub fn read_full_float(&mut self, reader: &mut BitReader) -> Result<(), DecodeError> {
        let bits = reader.read_bits(64)?;
        self.prev_float_bits = bits;
        self.prev_xor = bits;
        Ok(())
    }

    /// Reads an XOR update against the reference pattern.
    pub fn read_next_float(&mut self, reader: &mut BitReader) -> Result<(), DecodeError> {
        let mut cb = reader.read_bits(1)?;
        if cb == OPCODE_ZERO_VALUE_XOR {
            self.prev_xor = 0;
            return Ok(());
        }

        cb = (cb << 1) | reader.read_bits(1)?;
        if cb == OPCODE_CONTAINED_VALUE_XOR {
            let (leading, trailing) = leading_and_trailing_zeros(self.prev_xor);
            let meaningful = 64 - leading - trailing;
            let bits = reader.read_bits(meaningful)?;
            self.apply_xor(shift_left(bits, trailing));
            return Ok(());
        }

        let leading = reader.read_bits(NUM_LEADING_ZEROS_BITS)? as u8;
        let meaningful = reader.read_bits(NUM_MEANINGFUL_BITS_BITS)? as u8 + 1;
        if leading + meaningful > 64 {
            return Err(DecodeError::InvalidXorWindow {
                leading,
                meaningful,
            });
        }
        let trailing = 64 - leading - meaningful;
        let bits = reader.read_bits(meaningful)?;
        self.apply_xor(bits << trailing);
        Ok(())
    }

    /// Marks the value as unchanged, as a zero-XOR update would.
    #[inline]
    pub fn repeat(&mut self) {
        self.prev_xor = 0;
    }

    #[inline]
    pub fn value(&self) -> f64 {
        f64::from_bits(self.prev_float_bits)
    }

    #[inline]
    fn apply_xor(&mut self, xor: u64) {
        self.prev_xor = xor;
        self.prev_float_bits ^= xor;
    }
}

#[inline]
fn shift_left(v: u64, n: u8) -> u64 {
    if n >= 64 {
        0
    } else {
        v << n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitbuffer::BitBuffer;
    use bytes::Bytes;

    fn reader_for(buf: BitBuffer) -> BitReader {
        BitReader::new(Bytes::from(buf.into_bytes()))
    }

    #[test]
    fn test_full_float() {
        let mut buf = BitBuffer::new();
        buf.write_bits(3.25f64.to_bits(), 64);
        let mut reader = reader_for(buf);

        let mut it = FloatIterator::default();
        it.read_full_float(&mut reader).unwrap();
        assert_eq!(it.value(), 3.25);
        assert_eq!(it.prev_xor, 3.25f64.to_bits());
    }

    #[test]
    fn test_zero_xor() {
        let mut buf = BitBuffer::new();
        buf.write_bits(OPCODE_ZERO_VALUE_XOR, 1);
        let mut reader = reader_for(buf);

        let mut it = FloatIterator {
            prev_float_bits: 2.5f64.to_bits(),
            prev_xor: 0xFF00,
        };
        it.read_next_float(&mut reader).unwrap();
        assert_eq!(it.value(), 2.5);
        assert_eq!(it.prev_xor, 0);
        assert_eq!(reader.position(), 1);
    }

    #[test]
    fn test_uncontained_then_contained() {
        let a = 1.0f64.to_bits();
        let b = 1.75f64.to_bits();
        let c = 1.5f64.to_bits();

        let xor_ab = a ^ b;
        let (lead, trail) = leading_and_trailing_zeros(xor_ab);
        let meaningful = 64 - lead - trail;

        let mut buf = BitBuffer::new();
        // New window for 1.0 -> 1.75.
        buf.write_bits(0b11, 2);
        buf.write_bits(lead as u64, 6);
        buf.write_bits((meaningful - 1) as u64, 6);
        buf.write_bits(xor_ab >> trail, meaningful);
        // 1.75 -> 1.5 reusing the same window.
        let xor_bc = b ^ c;
        assert!(xor_bc.leading_zeros() as u8 >= lead && xor_bc.trailing_zeros() as u8 >= trail);
        buf.write_bits(0b10, 2);
        buf.write_bits(xor_bc >> trail, meaningful);

        let mut reader = reader_for(buf);
        let mut it = FloatIterator {
            prev_float_bits: a,
            prev_xor: 0,
        };
        it.read_next_float(&mut reader).unwrap();
        assert_eq!(it.value(), 1.75);
        it.read_next_float(&mut reader).unwrap();
        assert_eq!(it.value(), 1.5);
    }

    #[test]
    fn test_contained_after_zero_xor_reads_nothing() {
        let mut buf = BitBuffer::new();
        buf.write_bits(0b10, 2);
        let mut reader = reader_for(buf);

        let mut it = FloatIterator {
            prev_float_bits: 1.0f64.to_bits(),
            prev_xor: 0,
        };
        it.read_next_float(&mut reader).unwrap();
        assert_eq!(it.value(), 1.0);
        assert_eq!(reader.position(), 2);
    }

    #[test]
    fn test_window_overflow_is_an_error() {
        let mut buf = BitBuffer::new();
        buf.write_bits(0b11, 2);
        buf.write_bits(60, 6);
        buf.write_bits(9, 6); // 10 meaningful bits after 60 leading zeros
        buf.write_bits(0, 16);
        let mut reader = reader_for(buf);

        let mut it = FloatIterator::default();
        assert_eq!(
            it.read_next_float(&mut reader),
            Err(DecodeError::InvalidXorWindow {
                leading: 60,
                meaningful: 10
            })
        );
    }

    #[test]
    fn test_truncated_update() {
        let mut buf = BitBuffer::new();
        buf.write_bits(0b11, 2);
        let mut reader = reader_for(buf);
        let mut it = FloatIterator::default();
        assert!(matches!(
            it.read_next_float(&mut reader),
            Err(DecodeError::StreamExhausted { .. })
        ));
    }
}
