//! Adaptive integer-diff reconstruction with a decimal multiplier.

use crate::bitbuffer::BitReader;
use crate::error::DecodeError;
use crate::scheme::{
    MAX_MULT, MULTIPLIERS, NUM_MULT_BITS, NUM_SIG_BITS, OPCODE_NEGATIVE, OPCODE_UPDATE_MULT,
    OPCODE_UPDATE_SIG, OPCODE_ZERO_SIG,
};

/// Integer decoding state.
///
/// `int_val` is kept as an `f64` like the encoder's accumulator, so the
/// reconstructed value matches it bit for bit once rescaled.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IntIterator {
    pub int_val: f64,
    /// Significant bits per diff, `0..=64`.
    pub sig: u8,
    /// Decimal scale index, `0..=MAX_MULT`.
    pub mult: u8,
}

impl IntIterator {
    /// Reads the optional sig and mult updates that precede a diff.
    pub fn read_sig_mult(&mut self, reader: &mut BitReader) -> Result<(), DecodeError> {
        if reader.read_bits(1)? == OPCODE_UPDATE_SIG {
            if reader.read_bits(1)? == OPCODE_ZERO_SIG {
                self.sig = 0;
            } else {
                self.sig = reader.read_bits(NUM_SIG_BITS)? as u8 + 1;
            }
        }

        if reader.read_bits(1)? == OPCODE_UPDATE_MULT {
            let mult = reader.read_bits(NUM_MULT_BITS)? as u8;
            if mult > MAX_MULT {
                return Err(DecodeError::InvalidMultiplier {
                    mult,
                    max: MAX_MULT,
                });
            }
            self.mult = mult;
        }
        Ok(())
    }

    /// Reads one signed diff of `sig` bits and folds it into `int_val`.
    pub fn read_int_val_diff(&mut self, reader: &mut BitReader) -> Result<(), DecodeError> {
        if self.sig == 64 {
            return self.read_int_val_diff_wide(reader);
        }

        // Sign and magnitude in one read.
        let mut bits = reader.read_bits(self.sig + 1)?;
        let mut sign = -1.0;
        if bits >> self.sig == OPCODE_NEGATIVE {
            sign = 1.0;
            bits ^= 1 << self.sig;
        }
        self.int_val += sign * bits as f64;
        Ok(())
    }

    /// A 64-bit magnitude plus its sign does not fit one read.
    fn read_int_val_diff_wide(&mut self, reader: &mut BitReader) -> Result<(), DecodeError> {
        let mut sign = -1.0;
        if reader.read_bits(1)? == OPCODE_NEGATIVE {
            sign = 1.0;
        }
        self.int_val += sign * reader.read_bits(64)? as f64;
        Ok(())
    }

    /// The accumulator rescaled by the current multiplier.
    #[inline]
    pub fn value(&self) -> f64 {
        if self.mult == 0 {
            return self.int_val;
        }
        self.int_val / MULTIPLIERS[self.mult as usize]
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
    fn test_sig_and_mult_update() {
        let mut buf = BitBuffer::new();
        buf.write_bit(true); // update sig
        buf.write_bit(true); // non-zero sig
        buf.write_bits(9, NUM_SIG_BITS); // sig = 10
        buf.write_bit(true); // update mult
        buf.write_bits(3, NUM_MULT_BITS);
        let mut reader = reader_for(buf);

        let mut it = IntIterator::default();
        it.read_sig_mult(&mut reader).unwrap();
        assert_eq!(it.sig, 10);
        assert_eq!(it.mult, 3);
    }

    #[test]
    fn test_zero_sig_update_keeps_mult() {
        let mut buf = BitBuffer::new();
        buf.write_bit(true);
        buf.write_bit(false); // zero sig
        buf.write_bit(false); // no mult update
        let mut reader = reader_for(buf);

        let mut it = IntIterator {
            int_val: 5.0,
            sig: 12,
            mult: 2,
        };
        it.read_sig_mult(&mut reader).unwrap();
        assert_eq!(it.sig, 0);
        assert_eq!(it.mult, 2);
        assert_eq!(it.int_val, 5.0);
    }

    #[test]
    fn test_multiplier_above_max_is_fatal() {
        let mut buf = BitBuffer::new();
        buf.write_bit(false); // no sig update
        buf.write_bit(true); // update mult
        buf.write_bits(7, NUM_MULT_BITS);
        let mut reader = reader_for(buf);

        let mut it = IntIterator {
            mult: 4,
            ..Default::default()
        };
        assert_eq!(
            it.read_sig_mult(&mut reader),
            Err(DecodeError::InvalidMultiplier { mult: 7, max: 6 })
        );
        assert_eq!(it.mult, 4);
    }

    #[test]
    fn test_diff_sign_handling() {
        let mut buf = BitBuffer::new();
        // sig = 4: sign bit then 4 magnitude bits.
        buf.write_bits(0b1_0101, 5); // +5
        buf.write_bits(0b0_0011, 5); // -3
        let mut reader = reader_for(buf);

        let mut it = IntIterator {
            int_val: 10.0,
            sig: 4,
            mult: 0,
        };
        it.read_int_val_diff(&mut reader).unwrap();
        assert_eq!(it.int_val, 15.0);
        it.read_int_val_diff(&mut reader).unwrap();
        assert_eq!(it.int_val, 12.0);
    }

    #[test]
    fn test_zero_sig_reads_only_sign() {
        let mut buf = BitBuffer::new();
        buf.write_bit(true);
        let mut reader = reader_for(buf);

        let mut it = IntIterator {
            int_val: 7.0,
            ..Default::default()
        };
        it.read_int_val_diff(&mut reader).unwrap();
        assert_eq!(it.int_val, 7.0);
        assert_eq!(reader.position(), 1);
    }

    #[test]
    fn test_sig_64_uses_two_reads() {
        let mut buf = BitBuffer::new();
        buf.write_bit(true); // sign: add
        buf.write_bits(1 << 40, 64);
        let bytes = buf.into_bytes();
        assert_eq!(bytes.len(), 9); // 65 bits

        let mut reader = BitReader::new(Bytes::from(bytes));
        let mut it = IntIterator {
            sig: 64,
            ..Default::default()
        };
        it.read_int_val_diff(&mut reader).unwrap();
        assert_eq!(it.int_val, (1u64 << 40) as f64);
        assert_eq!(reader.position(), 65);
    }

    #[test]
    fn test_value_rescales_by_multiplier() {
        let it = IntIterator {
            int_val: 325.0,
            sig: 9,
            mult: 2,
        };
        assert_eq!(it.value(), 3.25);
        let it = IntIterator {
            int_val: -42.0,
            sig: 6,
            mult: 0,
        };
        assert_eq!(it.value(), -42.0);
    }
}
