//! Bit-level field reader for frame header validators.
//!
//! Header windows are short and validation is a yes/no question, so every
//! read returns `None` once the window runs out instead of an I/O error.

use std::io;

use bitstream_io::{BigEndian, BitRead, BitReader, UnsignedInteger};

/// MSB-first reader over a header window.
#[derive(Debug)]
pub struct FieldReader<'a> {
    bs: BitReader<io::Cursor<&'a [u8]>, BigEndian>,
    len: u64,
}

impl<'a> FieldReader<'a> {
    pub fn from_slice(window: &'a [u8]) -> Self {
        Self {
            bs: BitReader::new(io::Cursor::new(window)),
            len: (window.len() as u64) << 3,
        }
    }

    #[inline(always)]
    pub fn flag(&mut self) -> Option<bool> {
        self.bs.read_bit().ok()
    }

    /// Reads an unsigned `bits`-wide field.
    #[inline(always)]
    pub fn read<I: UnsignedInteger>(&mut self, bits: u32) -> Option<I> {
        if bits as u64 > self.remaining_bits() {
            return None;
        }
        self.bs.read_unsigned_var(bits).ok()
    }

    #[inline(always)]
    pub fn skip(&mut self, bits: u32) -> Option<()> {
        if bits as u64 > self.remaining_bits() {
            return None;
        }
        self.bs.skip(bits).ok()
    }

    pub fn remaining_bits(&mut self) -> u64 {
        self.bs
            .position_in_bits()
            .map_or(0, |pos| self.len.saturating_sub(pos))
    }
}

#[test]
fn reads_fields_across_bytes() {
    let mut reader = FieldReader::from_slice(&[0b1011_0111, 0b0100_0001]);

    assert_eq!(reader.flag(), Some(true));
    assert_eq!(reader.read::<u8>(3), Some(0b011));
    assert_eq!(reader.read::<u16>(6), Some(0b0111_01));
    assert_eq!(reader.skip(7), None);
    reader.skip(5).unwrap();
    assert_eq!(reader.flag(), Some(true));
    assert_eq!(reader.remaining_bits(), 0);
    assert_eq!(reader.flag(), None);
    assert_eq!(reader.read::<u8>(1), None);
}
