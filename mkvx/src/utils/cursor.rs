//! Sequential byte cursor over a container byte stream.
//!
//! A cursor views a contiguous range of the stream (the whole file, or one
//! element's payload) and reports absolute stream offsets, so positions stay
//! meaningful in diagnostics regardless of which sub-range is being read.

use crate::utils::errors::CursorError;

/// Maximum length of an EBML element ID in bytes.
pub const MAX_ID_LEN: usize = 4;

/// Maximum length of an EBML size field in bytes.
pub const MAX_SIZE_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    data: &'a [u8],
    base: u64,
    pos: usize,
    mark: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_base(data, 0)
    }

    /// Creates a cursor whose first byte sits at absolute offset `base`.
    pub fn with_base(data: &'a [u8], base: u64) -> Self {
        Self {
            data,
            base,
            pos: 0,
            mark: 0,
        }
    }

    /// Returns a cursor over `[start, end)` of this cursor's view.
    ///
    /// Offsets are absolute; the range is clamped to the view.
    pub fn sub(&self, start: u64, end: u64) -> Cursor<'a> {
        let lo = (start.saturating_sub(self.base) as usize).min(self.data.len());
        let hi = (end.saturating_sub(self.base) as usize).clamp(lo, self.data.len());

        Cursor::with_base(&self.data[lo..hi], self.base + lo as u64)
    }

    #[inline(always)]
    pub fn position(&self) -> u64 {
        self.base + self.pos as u64
    }

    #[inline(always)]
    pub fn start(&self) -> u64 {
        self.base
    }

    #[inline(always)]
    pub fn end(&self) -> u64 {
        self.base + self.data.len() as u64
    }

    #[inline(always)]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Records the current position as the last known good checkpoint.
    #[inline(always)]
    pub fn mark(&mut self) {
        self.mark = self.pos;
    }

    pub fn last_good(&self) -> u64 {
        self.base + self.mark as u64
    }

    pub fn advance(&mut self, n: usize) -> Result<(), CursorError> {
        if n > self.remaining() {
            return Err(CursorError::OutOfBounds {
                offset: self.position(),
                count: n as u64,
                end: self.end(),
            });
        }

        self.pos += n;
        Ok(())
    }

    /// Moves to an absolute offset inside the view.
    pub fn seek_to(&mut self, offset: u64) -> Result<(), CursorError> {
        if offset < self.base || offset > self.end() {
            return Err(CursorError::OutOfBounds {
                offset: self.position(),
                count: offset.saturating_sub(self.position()),
                end: self.end(),
            });
        }

        self.pos = (offset - self.base) as usize;
        Ok(())
    }

    pub fn peek(&self, n: usize) -> Result<&'a [u8], CursorError> {
        if n > self.remaining() {
            return Err(CursorError::Truncated {
                offset: self.position(),
                needed: n,
                available: self.remaining(),
            });
        }

        Ok(&self.data[self.pos..self.pos + n])
    }

    /// Up to `max` bytes from the current position. Never fails.
    pub fn window(&self, max: usize) -> &'a [u8] {
        let n = max.min(self.remaining());
        &self.data[self.pos..self.pos + n]
    }

    /// Bytes from absolute `offset` to the end of the view.
    pub fn window_at(&self, offset: u64) -> &'a [u8] {
        let lo = (offset.saturating_sub(self.base) as usize).min(self.data.len());
        &self.data[lo..]
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], CursorError> {
        let bytes = self.peek(n)?;
        self.pos += n;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8, CursorError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_be_i16(&mut self) -> Result<i16, CursorError> {
        let bytes = self.take(2)?;
        Ok(i16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Reads a big-endian unsigned integer of `len` bytes (at most 8).
    pub fn read_be_uint(&mut self, len: usize) -> Result<u64, CursorError> {
        let bytes = self.take(len.min(8))?;
        Ok(bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
    }

    /// Reads an EBML element ID, keeping its length marker bits.
    pub fn read_id(&mut self) -> Result<u32, CursorError> {
        let offset = self.position();
        let first = self.peek(1)?[0];
        let Some(len) = vint_len(first).filter(|&len| len <= MAX_ID_LEN) else {
            return Err(CursorError::InvalidVint(offset));
        };

        Ok(self.read_be_uint(len)? as u32)
    }

    /// Reads an EBML size field. `None` means "unknown size".
    pub fn read_size(&mut self) -> Result<Option<u64>, CursorError> {
        let (value, len) = self.read_vint()?;
        let all_ones = (1u64 << (7 * len)) - 1;

        Ok((value != all_ones).then_some(value))
    }

    /// Reads an EBML variable-length integer with the marker bit stripped.
    pub fn read_vint(&mut self) -> Result<(u64, usize), CursorError> {
        let offset = self.position();
        let first = self.peek(1)?[0];
        let Some(len) = vint_len(first) else {
            return Err(CursorError::InvalidVint(offset));
        };

        let raw = self.read_be_uint(len)?;
        let value = raw & ((1u64 << (7 * len)) - 1);

        Ok((value, len))
    }
}

/// Total length of a vint from its first byte, or `None` for `0x00`.
#[inline(always)]
pub const fn vint_len(first: u8) -> Option<usize> {
    if first == 0 {
        None
    } else {
        Some(first.leading_zeros() as usize + 1)
    }
}

#[test]
fn advance_and_peek_bounds() {
    let data = [1u8, 2, 3, 4, 5];
    let mut cursor = Cursor::with_base(&data, 100);

    assert_eq!(cursor.peek(2).unwrap(), &[1, 2]);
    cursor.advance(3).unwrap();
    assert_eq!(cursor.position(), 103);
    assert!(matches!(
        cursor.peek(3),
        Err(CursorError::Truncated {
            offset: 103,
            needed: 3,
            available: 2
        })
    ));
    assert!(matches!(
        cursor.advance(3),
        Err(CursorError::OutOfBounds { offset: 103, .. })
    ));
    // failed calls leave the position untouched
    assert_eq!(cursor.position(), 103);
    cursor.advance(2).unwrap();
    assert!(cursor.is_empty());
}

#[test]
fn mark_tracks_last_good() {
    let data = [0u8; 16];
    let mut cursor = Cursor::with_base(&data, 10);
    cursor.advance(4).unwrap();
    cursor.mark();
    cursor.advance(6).unwrap();

    assert_eq!(cursor.last_good(), 14);
    assert_eq!(cursor.window_at(cursor.last_good() + 1).len(), 11);
}

#[test]
fn sub_cursor_keeps_absolute_offsets() {
    let data: Vec<u8> = (0..32).collect();
    let cursor = Cursor::new(&data);
    let mut sub = cursor.sub(8, 12);

    assert_eq!(sub.start(), 8);
    assert_eq!(sub.end(), 12);
    assert_eq!(sub.read_u8().unwrap(), 8);
    assert_eq!(sub.window(16), &[9, 10, 11]);
    assert!(sub.seek_to(13).is_err());
}

#[test]
fn ebml_vints() {
    // Cluster ID, 1-byte size, 2-byte size, unknown size
    let data = [0x1F, 0x43, 0xB6, 0x75, 0x85, 0x40, 0x02, 0xFF];
    let mut cursor = Cursor::new(&data);

    assert_eq!(cursor.read_id().unwrap(), 0x1F43B675);
    assert_eq!(cursor.read_size().unwrap(), Some(5));
    assert_eq!(cursor.read_size().unwrap(), Some(2));
    assert_eq!(cursor.read_size().unwrap(), None);

    let mut bad = Cursor::new(&[0x00, 0x81]);
    assert_eq!(bad.read_vint(), Err(CursorError::InvalidVint(0)));
}
