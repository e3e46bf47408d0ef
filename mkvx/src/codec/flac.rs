//! FLAC frame headers.
//!
//! A FLAC frame does not declare its length. It ends at the first position
//! where its CRC-16 footer checks out and either the window ends or another
//! frame header starts.

use crate::codec::{FrameHeader, FrameHeaderValidator};
use crate::utils::bitstream_io::FieldReader;
use crate::utils::crc::{CRC_AC3, CRC_FLAC8};

/// 14-bit frame sync code.
pub const FLAC_SYNC: u16 = 0x3FFE;

/// Sync, fixed fields, a one-byte frame number and the header CRC-8.
pub const FLAC_MIN_HEADER_LEN: usize = 6;

/// Fixed fields, a seven-byte coded number, explicit block size and rate.
const FLAC_MAX_HEADER_LEN: usize = 16;

/// Header length, one subframe byte and the CRC-16 footer.
const FLAC_MIN_FRAME_LEN: usize = FLAC_MIN_HEADER_LEN + 3;

const SAMPLE_RATES: [u32; 12] = [
    0, 88_200, 176_400, 192_000, 8_000, 16_000, 22_050, 24_000, 32_000, 44_100, 48_000, 96_000,
];

#[derive(Debug, Clone, Copy, Default)]
pub struct FlacValidator;

impl FlacValidator {
    /// Parses a frame header; returns its length, block size and sample rate.
    ///
    /// A sample rate of 0 means the rate is only given in STREAMINFO.
    fn read_header(window: &[u8]) -> Option<(usize, u32, u32)> {
        let window = &window[..window.len().min(FLAC_MAX_HEADER_LEN)];
        let mut reader = FieldReader::from_slice(window);

        if reader.read::<u16>(14)? != FLAC_SYNC || reader.flag()? {
            return None;
        }
        let _variable_block_size = reader.flag()?;
        let block_size_code: u8 = reader.read(4)?;
        let sample_rate_code: u8 = reader.read(4)?;
        let channels: u8 = reader.read(4)?;
        let sample_size: u8 = reader.read(3)?;
        if reader.flag()? || block_size_code == 0 || channels > 10 || sample_size == 3 {
            return None;
        }

        // UTF-8 style coded frame or sample number
        let first: u8 = reader.read(8)?;
        let extra = match first.leading_ones() {
            0 => 0,
            n @ 2..=7 => n - 1,
            _ => return None,
        };
        for _ in 0..extra {
            if reader.read::<u8>(8)? >> 6 != 0b10 {
                return None;
            }
        }

        let block_size = match block_size_code {
            1 => 192,
            2..=5 => 576 << (block_size_code - 2),
            6 => reader.read::<u32>(8)? + 1,
            7 => reader.read::<u32>(16)? + 1,
            _ => 256 << (block_size_code - 8),
        };
        let sample_rate = match sample_rate_code {
            12 => reader.read::<u32>(8)? * 1000,
            13 => reader.read::<u32>(16)?,
            14 => reader.read::<u32>(16)? * 10,
            15 => return None,
            code => SAMPLE_RATES[code as usize],
        };

        let header_len = (window.len() as u64 * 8 - reader.remaining_bits()) as usize / 8;
        let crc: u8 = reader.read(8)?;
        if CRC_FLAC8.checksum(&window[..header_len]) != crc {
            return None;
        }

        Some((header_len + 1, block_size, sample_rate))
    }

    /// Length of the frame at the start of `window`, whose header is `header_len` bytes.
    fn frame_len(window: &[u8], header_len: usize) -> Option<usize> {
        let mut crc = CRC_AC3.residue(&window[..header_len]);

        for (i, &byte) in window.iter().enumerate().skip(header_len) {
            crc = CRC_AC3.update(crc, &[byte]);

            let end = i + 1;
            if crc == 0
                && end >= FLAC_MIN_FRAME_LEN
                && (end == window.len() || Self::read_header(&window[end..]).is_some())
            {
                return Some(end);
            }
        }

        None
    }
}

impl FrameHeaderValidator for FlacValidator {
    fn min_header_len(&self) -> usize {
        FLAC_MIN_HEADER_LEN
    }

    fn validate(&self, window: &[u8]) -> Option<FrameHeader> {
        let (header_len, block_size, sample_rate) = Self::read_header(window)?;

        Some(FrameHeader {
            header_len,
            frame_len: Self::frame_len(window, header_len)?,
            samples: block_size,
            sample_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::fixture::flac_frame;

    #[test]
    fn accepts_valid_frame() {
        let frame = flac_frame(4096, 9, 300, 1);
        let header = FlacValidator.validate(&frame).unwrap();

        assert_eq!(header.header_len, FLAC_MIN_HEADER_LEN);
        assert_eq!(header.frame_len, frame.len());
        assert_eq!(header.samples, 4096);
        assert_eq!(header.sample_rate, 44_100);
        assert_eq!(header.duration().unwrap().as_nanos(), 92_879_819);
    }

    #[test]
    fn explicit_block_size() {
        // 8-bit and 16-bit block size fields follow the frame number
        let frame = flac_frame(100, 10, 50, 2);
        let header = FlacValidator.validate(&frame).unwrap();
        assert_eq!(header.header_len, 7);
        assert_eq!(header.samples, 100);
        assert_eq!(header.sample_rate, 48_000);

        let frame = flac_frame(1000, 0, 50, 3);
        let header = FlacValidator.validate(&frame).unwrap();
        assert_eq!(header.header_len, 8);
        assert_eq!(header.samples, 1000);
        assert_eq!(header.duration(), None);
    }

    #[test]
    fn frame_ends_at_next_header() {
        let first = flac_frame(4096, 9, 200, 4);
        let mut data = first.clone();
        data.extend(flac_frame(4096, 9, 240, 5));

        let header = FlacValidator.validate(&data).unwrap();
        assert_eq!(header.frame_len, first.len());
    }

    #[test]
    fn rejects_corrupted_frames() {
        let frame = flac_frame(4096, 9, 200, 6);

        let mut bad_header = frame.clone();
        bad_header[2] ^= 0x10;
        assert!(FlacValidator.validate(&bad_header).is_none());

        let mut bad_payload = frame.clone();
        bad_payload[100] ^= 0x01;
        assert!(FlacValidator.validate(&bad_payload).is_none());

        // the footer is not inside the window
        assert!(FlacValidator.validate(&frame[..150]).is_none());
        assert!(FlacValidator.validate(&frame[..4]).is_none());
    }
}
