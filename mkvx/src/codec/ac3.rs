//! AC-3 and E-AC-3 sync frame headers (ATSC A/52).
//!
//! Both families share the `0x0B77` sync word and keep `bsid` in the top
//! five bits of byte 5: values up to 10 are AC-3, 11 to 16 are E-AC-3.

use crate::codec::{FrameHeader, FrameHeaderValidator};
use crate::utils::bitstream_io::FieldReader;
use crate::utils::crc::CRC_AC3;

pub const AC3_SYNC_WORD: u16 = 0x0B77;

/// Sync word, `crc1` and `fscod`/`frmsizecod`.
pub const AC3_HEADER_LEN: usize = 5;

/// Sync word, `strmtyp`/`substreamid`/`frmsiz` and `fscod`/`numblkscod`/`acmod`/`lfeon`.
pub const EAC3_HEADER_LEN: usize = 5;

pub const AC3_SAMPLES_PER_FRAME: u32 = 1536;

const SAMPLES_PER_BLOCK: u32 = 256;

/// Nominal bit rates in kbit/s, indexed by `frmsizecod / 2`.
const AC3_BITRATES: [u32; 19] = [
    32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 448, 512, 576, 640,
];

const SAMPLE_RATES: [u32; 3] = [48_000, 44_100, 32_000];
const EAC3_REDUCED_SAMPLE_RATES: [u32; 3] = [24_000, 22_050, 16_000];
const EAC3_BLOCKS: [u32; 4] = [1, 2, 3, 6];

#[derive(Debug, Clone, Copy)]
pub struct Ac3Validator {
    /// Verify the frame checksum whenever the whole frame is inside the window.
    pub verify_crc: bool,
}

impl Default for Ac3Validator {
    fn default() -> Self {
        Self { verify_crc: true }
    }
}

/// Frame length in bytes for an AC-3 `fscod`/`frmsizecod` pair.
pub fn ac3_frame_len(fscod: u8, frmsizecod: u8) -> Option<usize> {
    let bitrate = *AC3_BITRATES.get(frmsizecod as usize / 2)?;
    let words = match fscod {
        0 => bitrate * 2,
        // 44.1 kHz frames are padded by one word on odd frmsizecod
        1 => bitrate * 1000 * AC3_SAMPLES_PER_FRAME / 44_100 / 16 + (frmsizecod as u32 & 1),
        2 => bitrate * 3,
        _ => return None,
    };

    Some(words as usize * 2)
}

impl Ac3Validator {
    fn read_ac3(window: &[u8]) -> Option<FrameHeader> {
        let mut reader = FieldReader::from_slice(&window[4..6]);
        let fscod: u8 = reader.read(2)?;
        let frmsizecod: u8 = reader.read(6)?;

        Some(FrameHeader {
            header_len: AC3_HEADER_LEN,
            frame_len: ac3_frame_len(fscod, frmsizecod)?,
            samples: AC3_SAMPLES_PER_FRAME,
            sample_rate: SAMPLE_RATES[fscod as usize],
        })
    }

    fn read_eac3(window: &[u8]) -> Option<FrameHeader> {
        let mut reader = FieldReader::from_slice(&window[2..5]);
        let strmtyp: u8 = reader.read(2)?;
        if strmtyp == 3 {
            return None;
        }
        reader.skip(3)?;
        let frmsiz: u16 = reader.read(11)?;
        let fscod: u8 = reader.read(2)?;
        let numblkscod: u8 = reader.read(2)?;

        let (sample_rate, blocks) = if fscod == 3 {
            // numblkscod carries fscod2; reduced rates always use six blocks
            (*EAC3_REDUCED_SAMPLE_RATES.get(numblkscod as usize)?, 6)
        } else {
            (SAMPLE_RATES[fscod as usize], EAC3_BLOCKS[numblkscod as usize])
        };

        let frame_len = (frmsiz as usize + 1) * 2;
        if frame_len < EAC3_HEADER_LEN + 1 {
            return None;
        }

        Some(FrameHeader {
            header_len: EAC3_HEADER_LEN,
            frame_len,
            samples: blocks * SAMPLES_PER_BLOCK,
            sample_rate,
        })
    }

    fn crc_matches(bsid: u8, frame: &[u8]) -> bool {
        if bsid <= 10 {
            // crc1 covers the first 5/8 after the sync word, crc2 the rest
            let len = frame.len();
            let five_eighths = ((len >> 2) + (len >> 4)) << 1;
            CRC_AC3.residue(&frame[2..five_eighths]) == 0
                && CRC_AC3.residue(&frame[five_eighths..]) == 0
        } else {
            CRC_AC3.residue(&frame[2..]) == 0
        }
    }
}

impl FrameHeaderValidator for Ac3Validator {
    fn min_header_len(&self) -> usize {
        // bsid lives in byte 5
        6
    }

    fn validate(&self, window: &[u8]) -> Option<FrameHeader> {
        if window.len() < self.min_header_len()
            || u16::from_be_bytes([window[0], window[1]]) != AC3_SYNC_WORD
        {
            return None;
        }

        let bsid = window[5] >> 3;
        let header = match bsid {
            0..=10 => Self::read_ac3(window)?,
            11..=16 => Self::read_eac3(window)?,
            _ => return None,
        };

        if self.verify_crc
            && window.len() >= header.frame_len
            && !Self::crc_matches(bsid, &window[..header.frame_len])
        {
            return None;
        }

        Some(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::fixture::{ac3_frame, eac3_frame};

    #[test]
    fn frame_sizes() {
        assert_eq!(ac3_frame_len(0, 0), Some(128));
        assert_eq!(ac3_frame_len(0, 37), Some(2560));
        assert_eq!(ac3_frame_len(1, 0), Some(138));
        assert_eq!(ac3_frame_len(1, 1), Some(140));
        assert_eq!(ac3_frame_len(1, 37), Some(2788));
        assert_eq!(ac3_frame_len(2, 10), Some(480));
        assert_eq!(ac3_frame_len(3, 10), None);
        assert_eq!(ac3_frame_len(0, 38), None);
    }

    #[test]
    fn accepts_valid_ac3_frame() {
        let frame = ac3_frame(0, 8, 1);
        let header = Ac3Validator::default().validate(&frame).unwrap();

        assert_eq!(header.frame_len, 256);
        assert_eq!(header.frame_len, frame.len());
        assert_eq!(header.header_len, AC3_HEADER_LEN);
        assert_eq!(header.sample_rate, 48_000);
        assert_eq!(header.duration().unwrap().as_nanos(), 32_000_000);
    }

    #[test]
    fn rejects_corrupted_frames() {
        let validator = Ac3Validator::default();

        let mut bad_sync = ac3_frame(0, 8, 2);
        bad_sync[1] = 0x78;
        assert!(validator.validate(&bad_sync).is_none());

        let mut bad_crc = ac3_frame(0, 8, 3);
        let last = bad_crc.len() - 10;
        bad_crc[last] ^= 0xFF;
        assert!(validator.validate(&bad_crc).is_none());

        // a flipped bit in the first 5/8 only breaks crc1
        let mut bad_crc1 = ac3_frame(0, 8, 3);
        bad_crc1[100] ^= 0x04;
        assert!(validator.validate(&bad_crc1).is_none());

        // checksum is not verified when the frame does not fit the window
        assert!(validator.validate(&bad_crc[..100]).is_some());
        assert!(
            Ac3Validator { verify_crc: false }
                .validate(&bad_crc)
                .is_some()
        );
    }

    #[test]
    fn short_window_is_a_plain_failure() {
        let frame = ac3_frame(0, 8, 4);
        assert!(Ac3Validator::default().validate(&frame[..5]).is_none());
        assert!(Ac3Validator::default().validate(&[]).is_none());
    }

    #[test]
    fn accepts_eac3_frame() {
        let frame = eac3_frame(0, 3, 383, 5);
        let header = Ac3Validator::default().validate(&frame).unwrap();

        assert_eq!(frame.len(), 768);
        assert_eq!(header.frame_len, 768);
        assert_eq!(header.samples, 1536);
        assert_eq!(header.sample_rate, 48_000);

        let mut broken = frame.clone();
        broken[300] ^= 1;
        assert!(Ac3Validator::default().validate(&broken).is_none());
    }

    #[test]
    fn eac3_reduced_sample_rates() {
        // fscod 3 moves the rate code into numblkscod and fixes six blocks
        let frame = eac3_frame(3, 1, 255, 7);
        let header = Ac3Validator::default().validate(&frame).unwrap();

        assert_eq!(header.frame_len, 512);
        assert_eq!(header.sample_rate, 22_050);
        assert_eq!(header.samples, 1536);
        assert_eq!(header.duration().unwrap().as_nanos(), 69_659_864);

        let header = Ac3Validator::default()
            .validate(&eac3_frame(3, 2, 255, 7))
            .unwrap();
        assert_eq!(header.sample_rate, 16_000);

        // fscod2 == 3 is reserved
        assert!(
            Ac3Validator::default()
                .validate(&eac3_frame(3, 3, 255, 8))
                .is_none()
        );
    }
}
