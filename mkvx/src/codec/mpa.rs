//! MPEG-1/2/2.5 audio frame headers, Layers I to III.

use crate::codec::{FrameHeader, FrameHeaderValidator};
use crate::utils::bitstream_io::FieldReader;

pub const MPA_HEADER_LEN: usize = 4;

const MPA_SYNC: u16 = 0x7FF;

/// Bit rates in kbit/s indexed by `[lsf][layer - 1][bitrate_index]`.
const BITRATES: [[[u16; 15]; 3]; 2] = [
    [
        [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448],
        [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384],
        [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320],
    ],
    [
        [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256],
        [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160],
        [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160],
    ],
];

const SAMPLE_RATES_V1: [u32; 3] = [44_100, 48_000, 32_000];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Version {
    Mpeg1,
    Mpeg2,
    Mpeg25,
}

impl Version {
    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0b11 => Some(Self::Mpeg1),
            0b10 => Some(Self::Mpeg2),
            0b00 => Some(Self::Mpeg25),
            _ => None,
        }
    }

    fn sample_rate(self, index: u8) -> Option<u32> {
        let base = *SAMPLE_RATES_V1.get(index as usize)?;
        Some(match self {
            Self::Mpeg1 => base,
            Self::Mpeg2 => base / 2,
            Self::Mpeg25 => base / 4,
        })
    }

    fn lsf(self) -> usize {
        (self != Self::Mpeg1) as usize
    }
}

/// Validator for MPEG audio frames, optionally restricted to one layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct MpaValidator {
    pub layer: Option<u8>,
}

impl MpaValidator {
    pub fn for_layer(layer: u8) -> Self {
        Self { layer: Some(layer) }
    }
}

impl FrameHeaderValidator for MpaValidator {
    fn min_header_len(&self) -> usize {
        MPA_HEADER_LEN
    }

    fn validate(&self, window: &[u8]) -> Option<FrameHeader> {
        if window.len() < MPA_HEADER_LEN {
            return None;
        }

        let mut reader = FieldReader::from_slice(&window[..MPA_HEADER_LEN]);
        if reader.read::<u16>(11)? != MPA_SYNC {
            return None;
        }

        let version = Version::from_bits(reader.read(2)?)?;
        let layer = match reader.read::<u8>(2)? {
            0b11 => 1,
            0b10 => 2,
            0b01 => 3,
            _ => return None,
        };
        if self.layer.is_some_and(|expected| expected != layer) {
            return None;
        }

        reader.skip(1)?;
        let bitrate_index: u8 = reader.read(4)?;
        let sample_rate_index: u8 = reader.read(2)?;
        let padding = reader.flag()? as u32;

        if bitrate_index == 0 {
            // free format streams cannot be framed from the header alone
            return None;
        }
        let bitrate =
            *BITRATES[version.lsf()][layer as usize - 1].get(bitrate_index as usize)? as u32 * 1000;
        let sample_rate = version.sample_rate(sample_rate_index)?;

        let (frame_len, samples) = match layer {
            1 => ((12 * bitrate / sample_rate + padding) * 4, 384),
            2 => (144 * bitrate / sample_rate + padding, 1152),
            _ if version == Version::Mpeg1 => (144 * bitrate / sample_rate + padding, 1152),
            _ => (72 * bitrate / sample_rate + padding, 576),
        };

        Some(FrameHeader {
            header_len: MPA_HEADER_LEN,
            frame_len: frame_len as usize,
            samples,
            sample_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::fixture::mp3_frame;

    #[test]
    fn layer3_frame_sizes() {
        // 128 kbit/s, 44.1 kHz
        let frame = mp3_frame(9, 0, false, 1);
        let header = MpaValidator::for_layer(3).validate(&frame).unwrap();
        assert_eq!(header.frame_len, 417);
        assert_eq!(frame.len(), 417);
        assert_eq!(header.samples, 1152);

        let padded = mp3_frame(9, 0, true, 1);
        assert_eq!(
            MpaValidator::default().validate(&padded).unwrap().frame_len,
            418
        );

        // 320 kbit/s, 48 kHz
        let frame = mp3_frame(14, 1, false, 2);
        assert_eq!(MpaValidator::default().validate(&frame).unwrap().frame_len, 960);
    }

    #[test]
    fn lsf_layer3_frame_sizes() {
        // MPEG-2, 64 kbit/s, 22.05 kHz
        let header = MpaValidator::for_layer(3)
            .validate(&[0xFF, 0xF3, 0x80, 0x44])
            .unwrap();
        assert_eq!(header.frame_len, 208);
        assert_eq!(header.samples, 576);
        assert_eq!(header.sample_rate, 22_050);
        assert_eq!(header.duration().unwrap().as_nanos(), 26_122_449);

        // MPEG-2.5, 64 kbit/s, 11.025 kHz, padded
        let header = MpaValidator::for_layer(3)
            .validate(&[0xFF, 0xE3, 0x82, 0x44])
            .unwrap();
        assert_eq!(header.frame_len, 418);
        assert_eq!(header.samples, 576);
        assert_eq!(header.sample_rate, 11_025);

        // MPEG-2 Layer II keeps 1152 samples
        let header = MpaValidator::default()
            .validate(&[0xFF, 0xF5, 0x80, 0x44])
            .unwrap();
        assert_eq!(header.samples, 1152);
        assert_eq!(header.frame_len, 417);
    }

    #[test]
    fn rejects_reserved_fields() {
        let validator = MpaValidator::default();

        assert!(validator.validate(&[0xFF, 0xFB, 0xF0, 0x00]).is_none()); // bitrate 15
        assert!(validator.validate(&[0xFF, 0xFB, 0x9C, 0x00]).is_none()); // sample rate 3
        assert!(validator.validate(&[0xFF, 0xF9, 0x90, 0x00]).is_none()); // layer 0
        assert!(validator.validate(&[0xFF, 0xEB, 0x90, 0x00]).is_none()); // version 01
        assert!(validator.validate(&[0xFF, 0xFB, 0x90]).is_none());
    }

    #[test]
    fn layer_restriction() {
        // Layer II header
        let header = [0xFF, 0xFD, 0x80, 0x00];
        assert!(MpaValidator::for_layer(3).validate(&header).is_none());
        assert_eq!(
            MpaValidator::for_layer(2).validate(&header).unwrap().frame_len,
            417
        );
    }
}
