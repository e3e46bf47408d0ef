//! Codec-specific frame header validators.
//!
//! A validator looks at a byte window and decides whether a frame header
//! starts at its first byte. Validators are pure: they never consume input,
//! so the resynchronizer can try every byte offset of an element.

use serde::Serialize;

use crate::structs::timecode::Timecode;

pub mod ac3;
pub mod flac;
pub mod mpa;

pub use ac3::Ac3Validator;
pub use flac::FlacValidator;
pub use mpa::MpaValidator;

/// Header fields a validator reports for an accepted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameHeader {
    /// Length of the codec's fixed frame header in bytes.
    pub header_len: usize,
    /// Length of the whole frame, header included.
    pub frame_len: usize,
    /// Samples per channel carried by the frame, 0 when unknown.
    pub samples: u32,
    /// Sampling rate in Hz, 0 when unknown.
    pub sample_rate: u32,
}

impl FrameHeader {
    /// Playback duration derived from the codec header, if it declares one.
    pub fn duration(&self) -> Option<Timecode> {
        if self.samples == 0 {
            return None;
        }
        Timecode::from_samples(self.samples as u64, self.sample_rate)
    }
}

pub trait FrameHeaderValidator {
    /// Shortest window that can hold a complete header.
    fn min_header_len(&self) -> usize;

    /// Checks whether a frame header starts at `window[0]`.
    ///
    /// A window shorter than [`FrameHeaderValidator::min_header_len`] is a
    /// failure, not an error.
    fn validate(&self, window: &[u8]) -> Option<FrameHeader>;
}

/// Codec family of a track, selected from the container's CodecID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CodecKind {
    Ac3,
    Eac3,
    MpegAudio { layer: u8 },
    Flac,
    /// No frame structure known: the whole block payload is one frame.
    Passthrough,
}

impl CodecKind {
    pub fn from_codec_id(codec_id: &str) -> Self {
        match codec_id {
            "A_AC3" | "A_AC3/BSID9" | "A_AC3/BSID10" => Self::Ac3,
            "A_EAC3" => Self::Eac3,
            "A_MPEG/L1" => Self::MpegAudio { layer: 1 },
            "A_MPEG/L2" => Self::MpegAudio { layer: 2 },
            "A_MPEG/L3" => Self::MpegAudio { layer: 3 },
            "A_FLAC" => Self::Flac,
            _ => Self::Passthrough,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Ac3 => "AC-3",
            Self::Eac3 => "E-AC-3",
            Self::MpegAudio { layer: 1 } => "MPEG-1 Layer I",
            Self::MpegAudio { layer: 2 } => "MPEG-1 Layer II",
            Self::MpegAudio { .. } => "MPEG-1 Layer III",
            Self::Flac => "FLAC",
            Self::Passthrough => "passthrough",
        }
    }
}

impl FrameHeaderValidator for CodecKind {
    fn min_header_len(&self) -> usize {
        match self {
            Self::Ac3 | Self::Eac3 => Ac3Validator::default().min_header_len(),
            Self::MpegAudio { layer } => MpaValidator::for_layer(*layer).min_header_len(),
            Self::Flac => FlacValidator.min_header_len(),
            Self::Passthrough => 1,
        }
    }

    fn validate(&self, window: &[u8]) -> Option<FrameHeader> {
        match self {
            Self::Ac3 | Self::Eac3 => Ac3Validator::default().validate(window),
            Self::MpegAudio { layer } => MpaValidator::for_layer(*layer).validate(window),
            Self::Flac => FlacValidator.validate(window),
            Self::Passthrough => (!window.is_empty()).then_some(FrameHeader {
                header_len: 0,
                frame_len: window.len(),
                samples: 0,
                sample_rate: 0,
            }),
        }
    }
}

#[test]
fn codec_ids() {
    assert_eq!(CodecKind::from_codec_id("A_AC3"), CodecKind::Ac3);
    assert_eq!(
        CodecKind::from_codec_id("A_MPEG/L3"),
        CodecKind::MpegAudio { layer: 3 }
    );
    assert_eq!(CodecKind::from_codec_id("A_FLAC"), CodecKind::Flac);
    assert_eq!(CodecKind::from_codec_id("S_TEXT/UTF8"), CodecKind::Passthrough);
}

#[test]
fn passthrough_takes_whole_window() {
    let header = CodecKind::Passthrough.validate(b"hello").unwrap();
    assert_eq!(header.frame_len, 5);
    assert_eq!(header.duration(), None);
    assert!(CodecKind::Passthrough.validate(&[]).is_none());
}
