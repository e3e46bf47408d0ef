//! Tracks and their header-removal policies.
//!
//! Two kinds of header removal meet here. The container may store frames
//! without a constant prefix (header stripping), which is always put back
//! before a frame is validated. A [`HeaderRemoval`] policy then decides what
//! is cut from the restored frame before it is emitted.

use std::borrow::Cow;
use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::codec::{CodecKind, FrameHeader, FrameHeaderValidator};
use crate::structs::timecode::Timecode;
use crate::utils::errors::DemuxError;

/// How codec header bytes are removed from each frame before emission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub enum HeaderRemoval {
    #[default]
    None,
    /// Drop the first `n` bytes of every frame.
    StripBytes(usize),
    /// Drop a fixed prefix; frames not starting with it are invalid.
    StripPattern(Vec<u8>),
}

impl HeaderRemoval {
    /// Number of bytes removed from every frame.
    pub fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::StripBytes(n) => *n,
            Self::StripPattern(pattern) => pattern.len(),
        }
    }

    pub fn is_none(&self) -> bool {
        self.len() == 0
    }

    /// Checks that `window` starts with bytes this policy can remove.
    pub fn accepts(&self, window: &[u8]) -> bool {
        match self {
            Self::None => true,
            Self::StripBytes(n) => window.len() >= *n,
            Self::StripPattern(pattern) => window.starts_with(pattern),
        }
    }

    /// The frame without its header bytes, or `None` if the policy does not apply.
    pub fn strip<'a>(&self, frame: &'a [u8]) -> Option<&'a [u8]> {
        self.accepts(frame).then(|| &frame[self.len()..])
    }

    /// Prepends the removed bytes again. Only a pattern can be restored.
    pub fn restore(&self, payload: &[u8]) -> Option<Vec<u8>> {
        match self {
            Self::None => Some(payload.to_vec()),
            Self::StripBytes(0) => Some(payload.to_vec()),
            Self::StripBytes(_) => None,
            Self::StripPattern(pattern) => {
                let mut frame = Vec::with_capacity(pattern.len() + payload.len());
                frame.extend_from_slice(pattern);
                frame.extend_from_slice(payload);
                Some(frame)
            }
        }
    }
}

impl Display for HeaderRemoval {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::StripBytes(n) => write!(f, "strip {n} bytes"),
            Self::StripPattern(pattern) => {
                write!(f, "strip pattern ")?;
                pattern.iter().try_for_each(|b| write!(f, "{b:02X}"))
            }
        }
    }
}

/// A logical stream multiplexed in the container.
///
/// Created from container metadata when the stream is opened and never
/// modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Track {
    /// Zero-based position in the container's track list.
    pub id: usize,
    /// TrackNumber used by blocks to refer to this track.
    pub number: u64,
    pub track_type: u8,
    pub codec_id: String,
    pub codec: CodecKind,
    pub header_removal: HeaderRemoval,
    /// Bytes the muxer removed from the start of every stored frame.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stripped_header: Vec<u8>,
    /// Nominal duration of one block, from DefaultDuration.
    pub default_duration: Option<Timecode>,
}

impl Track {
    /// The frame stored as `stored`, with the container-stripped bytes put back.
    pub fn restore<'a>(&self, stored: &'a [u8]) -> Cow<'a, [u8]> {
        if self.stripped_header.is_empty() {
            return Cow::Borrowed(stored);
        }

        let mut frame = Vec::with_capacity(self.stripped_header.len() + stored.len());
        frame.extend_from_slice(&self.stripped_header);
        frame.extend_from_slice(stored);
        Cow::Owned(frame)
    }

    /// Validates the frame stored at the start of `stored`, found at `offset`.
    ///
    /// The header is checked on the restored frame, which must fit in
    /// `stored` and be acceptable to the emission policy. Returns the header
    /// and the number of stored bytes the frame occupies.
    pub fn frame_at(&self, stored: &[u8], offset: u64) -> Result<(FrameHeader, usize), DemuxError> {
        let frame = self.restore(stored);
        let min_header_len = self.codec.min_header_len();

        if frame.len() < min_header_len {
            return Err(DemuxError::Truncated {
                offset,
                needed: min_header_len,
                available: frame.len(),
            });
        }

        let header = self
            .codec
            .validate(&frame)
            .ok_or(DemuxError::HeaderInvalid { offset })?;

        // a header announcing more bytes than the block holds is misaligned
        if header.frame_len > frame.len() {
            return Err(DemuxError::Truncated {
                offset,
                needed: header.frame_len,
                available: frame.len(),
            });
        }

        let stored_len = header.frame_len.saturating_sub(self.stripped_header.len());
        if stored_len == 0 || !self.header_removal.accepts(&frame[..header.frame_len]) {
            return Err(DemuxError::HeaderInvalid { offset });
        }

        Ok((header, stored_len))
    }

    pub fn type_name(&self) -> &'static str {
        match self.track_type {
            1 => "video",
            2 => "audio",
            0x10 => "logo",
            0x11 => "subtitles",
            0x12 => "buttons",
            0x20 => "control",
            _ => "unknown",
        }
    }
}

#[test]
fn strip_and_restore_pattern() {
    let policy = HeaderRemoval::StripPattern(vec![0x0B, 0x77]);
    let frame = [0x0B, 0x77, 1, 2, 3];

    let payload = policy.strip(&frame).unwrap();
    assert_eq!(payload, &[1, 2, 3]);
    assert_eq!(policy.restore(payload).unwrap(), frame);
    assert!(policy.strip(&[0x0B, 0x78, 1]).is_none());
    assert_eq!(policy.to_string(), "strip pattern 0B77");
}

#[test]
fn restore_stripped_frames() {
    let frame = crate::utils::fixture::ac3_frame(0, 8, 2);
    let mut track = Track {
        id: 0,
        number: 1,
        track_type: 2,
        codec_id: "A_AC3".into(),
        codec: CodecKind::Ac3,
        header_removal: HeaderRemoval::None,
        stripped_header: vec![0x0B, 0x77],
        default_duration: None,
    };

    let mut stored = frame[2..].to_vec();
    assert_eq!(track.restore(&stored), frame.as_slice());
    let (header, stored_len) = track.frame_at(&stored, 10).unwrap();
    assert_eq!(header.frame_len, 256);
    assert_eq!(stored_len, 254);

    // the emission policy sees the restored frame
    track.header_removal = HeaderRemoval::StripPattern(vec![0x0B, 0x77]);
    assert!(track.frame_at(&stored, 10).is_ok());

    assert_eq!(
        track.frame_at(&stored[..100], 10),
        Err(DemuxError::Truncated {
            offset: 10,
            needed: 256,
            available: 102
        })
    );
    let last = stored.len() - 1;
    stored[last] ^= 0xFF;
    assert_eq!(
        track.frame_at(&stored, 10),
        Err(DemuxError::HeaderInvalid { offset: 10 })
    );

    // stored with the header in place, the frame no longer lines up
    track.header_removal = HeaderRemoval::None;
    assert!(track.frame_at(&frame, 0).is_err());
}

#[test]
fn strip_fixed_length() {
    let policy = HeaderRemoval::StripBytes(4);
    assert_eq!(policy.strip(&[1, 2, 3, 4, 5]).unwrap(), &[5]);
    assert!(policy.strip(&[1, 2, 3]).is_none());
    assert!(policy.restore(&[5]).is_none());
    assert!(HeaderRemoval::None.is_none());
}
