//! Synthetic stream builders for tests.
//!
//! Produces codec frames with valid headers and checksums and wraps them in
//! minimal EBML containers. Filler bytes stay in `0x80..=0xFE`, so they can
//! never form an AC-3 or MPEG audio sync word on their own.

use crate::codec::ac3::ac3_frame_len;
use crate::codec::{FrameHeaderValidator, MpaValidator};
use crate::structs::element::ids;
use crate::utils::crc::{CRC_AC3, CRC_FLAC8};

fn fill(buf: &mut [u8], seed: u32) {
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte = 0x80 + ((i as u32 * 37 + seed * 101) % 0x7F) as u8;
    }
}

/// An AC-3 frame (bsid 8) with valid `crc1` and `crc2`.
pub fn ac3_frame(fscod: u8, frmsizecod: u8, seed: u32) -> Vec<u8> {
    let len = ac3_frame_len(fscod, frmsizecod).expect("valid AC-3 frame size code");
    let mut frame = vec![0u8; len];
    fill(&mut frame, seed);

    frame[..2].copy_from_slice(&[0x0B, 0x77]);
    frame[4..6].copy_from_slice(&[(fscod << 6) | frmsizecod, 8 << 3]);

    let five_eighths = ((len >> 2) + (len >> 4)) << 1;
    let crc1 = CRC_AC3.prefix_checksum(&frame[4..five_eighths]);
    frame[2..4].copy_from_slice(&crc1.to_be_bytes());

    let crc2 = CRC_AC3.checksum(&frame[five_eighths..len - 2]);
    frame[len - 2..].copy_from_slice(&crc2.to_be_bytes());
    frame
}

/// An E-AC-3 independent frame (bsid 16) with a valid checksum.
pub fn eac3_frame(fscod: u8, numblkscod: u8, frmsiz: u16, seed: u32) -> Vec<u8> {
    let len = (frmsiz as usize + 1) * 2;
    let mut frame = vec![0u8; len];
    fill(&mut frame, seed);

    frame[..6].copy_from_slice(&[
        0x0B,
        0x77,
        (frmsiz >> 8) as u8 & 0x07,
        frmsiz as u8,
        (fscod << 6) | (numblkscod << 4) | (2 << 1),
        16 << 3,
    ]);

    let crc = CRC_AC3.checksum(&frame[2..len - 2]);
    frame[len - 2..].copy_from_slice(&crc.to_be_bytes());
    frame
}

/// An MPEG-1 Layer III frame.
pub fn mp3_frame(bitrate_index: u8, sample_rate_index: u8, padding: bool, seed: u32) -> Vec<u8> {
    let header = [
        0xFF,
        0xFB,
        (bitrate_index << 4) | (sample_rate_index << 2) | ((padding as u8) << 1),
        0x44,
    ];
    let len = MpaValidator::default()
        .validate(&header)
        .expect("valid MPEG audio header")
        .frame_len;

    let mut frame = vec![0u8; len];
    fill(&mut frame, seed);
    frame[..4].copy_from_slice(&header);
    frame
}

/// A stereo 16-bit FLAC frame of `block_size` samples with valid checksums.
///
/// `sample_rate_code` must be one of the codes without extra header bytes
/// (0 to 11).
pub fn flac_frame(block_size: u32, sample_rate_code: u8, payload_len: usize, seed: u32) -> Vec<u8> {
    let (code, explicit) = match block_size {
        192 => (1, vec![]),
        n if n % 576 == 0 && (n / 576).is_power_of_two() && n <= 4608 => {
            (2 + (n / 576).trailing_zeros() as u8, vec![])
        }
        n if n % 256 == 0 && (n / 256).is_power_of_two() && n <= 32768 => {
            (8 + (n / 256).trailing_zeros() as u8, vec![])
        }
        n if n <= 256 => (6, vec![(n - 1) as u8]),
        n => (7, ((n - 1) as u16).to_be_bytes().to_vec()),
    };

    let mut frame = vec![0xFF, 0xF8, (code << 4) | sample_rate_code, 0x18, (seed & 0x7F) as u8];
    frame.extend(explicit);
    frame.push(CRC_FLAC8.checksum(&frame));

    let mut payload = vec![0u8; payload_len];
    fill(&mut payload, seed);
    frame.extend(payload);

    let crc = CRC_AC3.checksum(&frame);
    frame.extend(crc.to_be_bytes());
    frame
}

/// Bytes of varying content that never contain a frame header.
pub fn garbage(len: usize, seed: u32) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    fill(&mut bytes, seed.wrapping_add(7));
    bytes
}

fn encode_id(id: u32) -> Vec<u8> {
    let bytes = id.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    bytes[skip..].to_vec()
}

/// Shortest EBML size encoding of `size`.
pub fn encode_size(size: u64) -> Vec<u8> {
    let len = (1..=8).find(|&len| size < (1u64 << (7 * len)) - 1).unwrap_or(8);
    let marked = size | (1u64 << (7 * len));
    marked.to_be_bytes()[8 - len..].to_vec()
}

pub fn element(id: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = encode_id(id);
    out.extend(encode_size(payload.len() as u64));
    out.extend_from_slice(payload);
    out
}

pub fn uint_element(id: u32, value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count().min(7);
    element(id, &bytes[skip..])
}

pub fn string_element(id: u32, value: &str) -> Vec<u8> {
    element(id, value.as_bytes())
}

fn block_payload(track: u64, relative_timecode: i16, payload: &[u8]) -> Vec<u8> {
    let mut out = encode_size(track);
    out.extend(relative_timecode.to_be_bytes());
    out.push(0x80);
    out.extend_from_slice(payload);
    out
}

pub fn simple_block(track: u64, relative_timecode: i16, payload: &[u8]) -> Vec<u8> {
    element(ids::SIMPLE_BLOCK, &block_payload(track, relative_timecode, payload))
}

pub fn block_group(track: u64, relative_timecode: i16, duration: u64, payload: &[u8]) -> Vec<u8> {
    let mut children = element(ids::BLOCK, &block_payload(track, relative_timecode, payload));
    children.extend(uint_element(ids::BLOCK_DURATION, duration));
    element(ids::BLOCK_GROUP, &children)
}

pub fn cluster(timecode: u64, blocks: &[Vec<u8>]) -> Vec<u8> {
    let mut children = uint_element(ids::TIMECODE, timecode);
    blocks.iter().for_each(|block| children.extend_from_slice(block));
    element(ids::CLUSTER, &children)
}

#[derive(Debug, Clone)]
pub struct TrackFixture {
    pub number: u64,
    pub codec_id: &'static str,
    /// ContentCompSettings of header stripping; blocks must omit these bytes.
    pub stripped_header: Option<Vec<u8>>,
    pub default_duration: Option<u64>,
}

impl TrackFixture {
    pub fn new(number: u64, codec_id: &'static str) -> Self {
        Self {
            number,
            codec_id,
            stripped_header: None,
            default_duration: None,
        }
    }

    pub fn with_stripped_header(mut self, bytes: &[u8]) -> Self {
        self.stripped_header = Some(bytes.to_vec());
        self
    }

    pub fn with_default_duration(mut self, nanos: u64) -> Self {
        self.default_duration = Some(nanos);
        self
    }

    fn entry(&self) -> Vec<u8> {
        let mut children = uint_element(ids::TRACK_NUMBER, self.number);
        children.extend(uint_element(ids::TRACK_TYPE, 2));
        children.extend(string_element(ids::CODEC_ID, self.codec_id));
        if let Some(duration) = self.default_duration {
            children.extend(uint_element(ids::DEFAULT_DURATION, duration));
        }
        if let Some(bytes) = &self.stripped_header {
            let mut compression = uint_element(ids::CONTENT_COMP_ALGO, 3);
            compression.extend(element(ids::CONTENT_COMP_SETTINGS, bytes));
            let encoding = element(ids::CONTENT_COMPRESSION, &compression);
            let encodings = element(ids::CONTENT_ENCODING, &encoding);
            children.extend(element(ids::CONTENT_ENCODINGS, &encodings));
        }
        element(ids::TRACK_ENTRY, &children)
    }
}

/// EBML header plus a Segment holding Info, Tracks and `clusters`.
pub fn container(tracks: &[TrackFixture], clusters: &[Vec<u8>]) -> Vec<u8> {
    let mut out = element(ids::EBML, &string_element(ids::DOC_TYPE, "matroska"));

    let mut segment = element(
        ids::INFO,
        &uint_element(ids::TIMECODE_SCALE, 1_000_000),
    );
    let entries: Vec<u8> = tracks.iter().flat_map(|track| track.entry()).collect();
    segment.extend(element(ids::TRACKS, &entries));
    clusters.iter().for_each(|cluster| segment.extend_from_slice(cluster));

    out.extend(element(ids::SEGMENT, &segment));
    out
}

#[test]
fn size_encoding() {
    assert_eq!(encode_size(5), vec![0x85]);
    assert_eq!(encode_size(126), vec![0xFE]);
    // 127 would be the reserved all-ones value in one byte
    assert_eq!(encode_size(127), vec![0x40, 0x7F]);
    assert_eq!(encode_size(1000), vec![0x43, 0xE8]);
}
