//! Container elements.
//!
//! Every element is an EBML ID, an EBML size and a payload. Master elements
//! (Segment, Cluster, ...) carry child elements in their payload.

use serde::Serialize;

use crate::structs::timecode::Timecode;
use crate::utils::cursor::Cursor;
use crate::utils::errors::CursorError;

pub mod ids {
    pub const EBML: u32 = 0x1A45_DFA3;
    pub const DOC_TYPE: u32 = 0x4282;
    pub const SEGMENT: u32 = 0x1853_8067;
    pub const SEEK_HEAD: u32 = 0x114D_9B74;
    pub const INFO: u32 = 0x1549_A966;
    pub const TIMECODE_SCALE: u32 = 0x2A_D7B1;
    pub const DURATION: u32 = 0x4489;
    pub const TRACKS: u32 = 0x1654_AE6B;
    pub const TRACK_ENTRY: u32 = 0xAE;
    pub const TRACK_NUMBER: u32 = 0xD7;
    pub const TRACK_TYPE: u32 = 0x83;
    pub const CODEC_ID: u32 = 0x86;
    pub const DEFAULT_DURATION: u32 = 0x23_E383;
    pub const CONTENT_ENCODINGS: u32 = 0x6D80;
    pub const CONTENT_ENCODING: u32 = 0x6240;
    pub const CONTENT_COMPRESSION: u32 = 0x5034;
    pub const CONTENT_COMP_ALGO: u32 = 0x4254;
    pub const CONTENT_COMP_SETTINGS: u32 = 0x4255;
    pub const CLUSTER: u32 = 0x1F43_B675;
    pub const TIMECODE: u32 = 0xE7;
    pub const SIMPLE_BLOCK: u32 = 0xA3;
    pub const BLOCK_GROUP: u32 = 0xA0;
    pub const BLOCK: u32 = 0xA1;
    pub const BLOCK_DURATION: u32 = 0x9B;
    pub const CUES: u32 = 0x1C53_BB6B;
    pub const CHAPTERS: u32 = 0x1043_A770;
    pub const TAGS: u32 = 0x1254_C367;
    pub const ATTACHMENTS: u32 = 0x1941_A469;
    pub const VOID: u32 = 0xEC;
    pub const CRC32: u32 = 0xBF;
}

/// Level-1 elements that terminate a cluster of unknown size.
pub const SEGMENT_CHILDREN: [u32; 8] = [
    ids::SEEK_HEAD,
    ids::INFO,
    ids::TRACKS,
    ids::CLUSTER,
    ids::CUES,
    ids::CHAPTERS,
    ids::TAGS,
    ids::ATTACHMENTS,
];

/// A tagged, length-prefixed chunk of the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Element {
    pub id: u32,
    /// Offset of the first ID byte.
    pub offset: u64,
    /// Offset of the first payload byte.
    pub payload_offset: u64,
    /// Payload size; `None` for elements of unknown size.
    pub size: Option<u64>,
}

impl Element {
    /// Reads an element header at the cursor, leaving it at the payload.
    pub fn read(cursor: &mut Cursor) -> Result<Self, CursorError> {
        let offset = cursor.position();
        let id = cursor.read_id()?;
        let size = cursor.read_size()?;

        Ok(Self {
            id,
            offset,
            payload_offset: cursor.position(),
            size,
        })
    }

    /// End of the payload, or `fallback` for elements of unknown size.
    pub fn end_or(&self, fallback: u64) -> u64 {
        self.size
            .map_or(fallback, |size| self.payload_offset.saturating_add(size))
    }

    pub fn name(&self) -> &'static str {
        match self.id {
            ids::EBML => "EBML",
            ids::SEGMENT => "Segment",
            ids::SEEK_HEAD => "SeekHead",
            ids::INFO => "Info",
            ids::TRACKS => "Tracks",
            ids::TRACK_ENTRY => "TrackEntry",
            ids::CLUSTER => "Cluster",
            ids::TIMECODE => "Timecode",
            ids::SIMPLE_BLOCK => "SimpleBlock",
            ids::BLOCK_GROUP => "BlockGroup",
            ids::BLOCK => "Block",
            ids::BLOCK_DURATION => "BlockDuration",
            ids::CUES => "Cues",
            ids::CHAPTERS => "Chapters",
            ids::TAGS => "Tags",
            ids::ATTACHMENTS => "Attachments",
            ids::VOID => "Void",
            ids::CRC32 => "CRC-32",
            _ => "Unknown",
        }
    }
}

/// One block element resolved against its cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockElement {
    /// Container track number.
    pub track_number: u64,
    /// Cluster timecode plus the block's relative timecode.
    pub timecode: Timecode,
    /// Declared BlockDuration, when the block came from a BlockGroup.
    pub duration: Option<Timecode>,
    pub keyframe: bool,
    /// Offset of the block element's ID.
    pub offset: u64,
    /// First byte of codec data, after the block header.
    pub data_offset: u64,
    /// End of codec data, which is also the element boundary.
    pub data_end: u64,
}

impl BlockElement {
    pub fn data_len(&self) -> u64 {
        self.data_end - self.data_offset
    }
}

#[test]
fn reads_element_header() {
    let data = [0x1F, 0x43, 0xB6, 0x75, 0x83, 0xE7, 0x81, 0x00];
    let mut cursor = Cursor::with_base(&data, 40);
    let element = Element::read(&mut cursor).unwrap();

    assert_eq!(element.id, ids::CLUSTER);
    assert_eq!(element.name(), "Cluster");
    assert_eq!(element.offset, 40);
    assert_eq!(element.payload_offset, 45);
    assert_eq!(element.end_or(0), 48);

    let child = Element::read(&mut cursor).unwrap();
    assert_eq!(child.id, ids::TIMECODE);
    assert_eq!(child.size, Some(1));
}
