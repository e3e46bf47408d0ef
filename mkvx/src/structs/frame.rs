use std::sync::Arc;

use crate::structs::timecode::Timecode;

/// One codec frame of a track, header removal already applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub track: usize,
    pub timecode: Timecode,
    /// Set on the first frame after a resync, whose timecode was reconstructed.
    pub recovered: bool,
    /// Stream offset of the source frame, header included.
    pub offset: u64,
    pub data: Arc<[u8]>,
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl Frame {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
