#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err.into());
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CursorError {
    #[error("Truncated read at offset {offset}: {needed} bytes requested, {available} available")]
    Truncated {
        offset: u64,
        needed: usize,
        available: usize,
    },

    #[error("Cursor moved out of bounds: offset {offset} + {count} exceeds end {end}")]
    OutOfBounds { offset: u64, count: u64, end: u64 },

    #[error("Invalid EBML variable-length integer at offset {0}")]
    InvalidVint(u64),
}

/// Per-track failure taxonomy.
///
/// `Truncated` and `HeaderInvalid` are recoverable through resync,
/// `OutOfBounds` and `ResyncExhausted` end the track.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DemuxError {
    #[error("Truncated frame at offset {offset}: {needed} bytes needed, {available} available")]
    Truncated {
        offset: u64,
        needed: usize,
        available: usize,
    },

    #[error("Read past the end of the element at offset {offset}")]
    OutOfBounds { offset: u64 },

    #[error("Invalid frame header at offset {offset}")]
    HeaderInvalid { offset: u64 },

    #[error("No valid frame header found between offsets {from} and {to}")]
    ResyncExhausted { from: u64, to: u64 },
}

impl DemuxError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Truncated { .. } | Self::HeaderInvalid { .. })
    }

    pub fn offset(&self) -> u64 {
        match *self {
            Self::Truncated { offset, .. }
            | Self::OutOfBounds { offset }
            | Self::HeaderInvalid { offset } => offset,
            Self::ResyncExhausted { from, .. } => from,
        }
    }
}

impl From<CursorError> for DemuxError {
    fn from(err: CursorError) -> Self {
        match err {
            CursorError::Truncated {
                offset,
                needed,
                available,
            } => Self::Truncated {
                offset,
                needed,
                available,
            },
            CursorError::OutOfBounds { offset, .. } | CursorError::InvalidVint(offset) => {
                Self::OutOfBounds { offset }
            }
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ContainerError {
    #[error("Missing EBML header, not a Matroska-style container")]
    NotEbml,

    #[error("Unsupported EBML DocType {0:?}")]
    UnsupportedDocType(String),

    #[error("No Segment element found")]
    MissingSegment,

    #[error("No Tracks element found before the first cluster")]
    MissingTracks,

    #[error("TrackEntry without TrackNumber at offset {0}")]
    MissingTrackNumber(u64),

    #[error("Duplicate track number {0}")]
    DuplicateTrack(u64),

    #[error("Element {id:#X} at offset {offset} has size {size} exceeding its parent end {parent_end}")]
    ElementOverrun {
        id: u32,
        offset: u64,
        size: u64,
        parent_end: u64,
    },

    #[error("Unreadable element header at offset {0}")]
    InvalidElement(u64),

    #[error("Block at offset {offset} for track {track} uses lacing, skipping it")]
    UnsupportedLacing { track: u64, offset: u64 },

    #[error("Block at offset {offset} refers to unknown track number {track}")]
    UnknownTrack { track: u64, offset: u64 },

    #[error("Malformed block at offset {0}")]
    MalformedBlock(u64),

    #[error("Timecode of the element at offset {0} is out of range")]
    TimecodeOverflow(u64),

    #[error("Track {track}: sink write failed: {source}")]
    Sink {
        track: usize,
        #[source]
        source: std::io::Error,
    },
}
