//! Synchronisation state of a read loop.

use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::structs::timecode::Timecode;

/// Where a read loop stands relative to the frame (or cluster) grid.
///
/// Every variant carries the last checkpoint that was known to be good, so a
/// lost loop can always report the timecode it had reached before the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncState {
    InSync {
        last_good_offset: u64,
        last_good_timecode: Timecode,
    },
    Lost {
        last_good_offset: u64,
        last_good_timecode: Timecode,
        error_offset: u64,
    },
    Recovering {
        last_good_offset: u64,
        last_good_timecode: Timecode,
        candidate: u64,
    },
}

impl Default for SyncState {
    fn default() -> Self {
        Self::InSync {
            last_good_offset: 0,
            last_good_timecode: Timecode::ZERO,
        }
    }
}

impl SyncState {
    pub fn last_good_offset(&self) -> u64 {
        match *self {
            Self::InSync {
                last_good_offset, ..
            }
            | Self::Lost {
                last_good_offset, ..
            }
            | Self::Recovering {
                last_good_offset, ..
            } => last_good_offset,
        }
    }

    pub fn last_good_timecode(&self) -> Timecode {
        match *self {
            Self::InSync {
                last_good_timecode,
                ..
            }
            | Self::Lost {
                last_good_timecode,
                ..
            }
            | Self::Recovering {
                last_good_timecode,
                ..
            } => last_good_timecode,
        }
    }

    pub fn is_in_sync(&self) -> bool {
        matches!(self, Self::InSync { .. })
    }

    /// A new good checkpoint; always returns to `InSync`.
    pub(crate) fn checkpoint(&mut self, offset: u64, timecode: Timecode) {
        *self = Self::InSync {
            last_good_offset: offset,
            last_good_timecode: timecode,
        };
    }

    /// Moves the offset checkpoint without touching the timecode.
    pub(crate) fn rebase(&mut self, offset: u64) {
        let last_good_timecode = self.last_good_timecode();
        self.checkpoint(offset, last_good_timecode);
    }

    pub(crate) fn lose(&mut self, error_offset: u64) {
        *self = Self::Lost {
            last_good_offset: self.last_good_offset(),
            last_good_timecode: self.last_good_timecode(),
            error_offset,
        };
    }

    pub(crate) fn recovering(&mut self, candidate: u64) {
        *self = Self::Recovering {
            last_good_offset: self.last_good_offset(),
            last_good_timecode: self.last_good_timecode(),
            candidate,
        };
    }
}

impl Display for SyncState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InSync { .. } => write!(f, "in sync"),
            Self::Lost { error_offset, .. } => write!(f, "lost at offset {error_offset}"),
            Self::Recovering { candidate, .. } => {
                write!(f, "recovering at offset {candidate}")
            }
        }
    }
}

#[test]
fn lost_keeps_last_good_checkpoint() {
    let mut state = SyncState::default();
    state.checkpoint(512, Timecode::from_nanos(64_000_000));
    state.lose(600);

    assert_eq!(
        state,
        SyncState::Lost {
            last_good_offset: 512,
            last_good_timecode: Timecode::from_nanos(64_000_000),
            error_offset: 600,
        }
    );

    state.recovering(768);
    assert_eq!(state.last_good_offset(), 512);
    assert_eq!(state.to_string(), "recovering at offset 768");

    state.rebase(1024);
    assert!(state.is_in_sync());
    assert_eq!(state.last_good_timecode().as_nanos(), 64_000_000);
}
