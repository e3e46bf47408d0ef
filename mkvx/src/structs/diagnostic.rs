//! Diagnostic records produced while reading a stream.

use std::fmt::{Display, Formatter};

use serde::{Serialize, Serializer};

use crate::structs::timecode::Timecode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    /// The affected track, or the whole run, cannot continue.
    Fatal,
}

impl Severity {
    pub fn log_level(&self) -> log::Level {
        match self {
            Self::Info => log::Level::Info,
            Self::Warning => log::Level::Warn,
            Self::Fatal => log::Level::Error,
        }
    }
}

/// Distinguishable kind of a diagnostic, addressed by a dotted name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Last good timecode seen before a loss of sync.
    LastGoodTimecode,
    /// First frame timecode after a successful frame-level resync.
    RecoveredTimecode,
    /// First cluster timecode after a successful cluster-level resync.
    ClusterResynced,
    ResyncFailed,
    TrackFailed,
    BlockSkipped,
}

impl MessageKind {
    pub const ALL: [MessageKind; 6] = [
        Self::LastGoodTimecode,
        Self::RecoveredTimecode,
        Self::ClusterResynced,
        Self::ResyncFailed,
        Self::TrackFailed,
        Self::BlockSkipped,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::LastGoodTimecode => "resync.last_good_timecode",
            Self::RecoveredTimecode => "resync.recovered_timecode",
            Self::ClusterResynced => "resync.cluster_timecode",
            Self::ResyncFailed => "resync.failed",
            Self::TrackFailed => "track.failed",
            Self::BlockSkipped => "block.skipped",
        }
    }

    pub fn is_resync(&self) -> bool {
        self.name().starts_with("resync.")
    }

    /// Matches an exact kind name, or a prefix followed by `*`.
    ///
    /// `"resync.*"` matches every resync event and `"*"` matches everything.
    pub fn matches(&self, pattern: &str) -> bool {
        match pattern.strip_suffix('*') {
            Some(prefix) => self.name().starts_with(prefix),
            None => self.name() == pattern,
        }
    }
}

impl Display for MessageKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for MessageKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// An immutable diagnostic record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticEvent {
    pub severity: Severity,
    pub kind: MessageKind,
    /// Stream offset the event refers to.
    pub offset: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timecode: Option<Timecode>,
    /// Affected track; `None` for container-level events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<usize>,
    pub text: String,
}

impl Display for DiagnosticEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

#[test]
fn kind_patterns() {
    assert!(MessageKind::LastGoodTimecode.matches("resync.last_good_timecode"));
    assert!(MessageKind::LastGoodTimecode.matches("resync.*"));
    assert!(MessageKind::ClusterResynced.matches("*"));
    assert!(!MessageKind::TrackFailed.matches("resync.*"));
    assert!(!MessageKind::ResyncFailed.matches("resync.fail"));

    let resync = MessageKind::ALL.iter().filter(|kind| kind.is_resync()).count();
    assert_eq!(resync, 4);
    assert!(Severity::Fatal > Severity::Warning);
}
