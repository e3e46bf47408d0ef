//! Ordered, queryable diagnostics log.
//!
//! The emitter is append-only: events are never changed or reordered once
//! recorded, so per-track ordering always follows traversal order. Each event
//! is logged through `log` at its severity as it is recorded; the language
//! passed to [`Diagnostics::new`] only changes message text.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use anyhow::bail;
use serde::Serialize;

use crate::structs::diagnostic::{DiagnosticEvent, MessageKind, Severity};
use crate::structs::timecode::Timecode;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum Language {
    #[default]
    #[serde(rename = "en-US")]
    EnUs,
    #[serde(rename = "de-DE")]
    DeDe,
}

impl FromStr for Language {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.replace('_', "-").to_ascii_lowercase();
        match normalized.split('-').next() {
            Some("en") => Ok(Self::EnUs),
            Some("de") => Ok(Self::DeDe),
            _ => bail!("Unsupported language {s:?}, expected en-US or de-DE"),
        }
    }
}

impl Display for Language {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EnUs => write!(f, "en-US"),
            Self::DeDe => write!(f, "de-DE"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    language: Language,
    events: Vec<DiagnosticEvent>,
}

impl Diagnostics {
    pub fn new(language: Language) -> Self {
        Self {
            language,
            events: Vec::new(),
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    fn record(
        &mut self,
        severity: Severity,
        kind: MessageKind,
        offset: u64,
        timecode: Option<Timecode>,
        track: Option<usize>,
        text: String,
    ) -> &DiagnosticEvent {
        log::log!(severity.log_level(), "{text}");

        let index = self.events.len();
        self.events.push(DiagnosticEvent {
            severity,
            kind,
            offset,
            timecode,
            track,
            text,
        });
        &self.events[index]
    }

    fn prefixed(&self, track: Option<usize>, text: String) -> String {
        match (track, self.language) {
            (None, _) => text,
            (Some(id), Language::EnUs) => format!("Track {id}: {text}"),
            (Some(id), Language::DeDe) => format!("Spur {id}: {text}"),
        }
    }

    /// First event of every resync attempt.
    pub fn last_good_timecode(
        &mut self,
        track: Option<usize>,
        offset: u64,
        timecode: Timecode,
    ) -> &DiagnosticEvent {
        let text = match self.language {
            Language::EnUs => format!(
                "the last timecode processed before the error was encountered was {timecode} (offset {offset})"
            ),
            Language::DeDe => format!(
                "der letzte vor dem Fehler verarbeitete Zeitstempel war {timecode} (Position {offset})"
            ),
        };
        let text = capitalize_first(self.prefixed(track, text), track.is_none());

        self.record(
            Severity::Warning,
            MessageKind::LastGoodTimecode,
            offset,
            Some(timecode),
            track,
            text,
        )
    }

    pub fn recovered_timecode(
        &mut self,
        track: usize,
        offset: u64,
        timecode: Timecode,
    ) -> &DiagnosticEvent {
        let text = match self.language {
            Language::EnUs => format!(
                "the first frame timecode after the resync is {timecode} (offset {offset})"
            ),
            Language::DeDe => format!(
                "der erste Frame-Zeitstempel nach der Resynchronisation ist {timecode} (Position {offset})"
            ),
        };
        let text = self.prefixed(Some(track), text);

        self.record(
            Severity::Warning,
            MessageKind::RecoveredTimecode,
            offset,
            Some(timecode),
            Some(track),
            text,
        )
    }

    pub fn cluster_resynced(&mut self, offset: u64, timecode: Timecode) -> &DiagnosticEvent {
        let text = match self.language {
            Language::EnUs => format!(
                "Resync completed; the first cluster timecode after the resync is {timecode} (offset {offset})"
            ),
            Language::DeDe => format!(
                "Resynchronisation abgeschlossen; der erste Cluster-Zeitstempel nach der Resynchronisation ist {timecode} (Position {offset})"
            ),
        };

        self.record(
            Severity::Warning,
            MessageKind::ClusterResynced,
            offset,
            Some(timecode),
            None,
            text,
        )
    }

    /// Second event of a resync attempt that found nothing in `[from, to)`.
    pub fn resync_failed(&mut self, track: Option<usize>, from: u64, to: u64) -> &DiagnosticEvent {
        let text = match (track, self.language) {
            (Some(_), Language::EnUs) => format!(
                "no valid frame header found between offsets {from} and {to}; the track cannot be read any further"
            ),
            (Some(_), Language::DeDe) => format!(
                "kein gültiger Frame-Kopf zwischen Position {from} und {to} gefunden; die Spur kann nicht weiter gelesen werden"
            ),
            (None, Language::EnUs) => {
                format!("Resync failed: no further cluster found between offsets {from} and {to}")
            }
            (None, Language::DeDe) => format!(
                "Resynchronisation fehlgeschlagen: kein weiterer Cluster zwischen Position {from} und {to} gefunden"
            ),
        };
        let text = self.prefixed(track, text);

        self.record(
            Severity::Fatal,
            MessageKind::ResyncFailed,
            from,
            None,
            track,
            text,
        )
    }

    pub fn track_failed(
        &mut self,
        track: usize,
        offset: u64,
        reason: &dyn Display,
    ) -> &DiagnosticEvent {
        let text = match self.language {
            Language::EnUs => format!("{reason}; the track cannot be read any further"),
            Language::DeDe => format!("{reason}; die Spur kann nicht weiter gelesen werden"),
        };
        let text = self.prefixed(Some(track), text);

        self.record(
            Severity::Fatal,
            MessageKind::TrackFailed,
            offset,
            None,
            Some(track),
            text,
        )
    }

    pub fn block_skipped(&mut self, offset: u64, reason: &dyn Display) -> &DiagnosticEvent {
        let text = match self.language {
            Language::EnUs => format!("Block skipped: {reason}"),
            Language::DeDe => format!("Block übersprungen: {reason}"),
        };

        self.record(
            Severity::Warning,
            MessageKind::BlockSkipped,
            offset,
            None,
            None,
            text,
        )
    }

    pub fn events(&self) -> &[DiagnosticEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<DiagnosticEvent> {
        self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events whose kind matches `pattern`, in recording order.
    pub fn matching<'a>(&'a self, pattern: &'a str) -> impl Iterator<Item = &'a DiagnosticEvent> {
        self.events
            .iter()
            .filter(move |event| event.kind.matches(pattern))
    }

    pub fn for_track(&self, track: usize) -> impl Iterator<Item = &DiagnosticEvent> {
        self.events
            .iter()
            .filter(move |event| event.track == Some(track))
    }

    pub fn worst_severity(&self) -> Option<Severity> {
        self.events.iter().map(|event| event.severity).max()
    }
}

fn capitalize_first(text: String, capitalize: bool) -> String {
    if !capitalize {
        return text;
    }

    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_language() {
        assert_eq!("en_US".parse::<Language>().unwrap(), Language::EnUs);
        assert_eq!("de-DE".parse::<Language>().unwrap(), Language::DeDe);
        assert_eq!("de".parse::<Language>().unwrap(), Language::DeDe);
        assert!("fr-FR".parse::<Language>().is_err());
        assert_eq!(Language::DeDe.to_string(), "de-DE");
    }

    #[test]
    fn events_keep_order_and_match_patterns() {
        let mut diagnostics = Diagnostics::new(Language::EnUs);
        let tc = Timecode::from_nanos(1_500_000_000);

        diagnostics.last_good_timecode(Some(0), 100, tc);
        diagnostics.recovered_timecode(0, 356, tc);
        diagnostics.block_skipped(900, &"laced block");

        let kinds: Vec<_> = diagnostics.events().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            [
                MessageKind::LastGoodTimecode,
                MessageKind::RecoveredTimecode,
                MessageKind::BlockSkipped
            ]
        );
        assert_eq!(diagnostics.matching("resync.*").count(), 2);
        assert_eq!(diagnostics.matching("block.skipped").count(), 1);
        assert_eq!(diagnostics.for_track(0).count(), 2);
        assert_eq!(diagnostics.worst_severity(), Some(Severity::Warning));

        diagnostics.resync_failed(Some(1), 10, 20);
        assert_eq!(diagnostics.worst_severity(), Some(Severity::Fatal));
    }

    #[test]
    fn english_text() {
        let mut diagnostics = Diagnostics::new(Language::EnUs);
        let tc = Timecode::from_nanos(2_000_000_000);

        let text = diagnostics.last_good_timecode(None, 4096, tc).text.clone();
        assert_eq!(
            text,
            "The last timecode processed before the error was encountered was 00:00:02.000000000 (offset 4096)"
        );
        let text = diagnostics.cluster_resynced(8192, tc).text.clone();
        assert!(text.starts_with("Resync completed; the first cluster timecode after the resync"));

        let text = diagnostics.recovered_timecode(3, 10, tc).text.clone();
        assert!(text.starts_with("Track 3: the first frame timecode"));
    }

    #[test]
    fn german_text() {
        let mut diagnostics = Diagnostics::new(Language::DeDe);
        let tc = Timecode::from_nanos(2_000_000_000);

        let text = diagnostics.last_good_timecode(Some(1), 4096, tc).text.clone();
        assert_eq!(
            text,
            "Spur 1: der letzte vor dem Fehler verarbeitete Zeitstempel war 00:00:02.000000000 (Position 4096)"
        );
        let text = diagnostics.cluster_resynced(8192, tc).text.clone();
        assert!(text.contains("erste Cluster-Zeitstempel nach der Resynchronisation"));

        // kinds do not depend on the language
        assert_eq!(diagnostics.matching("resync.*").count(), 2);
    }
}
