//! Recovery after a loss of frame or cluster alignment.
//!
//! A scan starts one byte past the last good checkpoint and tries every
//! offset up to the end of the element being read; it never crosses into the
//! next element. A candidate frame only counts when another frame follows it
//! directly, or when it ends exactly at the element end. Each attempt records
//! exactly two diagnostics: the last good timecode, then the recovered
//! timecode or the failure.

use crate::codec::FrameHeader;
use crate::process::diagnostics::Diagnostics;
use crate::structs::diagnostic::DiagnosticEvent;
use crate::structs::element::{BlockElement, Element, ids};
use crate::structs::sync::SyncState;
use crate::structs::timecode::Timecode;
use crate::structs::track::Track;
use crate::utils::cursor::Cursor;
use crate::utils::errors::DemuxError;

/// A frame found by a successful scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recovery {
    pub offset: u64,
    pub header: FrameHeader,
    pub timecode: Timecode,
    /// The recovered-timecode diagnostic recorded for this attempt.
    pub event: DiagnosticEvent,
}

#[derive(Debug, Clone, Default)]
pub struct Resynchronizer {
    state: SyncState,
    scan_window: Option<usize>,
}

impl Resynchronizer {
    /// `scan_window` caps the number of offsets tried; the element end is
    /// always a hard limit.
    pub fn new(scan_window: Option<usize>) -> Self {
        Self {
            state: SyncState::default(),
            scan_window,
        }
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn checkpoint(&mut self, offset: u64, timecode: Timecode) {
        self.state.checkpoint(offset, timecode);
    }

    /// Moves the offset checkpoint to the start of a new element.
    pub fn rebase(&mut self, offset: u64) {
        self.state.rebase(offset);
    }

    fn scan_range(&self, view: &Cursor) -> (u64, u64) {
        let from = self
            .state
            .last_good_offset()
            .saturating_add(1)
            .clamp(view.start(), view.end());
        let to = match self.scan_window {
            Some(window) => from.saturating_add(window as u64).min(view.end()),
            None => view.end(),
        };

        (from, to)
    }

    /// First offset in `[from, to)` where a frame acceptable for `track` starts
    /// and ends inside `view`, confirmed by the frame after it.
    ///
    /// Returns the offset, the header and the stored length of the frame.
    pub fn scan(
        track: &Track,
        view: &Cursor,
        from: u64,
        to: u64,
    ) -> Option<(u64, FrameHeader, usize)> {
        (from..to).find_map(|offset| {
            let (header, stored_len) = track.frame_at(view.window_at(offset), offset).ok()?;
            let next = offset + stored_len as u64;

            (next == view.end() || track.frame_at(view.window_at(next), next).is_ok())
                .then_some((offset, header, stored_len))
        })
    }

    /// Timecode of a frame found at `offset` inside `block`.
    ///
    /// Uses the codec's frame duration when the header declares one, otherwise
    /// interpolates over the block's nominal duration.
    pub fn recover_timecode(
        block: &BlockElement,
        default_duration: Option<Timecode>,
        offset: u64,
        header: &FrameHeader,
    ) -> Timecode {
        let bytes_before = offset.saturating_sub(block.data_offset);

        if let Some(duration) = header.duration().filter(|_| header.frame_len > 0) {
            let frame_len = header.frame_len as u64;
            let frames = (bytes_before + frame_len / 2) / frame_len;
            return block.timecode
                + Timecode::from_nanos(duration.as_nanos().saturating_mul(frames as i64));
        }

        match block.duration.or(default_duration) {
            Some(nominal) if block.data_len() > 0 => {
                let nanos =
                    nominal.as_nanos() as i128 * bytes_before as i128 / block.data_len() as i128;
                block.timecode + Timecode::from_nanos(nanos as i64)
            }
            _ => block.timecode,
        }
    }

    /// Frame-level resync inside the codec data of `block`.
    ///
    /// `view` must cover exactly the block's codec data.
    pub fn resync(
        &mut self,
        track: &Track,
        view: &Cursor,
        block: &BlockElement,
        error_offset: u64,
        diagnostics: &mut Diagnostics,
    ) -> Result<Recovery, DemuxError> {
        self.state.lose(error_offset);
        diagnostics.last_good_timecode(
            Some(track.id),
            self.state.last_good_offset(),
            self.state.last_good_timecode(),
        );

        let (from, to) = self.scan_range(view);
        let Some((offset, header, stored_len)) = Self::scan(track, view, from, to) else {
            diagnostics.resync_failed(Some(track.id), from, to);
            return Err(DemuxError::ResyncExhausted { from, to });
        };

        self.state.recovering(offset);
        // block offsets count stored bytes
        let stored = FrameHeader {
            frame_len: stored_len,
            ..header
        };
        let timecode = Self::recover_timecode(block, track.default_duration, offset, &stored);
        let event = diagnostics
            .recovered_timecode(track.id, offset, timecode)
            .clone();

        Ok(Recovery {
            offset,
            header,
            timecode,
            event,
        })
    }

    /// First offset in `[from, to)` holding a cluster whose header fits in
    /// `segment` and whose Timecode child parses. Returns the raw timecode.
    pub fn scan_cluster(segment: &Cursor, from: u64, to: u64) -> Option<(u64, i64)> {
        let pattern = ids::CLUSTER.to_be_bytes();

        (from..to).find_map(|offset| {
            if !segment.window_at(offset).starts_with(&pattern) {
                return None;
            }

            let mut cursor = segment.sub(offset, segment.end());
            let cluster = Element::read(&mut cursor).ok()?;
            if cluster.end_or(segment.end()) > segment.end() {
                return None;
            }

            loop {
                let child = Element::read(&mut cursor).ok()?;
                let size = child.size? as usize;
                match child.id {
                    ids::VOID | ids::CRC32 => cursor.advance(size).ok()?,
                    ids::TIMECODE if size <= 8 => {
                        let ticks = cursor.read_be_uint(size).ok()?;
                        return i64::try_from(ticks).ok().map(|ticks| (offset, ticks));
                    }
                    _ => return None,
                }
            }
        })
    }

    /// Cluster-level resync after a broken element boundary in `segment`.
    pub fn resync_cluster(
        &mut self,
        segment: &Cursor,
        error_offset: u64,
        timecode_scale: u64,
        diagnostics: &mut Diagnostics,
    ) -> Result<(u64, Timecode), DemuxError> {
        self.state.lose(error_offset);
        diagnostics.last_good_timecode(
            None,
            self.state.last_good_offset(),
            self.state.last_good_timecode(),
        );

        let from = self
            .state
            .last_good_offset()
            .saturating_add(1)
            .clamp(segment.start(), segment.end());
        let to = segment.end();

        let Some((offset, ticks)) = Self::scan_cluster(segment, from, to) else {
            diagnostics.resync_failed(None, from, to);
            return Err(DemuxError::ResyncExhausted { from, to });
        };

        self.state.recovering(offset);
        let timecode = Timecode::from_scaled(ticks, timecode_scale);
        diagnostics.cluster_resynced(offset, timecode);

        Ok((offset, timecode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecKind;
    use crate::process::diagnostics::Language;
    use crate::structs::diagnostic::MessageKind;
    use crate::structs::track::HeaderRemoval;
    use crate::structs::timecode::DEFAULT_TIMECODE_SCALE;
    use crate::utils::fixture::{ac3_frame, cluster, garbage, mp3_frame, simple_block};

    fn ac3_track() -> Track {
        Track {
            id: 0,
            number: 1,
            track_type: 2,
            codec_id: "A_AC3".into(),
            codec: CodecKind::Ac3,
            header_removal: HeaderRemoval::None,
            stripped_header: Vec::new(),
            default_duration: None,
        }
    }

    fn block(data_offset: u64, data_end: u64) -> BlockElement {
        BlockElement {
            track_number: 1,
            timecode: Timecode::from_nanos(1_000_000_000),
            duration: None,
            keyframe: true,
            offset: data_offset.saturating_sub(4),
            data_offset,
            data_end,
        }
    }

    #[test]
    fn recovers_next_frame_with_codec_timecode() {
        let mut data = ac3_frame(0, 8, 1);
        data.extend(garbage(256, 2));
        data.extend(ac3_frame(0, 8, 3));
        data.extend(ac3_frame(0, 8, 4));

        let view = Cursor::new(&data);
        let block = block(0, data.len() as u64);
        let mut diagnostics = Diagnostics::new(Language::EnUs);
        let mut resync = Resynchronizer::default();
        resync.checkpoint(256, Timecode::from_nanos(1_000_000_000));

        let recovery = resync
            .resync(&ac3_track(), &view, &block, 256, &mut diagnostics)
            .unwrap();

        assert_eq!(recovery.offset, 512);
        assert_eq!(recovery.header.frame_len, 256);
        // two 32 ms frames precede the recovery point
        assert_eq!(recovery.timecode.as_nanos(), 1_064_000_000);
        assert_eq!(
            resync.state(),
            &SyncState::Recovering {
                last_good_offset: 256,
                last_good_timecode: Timecode::from_nanos(1_000_000_000),
                candidate: 512,
            }
        );

        let kinds: Vec<_> = diagnostics.events().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            [MessageKind::LastGoodTimecode, MessageKind::RecoveredTimecode]
        );
    }

    #[test]
    fn lone_header_in_garbage_is_not_a_recovery_point() {
        let mut data = garbage(10, 1);
        // 64 kbit/s header announcing a 208 byte frame that runs into real data
        data.extend([0xFF, 0xFB, 0x50, 0x44]);
        data.extend(garbage(20, 2));
        data.extend(mp3_frame(9, 0, false, 3));
        data.extend(mp3_frame(9, 0, false, 4));

        let track = Track {
            codec_id: "A_MPEG/L3".into(),
            codec: CodecKind::MpegAudio { layer: 3 },
            ..ac3_track()
        };
        let view = Cursor::new(&data);
        assert!(track.frame_at(view.window_at(10), 10).is_ok());

        let mut diagnostics = Diagnostics::new(Language::EnUs);
        let mut resync = Resynchronizer::default();
        let recovery = resync
            .resync(&track, &view, &block(0, data.len() as u64), 0, &mut diagnostics)
            .unwrap();

        assert_eq!(recovery.offset, 34);
        assert_eq!(recovery.header.frame_len, 417);
    }

    #[test]
    fn scan_stops_at_element_boundary() {
        let mut data = ac3_frame(0, 8, 1);
        data.extend(garbage(300, 2));
        let element_end = data.len() as u64;
        // the only valid header lies in the next element
        data.extend(ac3_frame(0, 8, 3));

        let stream = Cursor::new(&data);
        let view = stream.sub(0, element_end);
        let mut diagnostics = Diagnostics::new(Language::EnUs);
        let mut resync = Resynchronizer::default();
        resync.checkpoint(256, Timecode::ZERO);

        let err = resync
            .resync(&ac3_track(), &view, &block(0, element_end), 256, &mut diagnostics)
            .unwrap_err();

        assert_eq!(
            err,
            DemuxError::ResyncExhausted {
                from: 257,
                to: element_end
            }
        );
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics.events()[1].kind, MessageKind::ResyncFailed);
    }

    #[test]
    fn scan_window_limits_attempts() {
        let mut data = garbage(300, 5);
        data.extend(ac3_frame(0, 8, 6));

        let view = Cursor::new(&data);
        let track = ac3_track();
        let mut diagnostics = Diagnostics::new(Language::EnUs);

        let mut bounded = Resynchronizer::new(Some(100));
        assert!(
            bounded
                .resync(&track, &view, &block(0, data.len() as u64), 0, &mut diagnostics)
                .is_err()
        );

        let mut unbounded = Resynchronizer::new(None);
        let recovery = unbounded
            .resync(&track, &view, &block(0, data.len() as u64), 0, &mut diagnostics)
            .unwrap();
        assert_eq!(recovery.offset, 300);
    }

    #[test]
    fn interpolated_timecode() {
        let header = FrameHeader {
            header_len: 0,
            frame_len: 10,
            samples: 0,
            sample_rate: 0,
        };
        let mut block = block(1000, 2000);

        assert_eq!(
            Resynchronizer::recover_timecode(&block, None, 1250, &header),
            block.timecode
        );
        assert_eq!(
            Resynchronizer::recover_timecode(
                &block,
                Some(Timecode::from_nanos(100_000_000)),
                1250,
                &header
            )
            .as_nanos(),
            1_025_000_000
        );

        // BlockDuration wins over DefaultDuration
        block.duration = Some(Timecode::from_nanos(40_000_000));
        assert_eq!(
            Resynchronizer::recover_timecode(
                &block,
                Some(Timecode::from_nanos(100_000_000)),
                1500,
                &header
            )
            .as_nanos(),
            1_020_000_000
        );
    }

    #[test]
    fn finds_cluster_after_garbage() {
        let mut data = garbage(77, 9);
        data.extend(cluster(5000, &[simple_block(1, 0, &ac3_frame(0, 8, 1))]));

        let segment = Cursor::new(&data);
        assert_eq!(
            Resynchronizer::scan_cluster(&segment, 0, data.len() as u64),
            Some((77, 5000))
        );

        let mut diagnostics = Diagnostics::new(Language::EnUs);
        let mut resync = Resynchronizer::default();
        let (offset, timecode) = resync
            .resync_cluster(&segment, 10, DEFAULT_TIMECODE_SCALE, &mut diagnostics)
            .unwrap();
        assert_eq!(offset, 77);
        assert_eq!(timecode.as_nanos(), 5_000_000_000);
        assert_eq!(
            diagnostics.events()[1].kind,
            MessageKind::ClusterResynced
        );

        // a truncated cluster is not a recovery point
        let truncated = &data[..data.len() - 10];
        let segment = Cursor::new(truncated);
        assert_eq!(
            Resynchronizer::scan_cluster(&segment, 0, truncated.len() as u64),
            None
        );
    }
}
