//! Per-track frame demultiplexing.
//!
//! A [`TrackDemuxer`] walks the codec data of each block of its track, frame
//! by frame, validating every header before it is consumed:
//!
//! ```text
//! AwaitingHeader --valid header--> Emitting --frame consumed--> AwaitingHeader
//! AwaitingHeader --invalid------> Resyncing --found--> Emitting
//!                                           --exhausted--> Failed
//! ```
//!
//! A failed track ignores all further blocks; other tracks are unaffected.

use std::io::{self, Write};
use std::sync::Arc;

use serde::Serialize;

use crate::codec::FrameHeader;
use crate::process::diagnostics::Diagnostics;
use crate::process::resync::Resynchronizer;
use crate::structs::diagnostic::DiagnosticEvent;
use crate::structs::element::BlockElement;
use crate::structs::frame::Frame;
use crate::structs::sync::SyncState;
use crate::structs::timecode::Timecode;
use crate::structs::track::Track;
use crate::utils::cursor::Cursor;
use crate::utils::errors::{ContainerError, DemuxError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DemuxState {
    #[default]
    AwaitingHeader,
    Emitting,
    Resyncing,
    Failed,
}

/// Outcome of one [`TrackDemuxer::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Frame(Frame),
    /// A resync succeeded; the recovered frame is returned by the next step.
    Recovered(DiagnosticEvent),
    /// The track cannot be read any further.
    Fatal(DemuxError),
    /// The block has no more data.
    Done,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrackStats {
    pub blocks: u64,
    pub frames: u64,
    /// Source frame bytes, headers included.
    pub bytes_in: u64,
    /// Emitted bytes after header removal.
    pub bytes_out: u64,
    pub resyncs: u64,
    pub recovered_frames: u64,
}

/// Destination of the frames of one track, in traversal order.
pub trait FrameSink {
    fn push(&mut self, frame: Frame) -> io::Result<()>;

    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl FrameSink for Vec<Frame> {
    fn push(&mut self, frame: Frame) -> io::Result<()> {
        Vec::push(self, frame);
        Ok(())
    }
}

impl<T: FrameSink + ?Sized> FrameSink for Box<T> {
    fn push(&mut self, frame: Frame) -> io::Result<()> {
        (**self).push(frame)
    }

    fn finish(&mut self) -> io::Result<()> {
        (**self).finish()
    }
}

/// Writes frame payloads back to back.
#[derive(Debug)]
pub struct WriteSink<W: Write> {
    writer: W,
    frames: u64,
    written: u64,
}

impl<W: Write> WriteSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            frames: 0,
            written: 0,
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> FrameSink for WriteSink<W> {
    fn push(&mut self, frame: Frame) -> io::Result<()> {
        self.writer.write_all(frame.as_ref())?;
        self.frames += 1;
        self.written += frame.len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

#[derive(Debug, Clone)]
pub struct TrackDemuxer {
    track: Track,
    state: DemuxState,
    resync: Resynchronizer,
    /// Header and recovered timecode of the frame to emit next.
    pending: Option<(FrameHeader, Timecode)>,
    next_timecode: Timecode,
    stats: TrackStats,
}

impl TrackDemuxer {
    pub fn new(track: Track, scan_window: Option<usize>) -> Self {
        Self {
            track,
            state: DemuxState::default(),
            resync: Resynchronizer::new(scan_window),
            pending: None,
            next_timecode: Timecode::ZERO,
            stats: TrackStats::default(),
        }
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn state(&self) -> DemuxState {
        self.state
    }

    pub fn sync_state(&self) -> &SyncState {
        self.resync.state()
    }

    pub fn stats(&self) -> &TrackStats {
        &self.stats
    }

    pub fn is_failed(&self) -> bool {
        self.state == DemuxState::Failed
    }

    /// Prepares for a new block whose codec data is covered by `view`.
    pub fn begin_block(&mut self, view: &mut Cursor, block: &BlockElement) {
        if self.is_failed() {
            return;
        }

        self.state = DemuxState::AwaitingHeader;
        self.pending = None;
        self.next_timecode = block.timecode;
        self.stats.blocks += 1;

        view.mark();
        self.resync.rebase(view.last_good());
    }

    /// Demultiplexes all frames of one block into `sink`.
    pub fn demux_block<S: FrameSink + ?Sized>(
        &mut self,
        mut view: Cursor,
        block: &BlockElement,
        diagnostics: &mut Diagnostics,
        sink: &mut S,
    ) -> Result<(), ContainerError> {
        self.begin_block(&mut view, block);

        loop {
            match self.step(&mut view, block, diagnostics) {
                Step::Frame(frame) => sink.push(frame).map_err(|source| ContainerError::Sink {
                    track: self.track.id,
                    source,
                })?,
                Step::Recovered(_) => {}
                Step::Fatal(_) | Step::Done => return Ok(()),
            }
        }
    }

    /// Advances by one frame, one resync attempt, or to the end of the block.
    pub fn step(
        &mut self,
        view: &mut Cursor,
        block: &BlockElement,
        diagnostics: &mut Diagnostics,
    ) -> Step {
        match self.state {
            DemuxState::Failed => Step::Done,
            DemuxState::Emitting | DemuxState::Resyncing => match self.pending.take() {
                Some((header, timecode)) => self.emit(view, header, Some(timecode), diagnostics),
                None => {
                    self.state = DemuxState::AwaitingHeader;
                    self.step(view, block, diagnostics)
                }
            },
            DemuxState::AwaitingHeader => {
                if view.is_empty() {
                    return Step::Done;
                }

                match self.validate(view) {
                    Ok(header) => self.emit(view, header, None, diagnostics),
                    Err(err) if err.is_recoverable() => {
                        self.recover(view, block, err, diagnostics)
                    }
                    Err(err) => self.fail(err, diagnostics),
                }
            }
        }
    }

    fn validate(&self, view: &Cursor) -> Result<FrameHeader, DemuxError> {
        let window = view.window(view.remaining());
        let (header, _) = self.track.frame_at(window, view.position())?;

        Ok(header)
    }

    fn emit(
        &mut self,
        view: &mut Cursor,
        header: FrameHeader,
        recovered: Option<Timecode>,
        diagnostics: &mut Diagnostics,
    ) -> Step {
        self.state = DemuxState::Emitting;

        let offset = view.position();
        let stored_len = header
            .frame_len
            .saturating_sub(self.track.stripped_header.len());
        let stored = match view.take(stored_len) {
            Ok(stored) => stored,
            // cut short inside its declared length: not recoverable
            Err(err) => return self.fail(err.into(), diagnostics),
        };
        let source = self.track.restore(stored);
        let Some(payload) = self.track.header_removal.strip(&source) else {
            return self.fail(DemuxError::HeaderInvalid { offset }, diagnostics);
        };

        let timecode = recovered.unwrap_or(self.next_timecode);
        self.next_timecode = timecode + header.duration().unwrap_or(Timecode::ZERO);

        self.stats.frames += 1;
        self.stats.bytes_in += source.len() as u64;
        self.stats.bytes_out += payload.len() as u64;
        self.stats.recovered_frames += recovered.is_some() as u64;

        view.mark();
        self.resync.checkpoint(view.last_good(), timecode);
        self.state = DemuxState::AwaitingHeader;

        Step::Frame(Frame {
            track: self.track.id,
            timecode,
            recovered: recovered.is_some(),
            offset,
            data: Arc::from(payload),
        })
    }

    fn recover(
        &mut self,
        view: &mut Cursor,
        block: &BlockElement,
        err: DemuxError,
        diagnostics: &mut Diagnostics,
    ) -> Step {
        log::debug!("Track {}: {err}, resyncing", self.track.id);

        self.state = DemuxState::Resyncing;
        self.stats.resyncs += 1;

        let recovery =
            match self
                .resync
                .resync(&self.track, view, block, err.offset(), diagnostics)
            {
                Ok(recovery) => recovery,
                Err(err) => return self.fail(err, diagnostics),
            };

        if let Err(err) = view.seek_to(recovery.offset) {
            return self.fail(err.into(), diagnostics);
        }

        self.pending = Some((recovery.header, recovery.timecode));
        self.state = DemuxState::Emitting;
        Step::Recovered(recovery.event)
    }

    fn fail(&mut self, err: DemuxError, diagnostics: &mut Diagnostics) -> Step {
        self.state = DemuxState::Failed;
        self.pending = None;

        // exhaustion was already reported by the resynchronizer
        if !matches!(err, DemuxError::ResyncExhausted { .. }) {
            diagnostics.track_failed(self.track.id, err.offset(), &err);
        }

        Step::Fatal(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecKind;
    use crate::process::diagnostics::Language;
    use crate::structs::diagnostic::MessageKind;
    use crate::structs::track::HeaderRemoval;
    use crate::utils::fixture::{ac3_frame, flac_frame, garbage};

    fn track(codec: CodecKind, header_removal: HeaderRemoval) -> Track {
        Track {
            id: 0,
            number: 1,
            track_type: 2,
            codec_id: String::new(),
            codec,
            header_removal,
            stripped_header: Vec::new(),
            default_duration: None,
        }
    }

    fn block(data: &[u8]) -> BlockElement {
        BlockElement {
            track_number: 1,
            timecode: Timecode::from_nanos(2_000_000_000),
            duration: None,
            keyframe: true,
            offset: 0,
            data_offset: 0,
            data_end: data.len() as u64,
        }
    }

    fn frames(count: u32) -> Vec<Vec<u8>> {
        (0..count).map(|seed| ac3_frame(0, 8, seed)).collect()
    }

    #[test]
    fn clean_block() {
        let source = frames(4);
        let data = source.concat();
        let mut demuxer = TrackDemuxer::new(track(CodecKind::Ac3, HeaderRemoval::None), None);
        let mut diagnostics = Diagnostics::new(Language::EnUs);
        let mut sink = Vec::new();

        demuxer
            .demux_block(Cursor::new(&data), &block(&data), &mut diagnostics, &mut sink)
            .unwrap();

        assert!(diagnostics.is_empty());
        assert_eq!(sink.len(), 4);
        for (i, frame) in sink.iter().enumerate() {
            assert_eq!(frame.as_ref(), source[i].as_slice());
            assert_eq!(frame.timecode.as_nanos(), 2_000_000_000 + i as i64 * 32_000_000);
            assert!(!frame.recovered);
        }
        assert_eq!(demuxer.stats().frames, 4);
        assert_eq!(demuxer.state(), DemuxState::AwaitingHeader);
        assert!(demuxer.sync_state().is_in_sync());
    }

    #[test]
    fn resyncs_past_corrupted_frame() {
        let mut source = frames(4);
        source[1][0] = 0x00;
        let data = source.concat();
        let block = block(&data);

        let mut demuxer = TrackDemuxer::new(track(CodecKind::Ac3, HeaderRemoval::None), None);
        let mut diagnostics = Diagnostics::new(Language::EnUs);
        let mut view = Cursor::new(&data);
        demuxer.begin_block(&mut view, &block);

        let Step::Frame(first) = demuxer.step(&mut view, &block, &mut diagnostics) else {
            panic!("expected the first frame");
        };
        assert_eq!(first.offset, 0);

        let Step::Recovered(event) = demuxer.step(&mut view, &block, &mut diagnostics) else {
            panic!("expected a recovery");
        };
        assert_eq!(event.kind, MessageKind::RecoveredTimecode);
        assert_eq!(event.offset, 512);
        assert_eq!(demuxer.state(), DemuxState::Emitting);

        let Step::Frame(recovered) = demuxer.step(&mut view, &block, &mut diagnostics) else {
            panic!("expected the recovered frame");
        };
        assert!(recovered.recovered);
        assert_eq!(recovered.timecode.as_nanos(), 2_064_000_000);
        assert_eq!(recovered.as_ref(), source[2].as_slice());

        let Step::Frame(last) = demuxer.step(&mut view, &block, &mut diagnostics) else {
            panic!("expected the last frame");
        };
        assert!(!last.recovered);
        assert_eq!(last.timecode.as_nanos(), 2_096_000_000);
        assert_eq!(
            demuxer.step(&mut view, &block, &mut diagnostics),
            Step::Done
        );

        let kinds: Vec<_> = diagnostics.events().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            [MessageKind::LastGoodTimecode, MessageKind::RecoveredTimecode]
        );
        assert_eq!(diagnostics.events()[0].offset, 256);
        assert_eq!(
            diagnostics.events()[0].timecode,
            Some(Timecode::from_nanos(2_000_000_000))
        );
        assert_eq!(demuxer.stats().resyncs, 1);
    }

    #[test]
    fn trailing_garbage_fails_track() {
        let mut data = frames(2).concat();
        data.extend(garbage(3, 1));

        let mut demuxer = TrackDemuxer::new(track(CodecKind::Ac3, HeaderRemoval::None), None);
        let mut diagnostics = Diagnostics::new(Language::EnUs);
        let mut sink = Vec::new();

        demuxer
            .demux_block(Cursor::new(&data), &block(&data), &mut diagnostics, &mut sink)
            .unwrap();

        assert_eq!(sink.len(), 2);
        assert!(demuxer.is_failed());
        let kinds: Vec<_> = diagnostics.events().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            [MessageKind::LastGoodTimecode, MessageKind::ResyncFailed]
        );

        // later blocks of a failed track are ignored
        let data = frames(1).concat();
        demuxer
            .demux_block(Cursor::new(&data), &block(&data), &mut diagnostics, &mut sink)
            .unwrap();
        assert_eq!(sink.len(), 2);
        assert_eq!(diagnostics.len(), 2);
    }

    #[test]
    fn header_removal_round_trip() {
        let source = frames(3);
        let data = source.concat();
        let policy = HeaderRemoval::StripPattern(vec![0x0B, 0x77]);
        let mut demuxer = TrackDemuxer::new(track(CodecKind::Ac3, policy.clone()), None);
        let mut diagnostics = Diagnostics::new(Language::EnUs);
        let mut sink = Vec::new();

        demuxer
            .demux_block(Cursor::new(&data), &block(&data), &mut diagnostics, &mut sink)
            .unwrap();

        assert_eq!(sink.len(), 3);
        for (frame, original) in sink.iter().zip(&source) {
            assert_eq!(frame.len(), original.len() - policy.len());
            assert_eq!(&policy.restore(frame.as_ref()).unwrap(), original);
        }
        assert_eq!(demuxer.stats().bytes_in - demuxer.stats().bytes_out, 6);
    }

    #[test]
    fn flac_resync_after_damaged_frame() {
        let mut source: Vec<_> = (0..3).map(|seed| flac_frame(4096, 9, 180, seed)).collect();
        source[1][120] ^= 0x20;
        let data = source.concat();

        let mut demuxer = TrackDemuxer::new(track(CodecKind::Flac, HeaderRemoval::None), None);
        let mut diagnostics = Diagnostics::new(Language::EnUs);
        let mut sink = Vec::new();

        demuxer
            .demux_block(Cursor::new(&data), &block(&data), &mut diagnostics, &mut sink)
            .unwrap();

        assert_eq!(sink.len(), 2);
        assert_eq!(sink[0].as_ref(), source[0].as_slice());
        assert_eq!(sink[1].as_ref(), source[2].as_slice());
        assert!(sink[1].recovered);
        // two 4096-sample frames at 44.1 kHz precede the recovered one
        assert_eq!(sink[1].timecode.as_nanos(), 2_185_759_638);
        assert_eq!(
            diagnostics.events().iter().map(|e| e.kind).collect::<Vec<_>>(),
            [MessageKind::LastGoodTimecode, MessageKind::RecoveredTimecode]
        );
    }

    #[test]
    fn restores_container_stripped_header() {
        let source = frames(3);
        let data: Vec<u8> = source.iter().flat_map(|f| f[2..].to_vec()).collect();
        let mut track = track(CodecKind::Ac3, HeaderRemoval::None);
        track.stripped_header = vec![0x0B, 0x77];

        let mut demuxer = TrackDemuxer::new(track, None);
        let mut diagnostics = Diagnostics::new(Language::EnUs);
        let mut sink = Vec::new();

        demuxer
            .demux_block(Cursor::new(&data), &block(&data), &mut diagnostics, &mut sink)
            .unwrap();

        assert!(diagnostics.is_empty());
        assert_eq!(sink.len(), 3);
        for (i, frame) in sink.iter().enumerate() {
            assert_eq!(frame.as_ref(), source[i].as_slice());
            assert_eq!(frame.offset, i as u64 * 254);
        }
        assert_eq!(demuxer.stats().bytes_in, 768);
    }

    #[test]
    fn resyncs_inside_stripped_track() {
        let source = frames(4);
        let mut stored: Vec<Vec<u8>> = source.iter().map(|f| f[2..].to_vec()).collect();
        let last = stored[1].len() - 1;
        stored[1][last] ^= 0xFF;
        let data = stored.concat();

        let mut track = track(CodecKind::Ac3, HeaderRemoval::None);
        track.stripped_header = vec![0x0B, 0x77];
        let mut demuxer = TrackDemuxer::new(track, None);
        let mut diagnostics = Diagnostics::new(Language::EnUs);
        let mut sink = Vec::new();

        demuxer
            .demux_block(Cursor::new(&data), &block(&data), &mut diagnostics, &mut sink)
            .unwrap();

        assert_eq!(sink.len(), 3);
        assert_eq!(sink[1].as_ref(), source[2].as_slice());
        assert_eq!(sink[1].offset, 2 * 254);
        assert!(sink[1].recovered);
        assert_eq!(diagnostics.len(), 2);
    }

    #[test]
    fn strip_fixed_header_length() {
        let source = frames(2);
        let data = source.concat();
        let policy = HeaderRemoval::StripBytes(crate::codec::ac3::AC3_HEADER_LEN);
        let mut demuxer = TrackDemuxer::new(track(CodecKind::Ac3, policy), None);
        let mut diagnostics = Diagnostics::new(Language::EnUs);
        let mut sink = Vec::new();

        demuxer
            .demux_block(Cursor::new(&data), &block(&data), &mut diagnostics, &mut sink)
            .unwrap();

        for (frame, original) in sink.iter().zip(&source) {
            assert_eq!(frame.len(), original.len() - 5);
            let mut rebuilt = original[..5].to_vec();
            rebuilt.extend_from_slice(frame.as_ref());
            assert_eq!(&rebuilt, original);
        }
    }

    #[test]
    fn passthrough_emits_whole_block() {
        let data = b"subtitle text".to_vec();
        let mut demuxer =
            TrackDemuxer::new(track(CodecKind::Passthrough, HeaderRemoval::None), None);
        let mut diagnostics = Diagnostics::new(Language::EnUs);
        let mut sink = WriteSink::new(Vec::new());

        demuxer
            .demux_block(Cursor::new(&data), &block(&data), &mut diagnostics, &mut sink)
            .unwrap();
        sink.finish().unwrap();

        assert_eq!(sink.frames(), 1);
        assert_eq!(sink.into_inner(), data);
    }
}
