//! Container traversal.
//!
//! [`Demuxer::open`] reads the EBML header, the Segment's Info and Tracks,
//! and stops at the first Cluster. [`Demuxer::run`] then walks every cluster
//! once, in stream order, handing each block's codec data to the
//! [`TrackDemuxer`] of its track.
//!
//! A broken element boundary between or inside clusters (an unreadable
//! header, or a size running past its parent) triggers a cluster-level
//! resync: the stream is scanned for the next cluster with a readable
//! Timecode, and traversal continues there.

use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::{Result, bail, ensure};
use log::{Level, debug, info, warn};
use serde::Serialize;

use crate::codec::CodecKind;
use crate::log_or_err;
use crate::process::demux::{DemuxState, FrameSink, TrackDemuxer, TrackStats};
use crate::process::diagnostics::{Diagnostics, Language};
use crate::process::resync::Resynchronizer;
use crate::structs::diagnostic::Severity;
use crate::structs::element::{BlockElement, Element, SEGMENT_CHILDREN, ids};
use crate::structs::timecode::{DEFAULT_TIMECODE_SCALE, Timecode};
use crate::structs::track::{HeaderRemoval, Track};
use crate::utils::cursor::Cursor;
use crate::utils::errors::{ContainerError, CursorError};

/// ContentCompAlgo value of header stripping.
const HEADER_STRIPPING: u64 = 3;

const LACING_MASK: u8 = 0x06;
const KEYFRAME_FLAG: u8 = 0x80;

#[derive(Debug, Clone)]
pub struct DemuxConfig {
    pub language: Language,
    /// Maximum number of offsets a frame-level resync tries.
    pub scan_window: Option<usize>,
    /// Issues at or above this level abort the run instead of being logged.
    ///
    /// - `log::Level::Error`: only errors abort (default)
    /// - `log::Level::Warn`: warnings abort too (strict mode)
    pub fail_level: Level,
    /// Header removal applied before emission, by track id.
    pub header_removal: HashMap<usize, HeaderRemoval>,
    /// Tracks whose frames are emitted as stored, without the bytes the
    /// container stripped from them.
    pub stored_frames: HashSet<usize>,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self {
            language: Language::default(),
            scan_window: None,
            fail_level: Level::Error,
            header_removal: HashMap::new(),
            stored_frames: HashSet::new(),
        }
    }
}

impl DemuxConfig {
    pub fn is_strict(&self) -> bool {
        self.fail_level >= Level::Warn
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ContainerInfo {
    pub doc_type: String,
    pub timecode_scale: u64,
    pub size: u64,
    pub tracks: Vec<Track>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContainerStats {
    pub clusters: u64,
    pub blocks: u64,
    pub skipped_blocks: u64,
    pub cluster_resyncs: u64,
}

/// Overall outcome of a run, as reported through the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitStatus {
    Clean,
    /// Recoverable issues occurred, every track was read to the end.
    Warning,
    Fatal,
}

impl ExitStatus {
    pub fn from_severity(worst: Option<Severity>, strict: bool) -> Self {
        match worst {
            None | Some(Severity::Info) => Self::Clean,
            Some(Severity::Warning) if strict => Self::Fatal,
            Some(Severity::Warning) => Self::Warning,
            Some(Severity::Fatal) => Self::Fatal,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Clean => 0,
            Self::Warning => 1,
            Self::Fatal => 2,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackReport {
    pub track: Track,
    pub state: DemuxState,
    pub stats: TrackStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct DemuxReport {
    pub status: ExitStatus,
    pub info: ContainerInfo,
    pub stats: ContainerStats,
    pub tracks: Vec<TrackReport>,
    pub diagnostics: Diagnostics,
}

impl DemuxReport {
    pub fn track(&self, id: usize) -> Option<&TrackReport> {
        self.tracks.iter().find(|report| report.track.id == id)
    }
}

fn read_child(cursor: &mut Cursor, parent_end: u64) -> Result<Element, ContainerError> {
    let offset = cursor.position();
    let element = Element::read(cursor).map_err(|_| ContainerError::InvalidElement(offset))?;

    match element.size {
        Some(size) if element.payload_offset.saturating_add(size) > parent_end => {
            Err(ContainerError::ElementOverrun {
                id: element.id,
                offset,
                size,
                parent_end,
            })
        }
        _ => Ok(element),
    }
}

fn read_uint(payload: &Cursor) -> Result<u64, ContainerError> {
    if payload.remaining() > 8 {
        return Err(ContainerError::InvalidElement(payload.start()));
    }

    payload
        .clone()
        .read_be_uint(payload.remaining())
        .map_err(|_| ContainerError::InvalidElement(payload.start()))
}

fn read_string(payload: &Cursor) -> String {
    String::from_utf8_lossy(payload.window(payload.remaining()))
        .trim_end_matches('\0')
        .to_string()
}

fn read_block_header(cursor: &mut Cursor) -> Result<(u64, i16, u8), CursorError> {
    let (track_number, _) = cursor.read_vint()?;
    let relative_timecode = cursor.read_be_i16()?;
    let flags = cursor.read_u8()?;

    Ok((track_number, relative_timecode, flags))
}

/// Child elements of a master element, each with a view of its payload.
struct Children<'a> {
    cursor: Cursor<'a>,
    failed: bool,
}

impl<'a> Children<'a> {
    fn new(payload: Cursor<'a>) -> Self {
        Self {
            cursor: payload,
            failed: false,
        }
    }
}

impl<'a> Iterator for Children<'a> {
    type Item = Result<(Element, Cursor<'a>), ContainerError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor.is_empty() {
            return None;
        }

        let end = self.cursor.end();
        let result = read_child(&mut self.cursor, end).and_then(|element| {
            let payload_end = element.end_or(end);
            let payload = self.cursor.sub(element.payload_offset, payload_end);
            self.cursor
                .seek_to(payload_end)
                .map_err(|_| ContainerError::InvalidElement(element.offset))?;
            Ok((element, payload))
        });

        self.failed = result.is_err();
        Some(result)
    }
}

/// Demultiplexer over one in-memory container.
pub struct Demuxer<'a> {
    stream: Cursor<'a>,
    config: DemuxConfig,
    info: ContainerInfo,
    segment_start: u64,
    segment_end: u64,
    clusters_start: u64,
    resync: Resynchronizer,
    diagnostics: Diagnostics,
    stats: ContainerStats,
}

impl<'a> Demuxer<'a> {
    /// Reads container metadata up to the first cluster.
    pub fn open(data: &'a [u8], config: DemuxConfig) -> Result<Self> {
        let stream = Cursor::new(data);
        let mut cursor = stream.clone();

        let header = Element::read(&mut cursor).map_err(|_| ContainerError::NotEbml)?;
        let header_end = header.end_or(stream.end());
        ensure!(
            header.id == ids::EBML && header_end <= stream.end(),
            ContainerError::NotEbml
        );
        let doc_type = Self::read_doc_type(stream.sub(header.payload_offset, header_end))?;

        cursor.seek_to(header_end)?;
        let segment = loop {
            let element = Element::read(&mut cursor).map_err(|_| ContainerError::MissingSegment)?;
            if element.id == ids::SEGMENT {
                break element;
            }
            cursor.seek_to(element.end_or(stream.end()).min(stream.end()))?;
        };
        let segment_end = segment.end_or(stream.end()).min(stream.end());
        if segment.end_or(stream.end()) > stream.end() {
            warn!(
                "Segment declares {} bytes past the end of the stream",
                segment.end_or(stream.end()) - stream.end()
            );
        }

        let mut timecode_scale = DEFAULT_TIMECODE_SCALE;
        let mut tracks = None;
        let mut cursor = stream.sub(segment.payload_offset, segment_end);

        let clusters_start = loop {
            if cursor.is_empty() {
                break cursor.position();
            }

            let element = read_child(&mut cursor, segment_end)?;
            let end = element.end_or(segment_end);
            let payload = stream.sub(element.payload_offset, end);

            match element.id {
                ids::CLUSTER => break element.offset,
                ids::INFO => timecode_scale = Self::read_info(payload)?,
                ids::TRACKS => tracks = Some(Self::read_tracks(payload, &config)?),
                _ => debug!("Skipping {} element at offset {}", element.name(), element.offset),
            }
            cursor.seek_to(end)?;
        };
        let tracks = tracks.ok_or(ContainerError::MissingTracks)?;

        info!(
            "Opened {doc_type} container: {} tracks, timecode scale {timecode_scale} ns",
            tracks.len()
        );

        Ok(Self {
            stream,
            resync: Resynchronizer::default(),
            diagnostics: Diagnostics::new(config.language),
            config,
            info: ContainerInfo {
                doc_type,
                timecode_scale,
                size: data.len() as u64,
                tracks,
            },
            segment_start: segment.payload_offset,
            segment_end,
            clusters_start,
            stats: ContainerStats::default(),
        })
    }

    pub fn info(&self) -> &ContainerInfo {
        &self.info
    }

    pub fn tracks(&self) -> &[Track] {
        &self.info.tracks
    }

    fn read_doc_type(payload: Cursor) -> Result<String> {
        let mut doc_type = String::from("matroska");
        for child in Children::new(payload) {
            let (element, payload) = child?;
            if element.id == ids::DOC_TYPE {
                doc_type = read_string(&payload);
            }
        }

        match doc_type.as_str() {
            "matroska" | "webm" => Ok(doc_type),
            _ => bail!(ContainerError::UnsupportedDocType(doc_type)),
        }
    }

    fn read_info(payload: Cursor) -> Result<u64> {
        let mut timecode_scale = DEFAULT_TIMECODE_SCALE;
        for child in Children::new(payload) {
            let (element, payload) = child?;
            if element.id == ids::TIMECODE_SCALE {
                timecode_scale = read_uint(&payload)?;
            }
        }

        ensure!(timecode_scale > 0, "TimecodeScale must not be zero");
        Ok(timecode_scale)
    }

    fn read_tracks(payload: Cursor, config: &DemuxConfig) -> Result<Vec<Track>> {
        let mut tracks: Vec<Track> = Vec::new();
        let mut numbers = HashSet::new();

        for child in Children::new(payload) {
            let (element, payload) = child?;
            if element.id != ids::TRACK_ENTRY {
                continue;
            }

            let mut track = Self::read_track_entry(tracks.len(), element.offset, payload)?;
            ensure!(
                numbers.insert(track.number),
                ContainerError::DuplicateTrack(track.number)
            );
            if let Some(policy) = config.header_removal.get(&track.id) {
                track.header_removal = policy.clone();
            } else if config.stored_frames.contains(&track.id) {
                track.header_removal = match track.stripped_header.as_slice() {
                    [] => HeaderRemoval::None,
                    bytes => HeaderRemoval::StripPattern(bytes.to_vec()),
                };
            }

            debug!(
                "Track {}: number {}, {} ({}), {} stripped header bytes, header removal: {}",
                track.id,
                track.number,
                track.codec.name(),
                track.codec_id,
                track.stripped_header.len(),
                track.header_removal
            );
            tracks.push(track);
        }

        Ok(tracks)
    }

    fn read_track_entry(id: usize, offset: u64, payload: Cursor) -> Result<Track> {
        let mut number = None;
        let mut track_type = 0;
        let mut codec_id = String::new();
        let mut default_duration = None;
        let mut stripped_header = Vec::new();

        for child in Children::new(payload) {
            let (element, payload) = child?;
            match element.id {
                ids::TRACK_NUMBER => number = Some(read_uint(&payload)?),
                ids::TRACK_TYPE => track_type = read_uint(&payload)? as u8,
                ids::CODEC_ID => codec_id = read_string(&payload),
                ids::DEFAULT_DURATION => {
                    default_duration = i64::try_from(read_uint(&payload)?)
                        .ok()
                        .map(Timecode::from_nanos)
                }
                ids::CONTENT_ENCODINGS => {
                    stripped_header = Self::read_content_encodings(id, payload)?
                }
                _ => {}
            }
        }

        let number = number.ok_or(ContainerError::MissingTrackNumber(offset))?;
        Ok(Track {
            id,
            number,
            track_type,
            codec: CodecKind::from_codec_id(&codec_id),
            codec_id,
            header_removal: HeaderRemoval::None,
            stripped_header,
            default_duration,
        })
    }

    /// Bytes removed from every frame by header stripping, empty without it.
    fn read_content_encodings(id: usize, payload: Cursor) -> Result<Vec<u8>> {
        let mut stripped_header = Vec::new();

        for encoding in Children::new(payload) {
            let (element, payload) = encoding?;
            if element.id != ids::CONTENT_ENCODING {
                continue;
            }

            for compression in Children::new(payload) {
                let (element, payload) = compression?;
                if element.id != ids::CONTENT_COMPRESSION {
                    continue;
                }

                // zlib is the default algorithm
                let mut algorithm = 0;
                let mut settings = Vec::new();
                for child in Children::new(payload) {
                    let (element, payload) = child?;
                    match element.id {
                        ids::CONTENT_COMP_ALGO => algorithm = read_uint(&payload)?,
                        ids::CONTENT_COMP_SETTINGS => {
                            settings = payload.window(payload.remaining()).to_vec()
                        }
                        _ => {}
                    }
                }

                if algorithm == HEADER_STRIPPING {
                    stripped_header.extend(settings);
                } else {
                    warn!(
                        "Track {id}: unsupported content compression algorithm {algorithm}, frames are passed through unchanged"
                    );
                }
            }
        }

        Ok(stripped_header)
    }

    /// Demultiplexes every track that has a sink.
    pub fn run<S: FrameSink>(self, sinks: &mut BTreeMap<usize, S>) -> Result<DemuxReport> {
        self.run_with_progress(sinks, |_| {})
    }

    /// Like [`Demuxer::run`], calling `progress` with the offset of each cluster.
    pub fn run_with_progress<S, F>(
        mut self,
        sinks: &mut BTreeMap<usize, S>,
        mut progress: F,
    ) -> Result<DemuxReport>
    where
        S: FrameSink,
        F: FnMut(u64),
    {
        let track_count = self.info.tracks.len();
        let mut demuxers = BTreeMap::new();
        for &id in sinks.keys() {
            ensure!(
                id < track_count,
                "Track {id} does not exist, the container has {track_count} tracks"
            );
            demuxers.insert(
                id,
                TrackDemuxer::new(self.info.tracks[id].clone(), self.config.scan_window),
            );
        }

        let segment = self.stream.sub(self.segment_start, self.segment_end);
        let mut position = self.clusters_start;
        self.resync.rebase(position);

        while position < self.segment_end {
            let mut cursor = segment.sub(position, self.segment_end);
            let element = match read_child(&mut cursor, self.segment_end) {
                Ok(element) => element,
                Err(err) => {
                    position = self.recover_cluster(&segment, position, err)?;
                    continue;
                }
            };

            position = match element.id {
                ids::CLUSTER => {
                    progress(element.offset);
                    self.read_cluster(&segment, element, &mut demuxers, sinks)?
                }
                _ => element.end_or(self.segment_end),
            };
        }

        for (&id, sink) in sinks.iter_mut() {
            sink.finish()
                .map_err(|source| ContainerError::Sink { track: id, source })?;
        }

        Ok(self.report(demuxers))
    }

    fn read_cluster<S: FrameSink>(
        &mut self,
        segment: &Cursor<'a>,
        cluster: Element,
        demuxers: &mut BTreeMap<usize, TrackDemuxer>,
        sinks: &mut BTreeMap<usize, S>,
    ) -> Result<u64> {
        self.stats.clusters += 1;

        let end = cluster.end_or(self.segment_end);
        let mut cursor = segment.sub(cluster.payload_offset, end);
        let mut cluster_timecode = 0;

        while !cursor.is_empty() {
            let offset = cursor.position();
            let child = match read_child(&mut cursor, end) {
                Ok(child) => child,
                Err(err) => return self.recover_cluster(segment, offset, err),
            };

            // a cluster of unknown size ends where the next level-1 element starts
            if cluster.size.is_none() && SEGMENT_CHILDREN.contains(&child.id) {
                return Ok(child.offset);
            }

            let child_end = child.end_or(end);
            let payload = segment.sub(child.payload_offset, child_end);

            match child.id {
                ids::TIMECODE => match read_uint(&payload).and_then(|ticks| {
                    i64::try_from(ticks).map_err(|_| ContainerError::TimecodeOverflow(offset))
                }) {
                    Ok(ticks) => {
                        cluster_timecode = ticks;
                        let timecode =
                            Timecode::from_scaled(cluster_timecode, self.info.timecode_scale);
                        self.resync.checkpoint(child_end, timecode);
                    }
                    Err(err) => return self.recover_cluster(segment, offset, err),
                },
                ids::SIMPLE_BLOCK => {
                    self.dispatch_block(&child, payload, None, cluster_timecode, demuxers, sinks)?
                }
                ids::BLOCK_GROUP => {
                    self.read_block_group(&child, payload, cluster_timecode, demuxers, sinks)?
                }
                _ => {}
            }

            cursor.seek_to(child_end)?;
        }

        Ok(end)
    }

    fn read_block_group<S: FrameSink>(
        &mut self,
        group: &Element,
        payload: Cursor<'a>,
        cluster_timecode: i64,
        demuxers: &mut BTreeMap<usize, TrackDemuxer>,
        sinks: &mut BTreeMap<usize, S>,
    ) -> Result<()> {
        let mut block = None;
        let mut duration = None;

        for child in Children::new(payload) {
            let (element, payload) = match child {
                Ok(child) => child,
                Err(err) => return self.skip_block(group.offset, err),
            };
            match element.id {
                ids::BLOCK => block = Some((element, payload)),
                ids::BLOCK_DURATION => duration = read_uint(&payload).ok(),
                _ => {}
            }
        }

        match block {
            Some((element, payload)) => {
                self.dispatch_block(&element, payload, duration, cluster_timecode, demuxers, sinks)
            }
            None => self.skip_block(group.offset, ContainerError::MalformedBlock(group.offset)),
        }
    }

    fn dispatch_block<S: FrameSink>(
        &mut self,
        element: &Element,
        payload: Cursor<'a>,
        duration: Option<u64>,
        cluster_timecode: i64,
        demuxers: &mut BTreeMap<usize, TrackDemuxer>,
        sinks: &mut BTreeMap<usize, S>,
    ) -> Result<()> {
        let offset = element.offset;
        let mut cursor = payload;
        let Ok((track_number, relative_timecode, flags)) = read_block_header(&mut cursor) else {
            return self.skip_block(offset, ContainerError::MalformedBlock(offset));
        };

        let scale = self.info.timecode_scale;
        let Some(ticks) = cluster_timecode.checked_add(relative_timecode as i64) else {
            return self.skip_block(offset, ContainerError::TimecodeOverflow(offset));
        };
        let timecode = Timecode::from_scaled(ticks, scale);
        self.resync.checkpoint(cursor.end(), timecode);
        self.stats.blocks += 1;

        let Some(id) = self
            .info
            .tracks
            .iter()
            .find(|track| track.number == track_number)
            .map(|track| track.id)
        else {
            return self.skip_block(
                offset,
                ContainerError::UnknownTrack {
                    track: track_number,
                    offset,
                },
            );
        };
        if flags & LACING_MASK != 0 {
            return self.skip_block(
                offset,
                ContainerError::UnsupportedLacing {
                    track: track_number,
                    offset,
                },
            );
        }

        let (Some(demuxer), Some(sink)) = (demuxers.get_mut(&id), sinks.get_mut(&id)) else {
            return Ok(());
        };

        let block = BlockElement {
            track_number,
            timecode,
            duration: duration
                .and_then(|ticks| i64::try_from(ticks).ok())
                .map(|ticks| Timecode::from_scaled(ticks, scale)),
            keyframe: element.id != ids::SIMPLE_BLOCK || flags & KEYFRAME_FLAG != 0,
            offset,
            data_offset: cursor.position(),
            data_end: cursor.end(),
        };

        demuxer.demux_block(cursor, &block, &mut self.diagnostics, sink)?;
        Ok(())
    }

    fn skip_block(&mut self, offset: u64, err: ContainerError) -> Result<()> {
        if Level::Warn <= self.config.fail_level {
            return Err(err.into());
        }

        self.stats.skipped_blocks += 1;
        self.diagnostics.block_skipped(offset, &err);
        Ok(())
    }

    /// Resyncs after a broken element at `offset`; returns where to continue.
    fn recover_cluster(
        &mut self,
        segment: &Cursor<'a>,
        offset: u64,
        err: ContainerError,
    ) -> Result<u64> {
        log_or_err!(self.config, Level::Warn, err);
        self.stats.cluster_resyncs += 1;

        match self.resync.resync_cluster(
            segment,
            offset,
            self.info.timecode_scale,
            &mut self.diagnostics,
        ) {
            Ok((cluster, _)) => Ok(cluster),
            Err(_) => Ok(self.segment_end),
        }
    }

    fn report(self, demuxers: BTreeMap<usize, TrackDemuxer>) -> DemuxReport {
        let tracks: Vec<TrackReport> = demuxers
            .into_values()
            .map(|demuxer| TrackReport {
                track: demuxer.track().clone(),
                state: demuxer.state(),
                stats: *demuxer.stats(),
            })
            .collect();

        let mut status = ExitStatus::from_severity(
            self.diagnostics.worst_severity(),
            self.config.is_strict(),
        );
        if tracks.iter().any(|report| report.state == DemuxState::Failed) {
            status = ExitStatus::Fatal;
        }

        DemuxReport {
            status,
            info: self.info,
            stats: self.stats,
            tracks,
            diagnostics: self.diagnostics,
        }
    }
}
