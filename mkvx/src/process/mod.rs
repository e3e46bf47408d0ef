/// Ordered diagnostics log and its localized message text.
///
/// Provides [`Diagnostics`](diagnostics::Diagnostics), the append-only record of
/// every resync and failure, queryable by [`MessageKind`](crate::structs::diagnostic::MessageKind)
/// name or pattern.
pub mod diagnostics;

/// Frame-level and cluster-level resynchronization.
pub mod resync;

/// Per-track frame extraction.
///
/// Provides the [`TrackDemuxer`](demux::TrackDemuxer) state machine that splits a
/// block's codec data into [`Frame`](crate::structs::frame::Frame) objects, plus
/// the [`FrameSink`](demux::FrameSink) trait frames are delivered through.
pub mod demux;

/// Container traversal.
///
/// Provides the [`Demuxer`](container::Demuxer) that reads container metadata,
/// walks clusters and routes blocks to their track's demuxer.
pub mod container;
