#![doc = include_str!("../README.md")]
//!
//! ## Technical Overview
//!
//! ### Container Structure
//!
//! An EBML header is followed by one Segment holding Info, Tracks and a
//! sequence of Clusters. Each Cluster carries a Timecode and blocks, each
//! block belongs to one track and holds one or more codec frames.
//!
//! ### Recovery Levels
//!
//! - **Frame level**: inside a block, a frame that fails header validation
//!   triggers a scan for the next valid header of the same codec, bounded by
//!   the block end.
//! - **Cluster level**: a broken element boundary triggers a scan for the next
//!   Cluster with a readable Timecode.
//!
//! Every recovery attempt records exactly two diagnostics: the last good
//! timecode, then either the recovered timecode or the failure.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::collections::BTreeMap;
//!
//! use mkvx::process::container::{DemuxConfig, Demuxer};
//! use mkvx::structs::frame::Frame;
//!
//! let data = std::fs::read("input.mka")?;
//! let demuxer = Demuxer::open(&data, DemuxConfig::default())?;
//!
//! // Collect the frames of the first track
//! let mut sinks: BTreeMap<usize, Vec<Frame>> = BTreeMap::from([(0, Vec::new())]);
//! let report = demuxer.run(&mut sinks)?;
//!
//! for event in report.diagnostics.matching("resync.*") {
//!     eprintln!("{event}");
//! }
//! std::process::exit(report.status.code() as i32);
//! # Ok::<(), anyhow::Error>(())
//! ```

/// Codec frame header validation.
///
/// - **AC-3 / E-AC-3** ([`codec::ac3`]): Sync word, size codes and CRC
/// - **MPEG audio** ([`codec::mpa`]): Layer I/II/III frame headers
pub mod codec;

/// Demultiplexing pipeline.
///
/// 1. **Container** ([`process::container`]): Metadata and cluster traversal
/// 2. **Track demuxing** ([`process::demux`]): Splits blocks into frames
/// 3. **Resync** ([`process::resync`]): Recovery after corruption
/// 4. **Diagnostics** ([`process::diagnostics`]): Ordered event log
pub mod process;

/// Data structures representing container and stream components.
///
/// - **Elements** ([`structs::element`]): EBML element headers and IDs
/// - **Tracks** ([`structs::track`]): Track metadata and header removal
/// - **Frames** ([`structs::frame`]): Demultiplexed codec frames
/// - **Timecodes** ([`structs::timecode`]): Nanosecond timestamps
/// - **Sync State** ([`structs::sync`]): Resync checkpoints
/// - **Diagnostics** ([`structs::diagnostic`]): Event records
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **Cursor** ([`utils::cursor`]): Bounded byte reading with offsets
/// - **Bitstream I/O** ([`utils::bitstream_io`]): Bit-level reading
/// - **CRC Validation** ([`utils::crc`]): Error detection
/// - **Error Handling** ([`utils::errors`]): Error types
pub mod utils;
