use std::collections::BTreeMap;
use std::io;

use anyhow::Result;
use indicatif::MultiProgress;
use mkvx::process::container::{ContainerInfo, DemuxReport, Demuxer, ExitStatus};
use mkvx::process::demux::FrameSink;
use mkvx::structs::frame::Frame;
use mkvx::structs::timecode::Timecode;

use super::command::{Cli, InfoArgs};
use super::{create_progress_bar, demux_config, log_summary, write_report};
use crate::input::InputReader;
use crate::timestamp::time_str;

/// Frame sink keeping only the timing of a track.
#[derive(Debug, Default)]
struct TrackSummary {
    first: Option<Timecode>,
    last: Option<Timecode>,
}

impl TrackSummary {
    fn span(&self) -> Option<Timecode> {
        Some(self.last? - self.first?)
    }
}

impl FrameSink for TrackSummary {
    fn push(&mut self, frame: Frame) -> io::Result<()> {
        self.first.get_or_insert(frame.timecode);
        self.last = Some(frame.timecode);
        Ok(())
    }
}

pub fn cmd_info(args: &InfoArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<ExitStatus> {
    log::info!("Analyzing container: {}", args.input.display());

    let data = InputReader::new(&args.input)?.read_all()?;
    let demuxer = Demuxer::open(&data, demux_config(cli))?;

    let mut sinks: BTreeMap<usize, TrackSummary> = (0..demuxer.tracks().len())
        .map(|tid| (tid, TrackSummary::default()))
        .collect();

    let pb = create_progress_bar(multi, data.len() as u64)?;
    let report = demuxer.run_with_progress(&mut sinks, |offset| {
        if let Some(pb) = &pb {
            pb.set_position(offset);
        }
    })?;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    display_container_info(&report.info);
    display_tracks(&report, &sinks);
    display_diagnostics(&report);
    log_summary(&report);

    if let Some(path) = &args.diagnostics {
        write_report(path, &args.input, &report)?;
    }

    Ok(report.status)
}

fn display_container_info(info: &ContainerInfo) {
    let size_mb = info.size as f64 / 1_000_000.0;

    println!();
    println!("Container Information");
    println!("=====================");
    println!();
    println!("  DocType                   {}", info.doc_type);
    println!("  Timecode scale            {} ns", info.timecode_scale);
    println!("  Size                      {size_mb:.2} MB ({} bytes)", info.size);
    println!("  Number of tracks          {}", info.tracks.len());
    println!();
}

fn display_tracks(report: &DemuxReport, summaries: &BTreeMap<usize, TrackSummary>) {
    println!("Track Information");

    for track_report in &report.tracks {
        let track = &track_report.track;
        let stats = &track_report.stats;

        println!("  Track {}", track.id);
        println!("    Track number            {}", track.number);
        println!("    Type                    {}", track.type_name());
        println!("    Codec                   {} ({})", track.codec.name(), track.codec_id);
        if !track.stripped_header.is_empty() {
            println!(
                "    Stripped header         {} bytes, restored",
                track.stripped_header.len()
            );
        }
        println!("    Header removal          {}", track.header_removal);
        if let Some(duration) = track.default_duration {
            println!("    Default duration        {} ns", duration.as_nanos());
        }

        println!("    Blocks                  {}", stats.blocks);
        println!("    Frames                  {}", stats.frames);
        println!(
            "    Bytes                   {} ({} after header removal)",
            stats.bytes_in, stats.bytes_out
        );
        if let Some(span) = summaries.get(&track.id).and_then(TrackSummary::span) {
            println!("    Timecode span           {}", time_str(span));
        }
        println!("    Resyncs                 {}", stats.resyncs);
        println!("    Recovered frames        {}", stats.recovered_frames);
        println!("    State                   {:?}", track_report.state);
    }
    println!();
}

fn display_diagnostics(report: &DemuxReport) {
    println!("Stream Health");
    println!("  Clusters                  {}", report.stats.clusters);
    println!("  Blocks                    {}", report.stats.blocks);
    println!("  Skipped blocks            {}", report.stats.skipped_blocks);
    println!("  Cluster resyncs           {}", report.stats.cluster_resyncs);
    println!(
        "  Status                    {:?} (exit code {})",
        report.status,
        report.status.code()
    );

    for event in report.diagnostics.events() {
        println!("  [{}] {}", event.kind, event);
    }
    println!();
}

#[cfg(test)]
mod tests {
    use clap::Parser as ClapParser;
    use mkvx::utils::fixture::{TrackFixture, ac3_frame, cluster, container, garbage, simple_block};

    use super::*;
    use crate::cli::command::Commands;

    #[test]
    fn summary_span() {
        let mut summary = TrackSummary::default();
        assert_eq!(summary.span(), None);

        for (i, nanos) in [1_000_000_000, 1_032_000_000, 1_064_000_000].into_iter().enumerate() {
            summary
                .push(Frame {
                    track: 0,
                    timecode: Timecode::from_nanos(nanos),
                    recovered: false,
                    offset: i as u64 * 256,
                    data: vec![0; 4].into(),
                })
                .unwrap();
        }
        assert_eq!(summary.span(), Some(Timecode::from_nanos(64_000_000)));
    }

    #[test]
    fn info_reports_failed_track() {
        let mut broken = ac3_frame(0, 8, 1);
        broken.extend(garbage(64, 2));
        let data = container(
            &[TrackFixture::new(1, "A_AC3")],
            &[cluster(0, &[simple_block(1, 0, &broken)])],
        );

        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.mka");
        std::fs::write(&input, data).unwrap();

        let input = input.to_string_lossy().into_owned();
        let cli = Cli::try_parse_from(["mkvxd", "info", input.as_str()]).unwrap();
        let Commands::Info(args) = &cli.command else {
            unreachable!()
        };

        let status = cmd_info(args, &cli, None).unwrap();
        assert_eq!(status, ExitStatus::Fatal);
        assert_eq!(status.code(), 2);
    }
}
