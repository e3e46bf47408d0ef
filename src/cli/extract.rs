use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::BufWriter;

use anyhow::{Context, Result, ensure};
use indicatif::MultiProgress;
use mkvx::process::container::{Demuxer, ExitStatus};
use mkvx::process::demux::WriteSink;
use mkvx::structs::track::HeaderRemoval;

use super::command::{Cli, ExtractArgs};
use super::{create_progress_bar, demux_config, log_summary, write_report};
use crate::input::InputReader;

fn header_overrides(args: &ExtractArgs) -> Result<HashMap<usize, HeaderRemoval>> {
    let mut overrides = HashMap::new();

    for &(tid, count) in &args.strip_header {
        let policy = match count {
            0 => HeaderRemoval::None,
            n => HeaderRemoval::StripBytes(n),
        };
        ensure!(
            overrides.insert(tid, policy).is_none(),
            "Track {tid}: --strip-header given more than once"
        );
    }

    Ok(overrides)
}

fn stored_frames(args: &ExtractArgs) -> Result<HashSet<usize>> {
    let mut tracks = HashSet::new();

    for &tid in &args.no_restore {
        ensure!(
            !args.strip_header.iter().any(|&(strip_tid, _)| strip_tid == tid),
            "Track {tid}: --no-restore conflicts with --strip-header"
        );
        tracks.insert(tid);
    }

    Ok(tracks)
}

pub fn cmd_extract(
    args: &ExtractArgs,
    cli: &Cli,
    multi: Option<&MultiProgress>,
) -> Result<ExitStatus> {
    log::info!("Extracting tracks from {}", args.input.display());

    let overrides = header_overrides(args)?;
    let stored = stored_frames(args)?;
    let data = InputReader::new(&args.input)?.read_all()?;

    let mut config = demux_config(cli);
    config.scan_window = args.scan_window;
    config.header_removal = overrides;
    config.stored_frames = stored;

    let track_ids: Vec<usize> = config
        .header_removal
        .keys()
        .chain(&config.stored_frames)
        .copied()
        .collect();
    let demuxer = Demuxer::open(&data, config)?;
    let track_count = demuxer.tracks().len();

    for tid in track_ids.iter().chain(args.outputs.iter().map(|(tid, _)| tid)) {
        ensure!(
            *tid < track_count,
            "Track {tid} does not exist, the container has {track_count} tracks"
        );
    }

    let mut sinks = BTreeMap::new();
    for (tid, path) in &args.outputs {
        ensure!(
            !sinks.contains_key(tid),
            "Track {tid} is given more than once"
        );

        let track = &demuxer.tracks()[*tid];
        log::info!(
            "Track {tid}: {} ({}), {} stripped header bytes restored, header removal: {} -> {}",
            track.codec.name(),
            track.codec_id,
            track.stripped_header.len(),
            track.header_removal,
            path.display()
        );

        let file = File::create(path)
            .with_context(|| format!("Failed to create output file {}", path.display()))?;
        sinks.insert(*tid, WriteSink::new(BufWriter::new(file)));
    }

    let pb = create_progress_bar(multi, data.len() as u64)?;
    let report = demuxer.run_with_progress(&mut sinks, |offset| {
        if let Some(pb) = &pb {
            pb.set_position(offset);
        }
    })?;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    for (tid, sink) in &sinks {
        log::info!(
            "Track {tid}: {} frames, {} bytes written",
            sink.frames(),
            sink.written()
        );
    }
    log_summary(&report);

    if let Some(path) = &args.diagnostics {
        write_report(path, &args.input, &report)?;
    }

    Ok(report.status)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use clap::Parser as ClapParser;
    use mkvx::structs::element::ids;
    use mkvx::utils::fixture::{TrackFixture, ac3_frame, cluster, container, simple_block};

    use super::*;
    use crate::cli::command::Commands;

    /// Six AC-3 frames, two per cluster; `stripped` header bytes are left out
    /// of the stored frames and declared in the track.
    fn ac3_container(stripped: &[u8]) -> (Vec<u8>, Vec<Vec<u8>>) {
        let frames: Vec<_> = (0..6).map(|seed| ac3_frame(0, 8, seed)).collect();
        let clusters: Vec<_> = frames
            .chunks(2)
            .enumerate()
            .map(|(i, pair)| {
                let stored: Vec<u8> = pair
                    .iter()
                    .flat_map(|frame| frame[stripped.len()..].to_vec())
                    .collect();
                cluster(i as u64 * 64, &[simple_block(1, 0, &stored)])
            })
            .collect();

        let mut track = TrackFixture::new(1, "A_AC3");
        if !stripped.is_empty() {
            track = track.with_stripped_header(stripped);
        }
        (container(&[track], &clusters), frames)
    }

    fn run(dir: &Path, data: &[u8], extra: &[&str]) -> Result<ExitStatus> {
        let input = dir.join("input.mka");
        fs::write(&input, data)?;

        let input = input.to_string_lossy().into_owned();
        let output = format!("0:{}", dir.join("track0.ac3").display());
        let mut argv = vec!["mkvxd", "extract", input.as_str(), output.as_str()];
        argv.extend_from_slice(extra);

        let cli = Cli::try_parse_from(argv)?;
        let Commands::Extract(args) = &cli.command else {
            unreachable!()
        };
        cmd_extract(args, &cli, None)
    }

    #[test]
    fn extract_stripped_track() {
        let dir = tempfile::tempdir().unwrap();
        let (data, frames) = ac3_container(&[0x0B, 0x77]);

        let status = run(dir.path(), &data, &[]).unwrap();
        assert_eq!(status, ExitStatus::Clean);

        let output = fs::read(dir.path().join("track0.ac3")).unwrap();
        assert_eq!(
            format!("{:x}", md5::compute(output)),
            format!("{:x}", md5::compute(frames.concat()))
        );
    }

    #[test]
    fn no_restore_and_strip_header() {
        let dir = tempfile::tempdir().unwrap();
        let (data, frames) = ac3_container(&[0x0B, 0x77]);

        run(dir.path(), &data, &["--no-restore", "0"]).unwrap();
        let output = fs::read(dir.path().join("track0.ac3")).unwrap();
        let stored: Vec<u8> = frames.iter().flat_map(|f| f[2..].to_vec()).collect();
        assert_eq!(output, stored);

        run(dir.path(), &data, &["--strip-header", "0:5"]).unwrap();
        let output = fs::read(dir.path().join("track0.ac3")).unwrap();
        let payloads: Vec<u8> = frames.iter().flat_map(|f| f[5..].to_vec()).collect();
        assert_eq!(output, payloads);

        let err = run(
            dir.path(),
            &data,
            &["--no-restore", "0", "--strip-header", "0:5"],
        )
        .unwrap_err();
        assert!(err.to_string().contains("conflicts"));
    }

    #[test]
    fn broken_cluster_report() {
        let dir = tempfile::tempdir().unwrap();
        let (mut data, _) = ac3_container(&[]);
        let id = ids::CLUSTER.to_be_bytes();
        let second = data
            .windows(4)
            .enumerate()
            .filter(|(_, window)| *window == id)
            .nth(1)
            .map(|(offset, _)| offset)
            .unwrap();
        data[second] = 0x00;

        let report = dir.path().join("report.yaml");
        let report_arg = report.to_string_lossy().into_owned();
        let status = run(dir.path(), &data, &["--diagnostics", report_arg.as_str()]).unwrap();
        assert_eq!(status, ExitStatus::Warning);
        assert_eq!(status.code(), 1);

        let yaml = fs::read_to_string(&report).unwrap();
        assert!(yaml.contains("status: warning"));
        assert!(yaml.contains("kind: resync.last_good_timecode"));
        assert!(yaml.contains("kind: resync.cluster_timecode"));

        // two of three clusters survive
        let output = fs::read(dir.path().join("track0.ac3")).unwrap();
        assert_eq!(output.len(), 4 * 256);
    }

    #[test]
    fn strict_mode_fails_on_broken_cluster() {
        let dir = tempfile::tempdir().unwrap();
        let (mut data, _) = ac3_container(&[]);
        let id = ids::CLUSTER.to_be_bytes();
        let last = data
            .windows(4)
            .rposition(|window| window == id)
            .unwrap();
        data[last] = 0x00;

        assert!(run(dir.path(), &data, &["--strict"]).is_err());
    }

    #[test]
    fn reject_unknown_track() {
        let dir = tempfile::tempdir().unwrap();
        let (data, _) = ac3_container(&[]);

        let err = run(dir.path(), &data, &["--strip-header", "4:2"]).unwrap_err();
        assert!(err.to_string().contains("Track 4 does not exist"));
    }
}
