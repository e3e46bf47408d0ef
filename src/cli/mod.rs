use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::Level;
use serde::Serialize;

use command::Cli;
use mkvx::process::container::{DemuxConfig, DemuxReport};

pub mod command;
pub mod extract;
pub mod info;

pub fn demux_config(cli: &Cli) -> DemuxConfig {
    DemuxConfig {
        language: cli.ui_language,
        fail_level: if cli.strict { Level::Warn } else { Level::Error },
        ..Default::default()
    }
}

pub fn create_progress_bar(
    multi: Option<&MultiProgress>,
    total_bytes: u64,
) -> Result<Option<ProgressBar>> {
    let Some(multi) = multi else {
        return Ok(None);
    };

    let pb = multi.add(ProgressBar::new(total_bytes));
    pb.set_style(ProgressStyle::with_template(
        "{bar:40.cyan/blue} {bytes}/{total_bytes} ({percent}%)\n{msg} | elapsed: {elapsed_precise} | ETA: {eta_precise}",
    )?);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb.set_message("reading clusters");

    Ok(Some(pb))
}

#[derive(Serialize)]
struct ReportFile<'a> {
    input: String,
    generator: &'static str,
    #[serde(flatten)]
    report: &'a DemuxReport,
}

/// Writes `report` as YAML to `path`.
pub fn write_report(path: &Path, input: &Path, report: &DemuxReport) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create diagnostics report {}", path.display()))?;
    let report = ReportFile {
        input: input.display().to_string(),
        generator: concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION")),
        report,
    };
    serde_yaml_ng::to_writer(BufWriter::new(file), &report)?;

    log::info!("Diagnostics report written to {}", path.display());
    Ok(())
}

/// Logs a one-line summary of every diagnostic kind that occurred.
pub fn log_summary(report: &DemuxReport) {
    let events = report.diagnostics.events();
    if events.is_empty() {
        log::info!("No stream errors detected");
        return;
    }

    log::info!(
        "{} diagnostic events, {} resync events, {} cluster resyncs, {} blocks skipped",
        events.len(),
        report.diagnostics.matching("resync.*").count(),
        report.stats.cluster_resyncs,
        report.stats.skipped_blocks
    );
}
