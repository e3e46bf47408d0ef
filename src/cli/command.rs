use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};
use mkvx::process::diagnostics::Language;

#[derive(Debug, ClapParser)]
#[command(
    name       = env!("CARGO_PKG_NAME"),
    version    = concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("VERGEN_GIT_DESCRIBE"), ", built ", env!("BUILD_TIMESTAMP"), ")"
    ),
    author     = env!("CARGO_PKG_AUTHORS"),
    about      = "Tools for extracting and checking tracks of Matroska-style containers",
    long_about = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat warnings as fatal errors (fail on first warning).
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress bars during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// Language of diagnostic messages (en-US or de-DE).
    #[arg(long, global = true, value_name = "LANG", default_value = "en-US")]
    pub ui_language: Language,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Extract tracks into raw codec streams.
    Extract(ExtractArgs),

    /// Print container information and per-track statistics
    Info(InfoArgs),
}

#[derive(Debug, Args)]
pub struct ExtractArgs {
    /// Input container (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Track outputs as TID:PATH, where TID is the 0-based track index.
    #[arg(value_name = "TID:PATH", required = true, value_parser = parse_track_output)]
    pub outputs: Vec<(usize, PathBuf)>,

    /// Strip a fixed number of leading bytes from each frame of a track.
    #[arg(long, value_name = "TID:N", value_parser = parse_strip_header)]
    pub strip_header: Vec<(usize, usize)>,

    /// Write frames of a track as stored, without the header bytes the container stripped.
    #[arg(long, value_name = "TID")]
    pub no_restore: Vec<usize>,

    /// Write all diagnostics and statistics as a YAML report.
    #[arg(long, value_name = "PATH")]
    pub diagnostics: Option<PathBuf>,

    /// Maximum number of bytes scanned by one frame resync.
    #[arg(long, value_name = "N")]
    pub scan_window: Option<usize>,
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Input container (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Write all diagnostics and statistics as a YAML report.
    #[arg(long, value_name = "PATH")]
    pub diagnostics: Option<PathBuf>,
}

fn split_track_arg(s: &str) -> Result<(usize, &str), String> {
    let (tid, rest) = s
        .split_once(':')
        .ok_or_else(|| format!("expected TID:VALUE, got {s:?}"))?;
    let tid = tid
        .parse()
        .map_err(|_| format!("invalid track id {tid:?}"))?;

    Ok((tid, rest))
}

fn parse_track_output(s: &str) -> Result<(usize, PathBuf), String> {
    let (tid, path) = split_track_arg(s)?;
    if path.is_empty() {
        return Err(format!("missing output path for track {tid}"));
    }

    Ok((tid, PathBuf::from(path)))
}

fn parse_strip_header(s: &str) -> Result<(usize, usize), String> {
    let (tid, count) = split_track_arg(s)?;
    let count = count
        .parse()
        .map_err(|_| format!("invalid byte count {count:?}"))?;

    Ok((tid, count))
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_extract_arguments() {
        let cli = Cli::try_parse_from([
            "mkvxd",
            "--strict",
            "--ui-language",
            "de_DE",
            "extract",
            "in.mka",
            "0:out.ac3",
            "2:dir/out.mp3",
            "--strip-header",
            "0:2",
            "--no-restore",
            "2",
            "--scan-window",
            "4096",
        ])
        .unwrap();

        assert!(cli.strict);
        assert_eq!(cli.ui_language, Language::DeDe);

        let Commands::Extract(args) = cli.command else {
            panic!("expected extract");
        };
        assert_eq!(
            args.outputs,
            [
                (0, PathBuf::from("out.ac3")),
                (2, PathBuf::from("dir/out.mp3"))
            ]
        );
        assert_eq!(args.strip_header, [(0, 2)]);
        assert_eq!(args.no_restore, [2]);
        assert_eq!(args.scan_window, Some(4096));
    }

    #[test]
    fn reject_malformed_track_arguments() {
        assert!(Cli::try_parse_from(["mkvxd", "extract", "in.mka"]).is_err());
        assert!(Cli::try_parse_from(["mkvxd", "extract", "in.mka", "out.ac3"]).is_err());
        assert!(Cli::try_parse_from(["mkvxd", "extract", "in.mka", "x:out.ac3"]).is_err());
        assert!(
            Cli::try_parse_from([
                "mkvxd",
                "extract",
                "in.mka",
                "0:out.ac3",
                "--strip-header",
                "0:two"
            ])
            .is_err()
        );
        assert!(Cli::try_parse_from(["mkvxd", "--ui-language", "fr", "info", "in.mka"]).is_err());
    }
}
