//! CLI argument parsing for lotus.
//!
//! Provides the command-line interface for the `lotus` binary with the
//! collect and index subcommands.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use thiserror::Error;

use crate::config::{
    limit_from_signed, CollectConfig, DEFAULT_ARCHIVE_DIR, DEFAULT_COMMAND,
    DEFAULT_LINES_PER_FILE, DEFAULT_LOG_DIR, DEFAULT_MAX_FILES,
};

/// Default interval between status lines in seconds.
pub const DEFAULT_STATUS_INTERVAL_SEC: u64 = 60;

/// Errors from CLI argument validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CliError {
    #[error("exclusion words must not be empty")]
    EmptyExclusion,

    #[error("stream command must not start with an empty program name")]
    EmptyCommand,

    #[error("status-interval-sec must be at least 1, got {0}")]
    InvalidStatusInterval(u64),

    #[error("duration-sec must be at least 1, got {0}")]
    InvalidDurationSec(u64),

    #[error("log-dir and archive-dir must differ")]
    SameDirectories,
}

/// lotus - rotating, archiving capture of a line-oriented log stream.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "lotus")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v, -vv). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Capture a log stream into rotating files until interrupted.
    Collect(CollectArgs),
    /// Print the log and archive indexes.
    Index(IndexArgs),
}

/// Arguments for the collect command.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
pub struct CollectArgs {
    /// Directory for rotated log files.
    #[arg(long, default_value = DEFAULT_LOG_DIR)]
    pub log_dir: PathBuf,

    /// Directory for zip archives.
    #[arg(long, default_value = DEFAULT_ARCHIVE_DIR)]
    pub archive_dir: PathBuf,

    /// Lines per log file. Negative means unlimited.
    #[arg(long, default_value_t = DEFAULT_LINES_PER_FILE as i64, allow_negative_numbers = true)]
    pub lines_per_file: i64,

    /// Log files kept before they are archived. Negative means never archive.
    #[arg(long, default_value_t = DEFAULT_MAX_FILES as i64, allow_negative_numbers = true)]
    pub max_files: i64,

    /// Drop lines containing this substring. Repeatable.
    #[arg(short = 'x', long = "exclude")]
    pub exclusions: Vec<String>,

    /// Append a JSON status line to this file periodically.
    #[arg(long)]
    pub status_file: Option<PathBuf>,

    /// Seconds between status lines.
    #[arg(long, default_value_t = DEFAULT_STATUS_INTERVAL_SEC)]
    pub status_interval_sec: u64,

    /// Stop after this many seconds. Runs until SIGINT or end of stream if unset.
    #[arg(long)]
    pub duration_sec: Option<u64>,

    /// Stream command and arguments, after `--`. Defaults to `logcat -b default *:D`.
    #[arg(last = true)]
    pub command: Vec<String>,
}

impl CollectArgs {
    /// Validate the arguments.
    pub fn validate(&self) -> Result<(), CliError> {
        if self.exclusions.iter().any(String::is_empty) {
            return Err(CliError::EmptyExclusion);
        }
        if self.command.first().is_some_and(String::is_empty) {
            return Err(CliError::EmptyCommand);
        }
        if self.status_interval_sec == 0 {
            return Err(CliError::InvalidStatusInterval(self.status_interval_sec));
        }
        if self.duration_sec == Some(0) {
            return Err(CliError::InvalidDurationSec(0));
        }
        if self.log_dir == self.archive_dir {
            return Err(CliError::SameDirectories);
        }
        Ok(())
    }

    /// Stream command, falling back to the default.
    pub fn command_line(&self) -> Vec<String> {
        if self.command.is_empty() {
            DEFAULT_COMMAND.iter().map(|s| s.to_string()).collect()
        } else {
            self.command.clone()
        }
    }

    /// Build the capture configuration. Call [`validate`](Self::validate) first.
    pub fn to_config(&self) -> CollectConfig {
        CollectConfig {
            command: self.command_line(),
            log_dir: self.log_dir.clone(),
            archive_dir: self.archive_dir.clone(),
            lines_per_file: limit_from_signed(self.lines_per_file),
            max_files: limit_from_signed(self.max_files),
            exclusions: self.exclusions.clone(),
        }
    }
}

/// Arguments for the index command.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
pub struct IndexArgs {
    /// Directory for rotated log files.
    #[arg(long, default_value = DEFAULT_LOG_DIR)]
    pub log_dir: PathBuf,

    /// Directory for zip archives.
    #[arg(long, default_value = DEFAULT_ARCHIVE_DIR)]
    pub archive_dir: PathBuf,
}

/// Parse CLI arguments from an iterator of strings.
/// Useful for testing.
pub fn parse_from<I, T>(iter: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(iter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_args(argv: &[&str]) -> CollectArgs {
        let mut full = vec!["lotus", "collect"];
        full.extend_from_slice(argv);
        match parse_from(full).expect("parse").command {
            Command::Collect(args) => args,
            _ => panic!("expected Collect"),
        }
    }

    // --- defaults ---

    #[test]
    fn test_collect_defaults() {
        let args = collect_args(&[]);
        assert_eq!(args.log_dir, PathBuf::from(DEFAULT_LOG_DIR));
        assert_eq!(args.archive_dir, PathBuf::from(DEFAULT_ARCHIVE_DIR));
        assert_eq!(args.lines_per_file, 50_000);
        assert_eq!(args.max_files, 5);
        assert!(args.exclusions.is_empty());
        assert!(args.status_file.is_none());
        assert_eq!(args.status_interval_sec, DEFAULT_STATUS_INTERVAL_SEC);
        assert!(args.duration_sec.is_none());
        assert!(args.command.is_empty());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_default_command_line() {
        let args = collect_args(&[]);
        assert_eq!(args.command_line(), vec!["logcat", "-b", "default", "*:D"]);
    }

    // --- limits ---

    #[test]
    fn test_negative_limits_mean_unlimited() {
        let args = collect_args(&["--lines-per-file", "-1", "--max-files", "-1"]);
        assert!(args.validate().is_ok());

        let config = args.to_config();
        assert_eq!(config.lines_per_file, None);
        assert_eq!(config.max_files, None);
    }

    #[test]
    fn test_custom_limits() {
        let config = collect_args(&["--lines-per-file", "25000", "--max-files", "3"]).to_config();
        assert_eq!(config.lines_per_file, Some(25_000));
        assert_eq!(config.max_files, Some(3));
    }

    #[test]
    fn test_zero_limits_are_literal() {
        let args = collect_args(&["--lines-per-file", "0", "--max-files", "0"]);
        assert!(args.validate().is_ok());

        let settings = args.to_config().writer_settings();
        assert_eq!(settings.lines_per_file, Some(0));
        assert_eq!(settings.retention, Some(0));
    }

    #[test]
    fn test_non_numeric_limit_fails_parsing() {
        assert!(parse_from(["lotus", "collect", "--max-files", "many"]).is_err());
    }

    // --- exclusions ---

    #[test]
    fn test_repeated_exclusions() {
        let args = collect_args(&["-x", "LocSvc_SystemStatus:", "--exclude", "DEBUG"]);
        assert_eq!(args.exclusions, vec!["LocSvc_SystemStatus:", "DEBUG"]);
        assert_eq!(args.to_config().exclusions, args.exclusions);
    }

    #[test]
    fn test_empty_exclusion_rejected() {
        let args = collect_args(&["--exclude", ""]);
        assert_eq!(args.validate(), Err(CliError::EmptyExclusion));
    }

    // --- stream command ---

    #[test]
    fn test_trailing_command() {
        let args = collect_args(&["--", "adb", "logcat", "-v", "time"]);
        assert_eq!(args.command_line(), vec!["adb", "logcat", "-v", "time"]);
    }

    #[test]
    fn test_empty_program_rejected() {
        let args = collect_args(&["--", ""]);
        assert_eq!(args.validate(), Err(CliError::EmptyCommand));
    }

    // --- other validation ---

    #[test]
    fn test_status_interval_zero_rejected() {
        let args = collect_args(&["--status-interval-sec", "0"]);
        assert_eq!(args.validate(), Err(CliError::InvalidStatusInterval(0)));
    }

    #[test]
    fn test_duration_zero_rejected() {
        let args = collect_args(&["--duration-sec", "0"]);
        assert_eq!(args.validate(), Err(CliError::InvalidDurationSec(0)));
    }

    #[test]
    fn test_same_directories_rejected() {
        let args = collect_args(&["--log-dir", "/tmp/x", "--archive-dir", "/tmp/x"]);
        assert_eq!(args.validate(), Err(CliError::SameDirectories));
    }

    // --- global flags and index ---

    #[test]
    fn test_verbose_count() {
        let cli = parse_from(["lotus", "-vv", "index"]).expect("parse");
        assert_eq!(cli.verbose, 2);

        let cli = parse_from(["lotus", "collect", "-v"]).expect("parse");
        assert_eq!(cli.verbose, 1);
    }

    #[test]
    fn test_index_dirs() {
        let cli = parse_from(["lotus", "index", "--log-dir", "/a", "--archive-dir", "/b"])
            .expect("parse");
        match cli.command {
            Command::Index(args) => {
                assert_eq!(args.log_dir, PathBuf::from("/a"));
                assert_eq!(args.archive_dir, PathBuf::from("/b"));
            }
            _ => panic!("expected Index"),
        }
    }

    #[test]
    fn test_missing_subcommand_fails() {
        assert!(parse_from(["lotus"]).is_err());
    }
}
