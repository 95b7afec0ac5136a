//! Library-level capture configuration.

use std::path::PathBuf;

use crate::filter::LineFilter;
use crate::writer::WriterSettings;

/// Default directory for rotated log files.
pub const DEFAULT_LOG_DIR: &str = "/var/lib/lotus/log";

/// Default directory for archives.
pub const DEFAULT_ARCHIVE_DIR: &str = "/var/lib/lotus/zip";

/// Default lines per log file.
pub const DEFAULT_LINES_PER_FILE: u64 = 50_000;

/// Default number of log files kept before archiving.
pub const DEFAULT_MAX_FILES: u64 = 5;

/// Default stream command: the device log, default buffers, debug and above.
pub const DEFAULT_COMMAND: &[&str] = &["logcat", "-b", "default", "*:D"];

/// Everything a capture session needs, already validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectConfig {
    /// Stream command and its arguments.
    pub command: Vec<String>,

    pub log_dir: PathBuf,
    pub archive_dir: PathBuf,

    /// `None` means a single unbounded file.
    pub lines_per_file: Option<u64>,

    /// `None` means files are never archived.
    pub max_files: Option<u64>,

    /// Lines containing any of these substrings are dropped.
    pub exclusions: Vec<String>,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_COMMAND.iter().map(|s| s.to_string()).collect(),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            archive_dir: PathBuf::from(DEFAULT_ARCHIVE_DIR),
            lines_per_file: Some(DEFAULT_LINES_PER_FILE),
            max_files: Some(DEFAULT_MAX_FILES),
            exclusions: Vec::new(),
        }
    }
}

impl CollectConfig {
    pub fn writer_settings(&self) -> WriterSettings {
        WriterSettings {
            working_dir: self.log_dir.clone(),
            archive_dir: self.archive_dir.clone(),
            lines_per_file: self.lines_per_file,
            retention: self.max_files,
        }
    }

    pub fn filter(&self) -> LineFilter {
        LineFilter::new(self.exclusions.clone())
    }
}

/// Map a signed limit to an optional one: negative means unlimited.
pub fn limit_from_signed(value: i64) -> Option<u64> {
    u64::try_from(value).ok()
}
