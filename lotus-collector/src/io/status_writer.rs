//! Status writer for append-only status.jsonl output.
//!
//! The collect command appends one JSON object per status interval so an
//! external monitor can follow capture progress. Lines survive restarts.

use std::path::{Path, PathBuf};

use lotus_fs::{Filesystem, FsError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capture::CaptureStats;

/// Errors from status writing.
#[derive(Debug, Error)]
pub enum StatusWriterError {
    #[error("failed to encode status: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to append status: {0}")]
    Append(#[source] FsError),
}

/// One status heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusLine {
    /// Unix epoch seconds when the line was taken.
    pub timestamp: u64,

    /// Controller state, as displayed (`idle`, `collecting`, `stopping`).
    pub state: String,

    pub lines_read: u64,
    pub lines_forwarded: u64,
    pub lines_excluded: u64,

    /// Entries in the log index (files in the current batch).
    pub log_files: u64,

    /// Entries in the archive index.
    pub archives: u64,
}

impl StatusLine {
    pub fn new(
        timestamp: u64,
        state: impl Into<String>,
        stats: CaptureStats,
        log_files: u64,
        archives: u64,
    ) -> Self {
        Self {
            timestamp,
            state: state.into(),
            lines_read: stats.lines_read,
            lines_forwarded: stats.lines_forwarded,
            lines_excluded: stats.lines_excluded,
            log_files,
            archives,
        }
    }

    /// Serialize to a JSON line (no trailing newline).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Writer for an append-only status.jsonl file.
pub struct StatusWriter<F: Filesystem> {
    fs: F,
    path: PathBuf,
}

impl<F: Filesystem> StatusWriter<F> {
    pub fn new(fs: F, path: PathBuf) -> Self {
        Self { fs, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a status line. The file is created if it doesn't exist.
    pub fn append(&self, status: &StatusLine) -> Result<(), StatusWriterError> {
        let line = format!("{}\n", status.to_json()?);
        self.fs
            .append_atomic(&self.path, line.as_bytes())
            .map_err(StatusWriterError::Append)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lotus_fs::MockFilesystem;

    fn stats(read: u64, forwarded: u64) -> CaptureStats {
        CaptureStats {
            lines_read: read,
            lines_forwarded: forwarded,
            lines_excluded: read - forwarded,
        }
    }

    fn get_content(fs: &MockFilesystem, path: &Path) -> Option<String> {
        fs.get_file(path)
            .map(|data| String::from_utf8_lossy(&data).to_string())
    }

    #[test]
    fn test_status_line_to_json() {
        let line = StatusLine::new(1704067200, "collecting", stats(10, 8), 2, 1);
        let json = line.to_json().expect("json");

        assert!(json.contains("\"timestamp\":1704067200"));
        assert!(json.contains("\"state\":\"collecting\""));
        assert!(json.contains("\"lines_excluded\":2"));
        assert!(json.contains("\"archives\":1"));
        assert_eq!(StatusLine::from_json(&json).expect("parse"), line);
    }

    #[test]
    fn test_status_line_missing_field() {
        let json = r#"{"timestamp":1000,"state":"idle"}"#;
        assert!(StatusLine::from_json(json).is_err());
    }

    #[test]
    fn test_status_writer_appends() {
        let fs = MockFilesystem::new();
        let path = PathBuf::from("/tmp/status.jsonl");
        let writer = StatusWriter::new(fs.clone(), path.clone());

        writer
            .append(&StatusLine::new(1000, "collecting", stats(5, 5), 1, 0))
            .expect("append 1");
        writer
            .append(&StatusLine::new(2000, "idle", stats(9, 7), 2, 0))
            .expect("append 2");

        let content = get_content(&fs, &path).expect("content");
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(StatusLine::from_json(lines[1]).expect("parse").lines_forwarded, 7);
        assert_eq!(writer.path(), path.as_path());
    }

    #[test]
    fn test_status_writer_append_failure() {
        let fs = MockFilesystem::new();
        let path = PathBuf::from("/tmp/status.jsonl");
        fs.fail_path(path.clone());
        let writer = StatusWriter::new(fs, path);

        let result = writer.append(&StatusLine::new(1000, "idle", stats(0, 0), 0, 0));
        assert!(matches!(result, Err(StatusWriterError::Append(_))));
    }
}
