//! Line-count based rotation of log files with threshold archiving.
//!
//! The writer owns the working directory: a flat set of numbered log files plus
//! the `index` that lists them. Every rotation re-reads the index; once it holds
//! `retention` entries the whole directory is handed to the [`Archiver`] before
//! the next file is opened, and the batch numbering starts again at 1.
//!
//! Nothing here propagates errors. Setup failures leave the writer
//! uninitialized (writes become no-ops until the next rotation attempt) and
//! per-line failures drop that line, so a broken disk never stops capture.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lotus_clock::Clock;
use lotus_fs::{log_filename, Filesystem, SequenceIndex};

use crate::archiver::Archiver;
use crate::listener::CollectListener;
use crate::logger::Logger;

/// Directories and limits for a [`RotatingWriter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterSettings {
    /// Directory holding the not-yet-archived log files and their index.
    pub working_dir: PathBuf,

    /// Directory receiving archives and the archive index.
    pub archive_dir: PathBuf,

    /// Lines per log file. `None` never rotates.
    pub lines_per_file: Option<u64>,

    /// Log files allowed to accumulate before archiving. `None` never archives.
    pub retention: Option<u64>,
}

struct OpenLog {
    path: PathBuf,
    stream: Box<dyn Write + Send>,
}

/// Writes lines into numbered, bounded log files.
pub struct RotatingWriter<F, C, L>
where
    F: Filesystem + Clone,
    C: Clock,
    L: Logger,
{
    fs: F,
    clock: C,
    logger: L,
    listener: Arc<dyn CollectListener>,
    working_dir: PathBuf,
    index: SequenceIndex<F>,
    archiver: Archiver<F, C>,
    lines_per_file: Option<u64>,
    retention: Option<u64>,
    current: Option<OpenLog>,
    line_count: u64,
    record: Vec<u8>,
}

impl<F, C, L> RotatingWriter<F, C, L>
where
    F: Filesystem + Clone,
    C: Clock + Clone,
    L: Logger,
{
    pub fn new(
        fs: F,
        clock: C,
        logger: L,
        listener: Arc<dyn CollectListener>,
        settings: WriterSettings,
    ) -> Self {
        let index = SequenceIndex::new(fs.clone(), &settings.working_dir);
        let archiver = Archiver::new(fs.clone(), clock.clone(), settings.archive_dir);
        Self {
            fs,
            clock,
            logger,
            listener,
            working_dir: settings.working_dir,
            index,
            archiver,
            lines_per_file: settings.lines_per_file,
            retention: settings.retention,
            current: None,
            line_count: 0,
            record: Vec::new(),
        }
    }
}

impl<F, C, L> RotatingWriter<F, C, L>
where
    F: Filesystem + Clone,
    C: Clock,
    L: Logger,
{
    /// Open the next log file, archiving the working directory first if it is
    /// at the retention threshold. No-op when a file is already open.
    pub fn init(&mut self) {
        if self.current.is_some() {
            return;
        }

        if let Err(e) = self.fs.create_dir_all(&self.working_dir) {
            self.logger.error(&format!(
                "Cannot create log directory {}: {}",
                self.working_dir.display(),
                e
            ));
            return;
        }

        let count = match self.index.load() {
            Ok(count) => count as u64,
            Err(e) => {
                self.logger.error(&format!(
                    "Cannot load log index {}: {}",
                    self.index.path().display(),
                    e
                ));
                return;
            }
        };

        let count = self.archive_if_due(count);
        self.open_next(count + 1);
    }

    /// Returns the entry count the next file is numbered from.
    fn archive_if_due(&mut self, count: u64) -> u64 {
        match self.retention {
            Some(threshold) if count >= threshold => {}
            _ => return count,
        }

        let artifact = match self.archiver.compress(&self.working_dir) {
            Ok(artifact) => artifact,
            Err(e) => {
                self.logger
                    .warn(&format!("Archiving skipped, retrying at next rotation: {}", e));
                return count;
            }
        };

        self.logger.info(&format!(
            "Archived {} files into {}",
            artifact.entries, artifact.name
        ));

        // The batch is committed from here on; leftovers must not re-archive it.
        if let Err(e) = self.archiver.clear_working_dir(&self.working_dir) {
            self.logger.error(&e.to_string());
        }

        let recreated = self
            .fs
            .create_dir_all(&self.working_dir)
            .and_then(|()| self.index.reset());
        if let Err(e) = recreated {
            self.logger.error(&format!(
                "Cannot recreate log directory {}: {}",
                self.working_dir.display(),
                e
            ));
        }

        self.listener.on_archive_produced(&artifact);
        0
    }

    fn open_next(&mut self, ordinal: u64) {
        let name = log_filename(ordinal, self.clock.now_unix_sec());
        let path = self.working_dir.join(&name);

        if let Err(e) = self.fs.create_file_if_absent(&path) {
            self.logger
                .error(&format!("Cannot create log file {}: {}", path.display(), e));
            return;
        }

        if let Err(e) = self.index.append(&name) {
            self.logger
                .error(&format!("Cannot record {} in log index: {}", name, e));
            return;
        }

        match self.fs.open_append(&path) {
            Ok(stream) => {
                self.logger.verbose(&format!("Writing {}", path.display()));
                self.current = Some(OpenLog { path, stream });
                self.line_count = 0;
            }
            Err(e) => {
                self.logger
                    .error(&format!("Cannot open log file {}: {}", path.display(), e));
            }
        }
    }

    /// Append `line` and a newline to the open file. Dropped when uninitialized.
    pub fn write(&mut self, line: &str) {
        let Some(log) = self.current.as_mut() else {
            return;
        };

        self.record.clear();
        self.record.extend_from_slice(line.as_bytes());
        self.record.push(b'\n');

        if let Err(e) = log.stream.write_all(&self.record) {
            self.logger.warn(&format!(
                "Dropped line, write to {} failed: {}",
                log.path.display(),
                e
            ));
        }
    }

    /// Write one line, then roll to a fresh file once `limit` lines were counted.
    pub fn write_with_divided(&mut self, line: &str, limit: Option<u64>) {
        self.write(line);
        self.line_count += 1;

        if let Some(limit) = limit {
            if self.line_count >= limit {
                self.close();
                self.init();
            }
        }
    }

    /// [`write_with_divided`](Self::write_with_divided) with the configured limit.
    pub fn write_line(&mut self, line: &str) {
        self.write_with_divided(line, self.lines_per_file);
    }

    /// Flush and release the open file, if any.
    pub fn close(&mut self) {
        let Some(mut log) = self.current.take() else {
            return;
        };

        if let Err(e) = log.stream.flush() {
            self.logger
                .warn(&format!("Flush of {} failed: {}", log.path.display(), e));
        }
        self.logger.debug(&format!("Closed {}", log.path.display()));
    }

    pub fn is_initialized(&self) -> bool {
        self.current.is_some()
    }

    /// Lines counted against the current file.
    pub fn line_count(&self) -> u64 {
        self.line_count
    }

    pub fn current_file(&self) -> Option<&Path> {
        self.current.as_ref().map(|log| log.path.as_path())
    }

    pub fn index(&self) -> &SequenceIndex<F> {
        &self.index
    }

    pub fn archiver(&self) -> &Archiver<F, C> {
        &self.archiver
    }
}
