//! Collect command orchestration.
//!
//! Starts one capture session and supervises it from the calling thread until
//! SIGINT, the optional duration elapses, or the stream ends on its own.

use std::sync::Arc;

use lotus_clock::Clock;
use lotus_fs::{ArchiveArtifact, Filesystem, SequenceIndex};
use parking_lot::Mutex;

use crate::capture::CaptureStats;
use crate::cli::CollectArgs;
use crate::collector::CollectorController;
use crate::io::{StatusLine, StatusWriter};
use crate::listener::{CollectListener, LoggingListener};
use crate::logger::Logger;
use crate::signal::ShutdownCheck;
use crate::sleeper::Sleeper;
use crate::source::StreamSource;

use super::{CommandError, CommandResult};

/// Supervision tick.
const POLL_INTERVAL_MS: u64 = 200;

/// Why the collect command stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Shutdown,
    Duration,
    StreamEnded,
}

/// Result of collect command execution.
#[derive(Debug)]
pub struct CollectResult {
    pub stop_reason: StopReason,
    pub stats: CaptureStats,
    /// Archives produced during this run.
    pub archives: Vec<ArchiveArtifact>,
    pub status_lines: u64,
}

/// Logs like [`LoggingListener`] and keeps what the command reports at exit.
struct SessionListener<L: Logger> {
    inner: LoggingListener<L>,
    archives: Mutex<Vec<ArchiveArtifact>>,
    failure: Mutex<Option<String>>,
}

impl<L: Logger> CollectListener for SessionListener<L> {
    fn on_archive_produced(&self, artifact: &ArchiveArtifact) {
        self.inner.on_archive_produced(artifact);
        self.archives.lock().push(artifact.clone());
    }

    fn on_error(&self, message: &str) {
        self.inner.on_error(message);
        self.failure.lock().get_or_insert_with(|| message.to_string());
    }
}

/// Execute the collect command.
///
/// `source` is the stream to capture; the binary builds it from the trailing
/// command line, tests pass in-memory sources.
pub fn execute_collect<C, F, S, H, L>(
    args: &CollectArgs,
    source: Arc<dyn StreamSource>,
    clock: &C,
    fs: &F,
    sleeper: &S,
    shutdown: &H,
    logger: &L,
) -> CommandResult<CollectResult>
where
    C: Clock + Clone + 'static,
    F: Filesystem + Clone + 'static,
    S: Sleeper,
    H: ShutdownCheck,
    L: Logger + Clone + 'static,
{
    args.validate()?;
    let config = args.to_config();

    logger.verbose(&format!(
        "Starting capture: command={:?}, log_dir={}, archive_dir={}, lines_per_file={:?}, max_files={:?}, exclusions={}",
        config.command,
        config.log_dir.display(),
        config.archive_dir.display(),
        config.lines_per_file,
        config.max_files,
        config.exclusions.len()
    ));

    let listener = Arc::new(SessionListener {
        inner: LoggingListener::new(logger.clone()),
        archives: Mutex::new(Vec::new()),
        failure: Mutex::new(None),
    });

    let log_index = SequenceIndex::new(fs.clone(), &config.log_dir);
    let archive_index = SequenceIndex::new(fs.clone(), &config.archive_dir);
    let status_writer = args
        .status_file
        .clone()
        .map(|path| StatusWriter::new(fs.clone(), path));

    let controller = CollectorController::new(
        fs.clone(),
        clock.clone(),
        logger.clone(),
        listener.clone(),
        source,
        config,
    );
    controller.start()?;

    let start_ts = clock.now_unix_sec();
    let end_ts = args.duration_sec.map(|d| start_ts + d);
    let mut last_status_ts = start_ts;
    let mut status_lines = 0u64;

    let mut write_status = |ts: u64, state: String, stats: CaptureStats| {
        let Some(writer) = &status_writer else {
            return;
        };
        let status = StatusLine::new(
            ts,
            state,
            stats,
            entry_count(&log_index),
            entry_count(&archive_index),
        );
        match writer.append(&status) {
            Ok(()) => status_lines += 1,
            Err(e) => logger.warn(&format!(
                "Status write to {} failed: {}",
                writer.path().display(),
                e
            )),
        }
    };

    let stop_reason = loop {
        if shutdown.should_stop() {
            logger.info("Shutdown requested");
            break StopReason::Shutdown;
        }
        if controller.is_capture_finished() {
            break StopReason::StreamEnded;
        }

        let now = clock.now_unix_sec();
        if end_ts.is_some_and(|end| now >= end) {
            break StopReason::Duration;
        }
        if now >= last_status_ts + args.status_interval_sec {
            write_status(now, controller.status().to_string(), controller.stats());
            last_status_ts = now;
        }

        sleeper.sleep_ms(POLL_INTERVAL_MS);
    };

    controller.stop()?;
    let stats = match controller.join_capture() {
        Some(Ok(stats)) => stats,
        Some(Err(_)) => return Err(CommandError::CapturePanicked),
        None => controller.stats(),
    };
    write_status(
        clock.now_unix_sec(),
        controller.status().to_string(),
        stats,
    );

    if let Some(message) = listener.failure.lock().take() {
        return Err(CommandError::Stream(message));
    }

    let archives = std::mem::take(&mut *listener.archives.lock());
    logger.info(&format!(
        "Captured {} lines ({} excluded), {} archives produced",
        stats.lines_forwarded,
        stats.lines_excluded,
        archives.len()
    ));

    Ok(CollectResult {
        stop_reason,
        stats,
        archives,
        status_lines,
    })
}

fn entry_count<F: Filesystem>(index: &SequenceIndex<F>) -> u64 {
    index.entries().map_or(0, |entries| entries.len() as u64)
}
