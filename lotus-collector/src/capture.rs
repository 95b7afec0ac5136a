//! The background capture loop.
//!
//! One thread per capture session: open the stream, then read, filter and
//! forward line by line into the shared [`RotatingWriter`]. Cancellation is
//! cooperative. The flag is checked once per line and again under the writer
//! lock, and the stream's interrupter unblocks a read that is parked waiting
//! for input. A read that fails after cancellation ends the loop quietly.
//!
//! The thread closes the writer on its way out, so a stop that arrives while
//! a rotation holds the writer does not have to wait for it.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use lotus_clock::Clock;
use lotus_fs::Filesystem;
use parking_lot::Mutex;
use serde::Serialize;

use crate::filter::LineFilter;
use crate::listener::CollectListener;
use crate::logger::Logger;
use crate::signal::{ShutdownCheck, ShutdownFlag};
use crate::source::{Interrupt, StreamSource};
use crate::writer::RotatingWriter;

/// Forwarded lines between two liveness log messages.
pub const LIVENESS_INTERVAL: u64 = 100;

/// Writer shared between the controller and the capture thread.
pub type SharedWriter<F, C, L> = Arc<Mutex<RotatingWriter<F, C, L>>>;

type InterruptSlot = Arc<Mutex<Option<Arc<dyn Interrupt>>>>;

/// Point-in-time capture counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CaptureStats {
    /// Lines read from the stream.
    pub lines_read: u64,
    /// Lines handed to the writer.
    pub lines_forwarded: u64,
    /// Lines dropped by the exclusion filter.
    pub lines_excluded: u64,
}

#[derive(Debug, Default)]
struct Counters {
    read: AtomicU64,
    forwarded: AtomicU64,
    excluded: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> CaptureStats {
        CaptureStats {
            lines_read: self.read.load(Ordering::Relaxed),
            lines_forwarded: self.forwarded.load(Ordering::Relaxed),
            lines_excluded: self.excluded.load(Ordering::Relaxed),
        }
    }
}

/// A capture session ready to be launched.
pub struct CaptureLoop<F, C, L>
where
    F: Filesystem + Clone,
    C: Clock,
    L: Logger,
{
    source: Arc<dyn StreamSource>,
    filter: LineFilter,
    writer: SharedWriter<F, C, L>,
    logger: L,
    listener: Arc<dyn CollectListener>,
    cancel: ShutdownFlag,
    interrupter: InterruptSlot,
    counters: Arc<Counters>,
}

impl<F, C, L> CaptureLoop<F, C, L>
where
    F: Filesystem + Clone + 'static,
    C: Clock + 'static,
    L: Logger + 'static,
{
    pub fn new(
        source: Arc<dyn StreamSource>,
        filter: LineFilter,
        writer: SharedWriter<F, C, L>,
        logger: L,
        listener: Arc<dyn CollectListener>,
    ) -> Self {
        Self {
            source,
            filter,
            writer,
            logger,
            listener,
            cancel: ShutdownFlag::manual(),
            interrupter: Arc::new(Mutex::new(None)),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Launch the loop on a dedicated thread.
    pub fn spawn(self) -> io::Result<CaptureHandle> {
        let cancel = self.cancel.clone();
        let interrupter = self.interrupter.clone();
        let counters = self.counters.clone();

        let thread = thread::Builder::new()
            .name("lotus-capture".to_string())
            .spawn(move || self.run())?;

        Ok(CaptureHandle {
            cancel,
            interrupter,
            counters,
            thread: Some(thread),
        })
    }

    /// Run the loop on the calling thread until end-of-stream, a stream
    /// failure or cancellation.
    pub fn run(self) {
        self.capture();
        self.writer.lock().close();
        self.logger.verbose("Capture finished");
    }

    fn capture(&self) {
        let mut stream = match self.source.open() {
            Ok(stream) => stream,
            Err(e) => {
                if !self.cancel.should_stop() {
                    self.report(&format!("cannot open stream: {}", e));
                }
                return;
            }
        };

        *self.interrupter.lock() = Some(stream.interrupter());
        self.logger.verbose("Capture started");

        while !self.cancel.should_stop() {
            let line = match stream.next_line() {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    if !self.cancel.should_stop() {
                        self.report(&format!("stream read failed: {}", e));
                    }
                    break;
                }
                None => {
                    if !self.cancel.should_stop() {
                        self.logger.info("Stream ended");
                    }
                    break;
                }
            };

            if self.cancel.should_stop() {
                break;
            }
            self.counters.read.fetch_add(1, Ordering::Relaxed);

            if !self.filter.should_keep(&line) {
                self.counters.excluded.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            {
                let mut writer = self.writer.lock();
                if self.cancel.should_stop() {
                    break;
                }
                writer.write_line(&line);
            }

            let forwarded = self.counters.forwarded.fetch_add(1, Ordering::Relaxed) + 1;
            if forwarded % LIVENESS_INTERVAL == 0 {
                self.logger
                    .debug(&format!("Capture alive, {} lines written", forwarded));
            }
        }
    }

    fn report(&self, message: &str) {
        self.logger.error(&format!("Capture failed: {}", message));
        self.listener.on_error(message);
    }
}

/// Control handle for a running capture thread.
pub struct CaptureHandle {
    cancel: ShutdownFlag,
    interrupter: InterruptSlot,
    counters: Arc<Counters>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureHandle {
    /// Request the loop to stop and unblock a pending read. Does not wait.
    pub fn cancel(&self) {
        self.cancel.trigger();
        if let Some(interrupter) = self.interrupter.lock().as_ref() {
            interrupter.interrupt();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.should_stop()
    }

    /// True when called from the capture thread itself, e.g. from a listener.
    pub fn is_current_thread(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|t| t.thread().id() == thread::current().id())
    }

    /// True once the capture thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    pub fn stats(&self) -> CaptureStats {
        self.counters.snapshot()
    }

    /// Wait for the capture thread to exit and return the final counters.
    pub fn join(mut self) -> thread::Result<CaptureStats> {
        if let Some(thread) = self.thread.take() {
            thread.join()?;
        }
        Ok(self.counters.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::RecordingListener;
    use crate::logger::{MockLogger, Verbosity};
    use crate::source::{ChannelSource, MockSource};
    use crate::writer::WriterSettings;
    use lotus_clock::MockClock;
    use lotus_fs::MockFilesystem;
    use std::path::{Path, PathBuf};
    use std::time::{Duration, Instant};

    type TestWriter = SharedWriter<MockFilesystem, MockClock, MockLogger>;

    fn shared_writer(fs: &MockFilesystem, logger: &MockLogger, lines: Option<u64>) -> TestWriter {
        let mut writer = RotatingWriter::new(
            fs.clone(),
            MockClock::new(1704067200),
            logger.clone(),
            Arc::new(RecordingListener::new()),
            WriterSettings {
                working_dir: PathBuf::from("/data/log"),
                archive_dir: PathBuf::from("/data/zip"),
                lines_per_file: lines,
                retention: None,
            },
        );
        writer.init();
        Arc::new(Mutex::new(writer))
    }

    fn first_log(fs: &MockFilesystem) -> String {
        let path = Path::new("/data/log/1_2024-01-01-00-00-00.log");
        String::from_utf8(fs.get_file(path).unwrap_or_default()).expect("utf8")
    }

    fn wait_until(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "timed out");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_run_filters_and_forwards() {
        let fs = MockFilesystem::new();
        let logger = MockLogger::capture_all();
        let writer = shared_writer(&fs, &logger, None);
        let listener = RecordingListener::new();

        let capture = CaptureLoop::new(
            Arc::new(MockSource::new(["INFO a", "DEBUG b", "INFO c"])),
            LineFilter::new(vec!["DEBUG".to_string()]),
            writer,
            logger.clone(),
            Arc::new(listener.clone()),
        );
        let handle = capture.spawn().expect("spawn");
        let stats = handle.join().expect("join");

        assert_eq!(first_log(&fs), "INFO a\nINFO c\n");
        assert_eq!(
            stats,
            CaptureStats {
                lines_read: 3,
                lines_forwarded: 2,
                lines_excluded: 1,
            }
        );
        assert!(listener.errors().is_empty());
        assert!(logger.contains("Stream ended"));
    }

    #[test]
    fn test_writer_closed_when_loop_exits() {
        let fs = MockFilesystem::new();
        let logger = MockLogger::capture_all();
        let writer = shared_writer(&fs, &logger, None);

        CaptureLoop::new(
            Arc::new(MockSource::new(["only"])),
            LineFilter::default(),
            writer.clone(),
            logger.clone(),
            Arc::new(RecordingListener::new()),
        )
        .run();

        assert!(!writer.lock().is_initialized());
        assert_eq!(first_log(&fs), "only\n");
    }

    #[test]
    fn test_open_failure_is_reported() {
        let fs = MockFilesystem::new();
        let logger = MockLogger::capture_all();
        let listener = RecordingListener::new();

        let capture = CaptureLoop::new(
            Arc::new(MockSource::failing_open("permission denied")),
            LineFilter::default(),
            shared_writer(&fs, &logger, None),
            logger.clone(),
            Arc::new(listener.clone()),
        );
        capture.run();

        assert_eq!(listener.errors().len(), 1);
        assert!(listener.errors()[0].contains("permission denied"));
        assert_eq!(logger.messages_at_level(Verbosity::Error).len(), 1);
    }

    #[test]
    fn test_read_failure_is_reported_after_written_lines() {
        let fs = MockFilesystem::new();
        let logger = MockLogger::capture_all();
        let listener = RecordingListener::new();

        let capture = CaptureLoop::new(
            Arc::new(MockSource::new(["one", "two"]).with_read_error("broken pipe")),
            LineFilter::default(),
            shared_writer(&fs, &logger, None),
            logger.clone(),
            Arc::new(listener.clone()),
        );
        capture.run();

        assert_eq!(first_log(&fs), "one\ntwo\n");
        assert_eq!(listener.errors().len(), 1);
        assert!(listener.errors()[0].contains("broken pipe"));
    }

    #[test]
    fn test_cancel_unblocks_waiting_read() {
        let fs = MockFilesystem::new();
        let logger = MockLogger::capture_all();
        let listener = RecordingListener::new();
        let (feed, source) = ChannelSource::new();

        let handle = CaptureLoop::new(
            Arc::new(source),
            LineFilter::default(),
            shared_writer(&fs, &logger, None),
            logger.clone(),
            Arc::new(listener.clone()),
        )
        .spawn()
        .expect("spawn");

        feed.send_line("first");
        wait_until(|| handle.stats().lines_forwarded == 1);
        assert!(!handle.is_finished());

        handle.cancel();
        assert!(handle.is_cancelled());
        let stats = handle.join().expect("join");

        assert_eq!(stats.lines_forwarded, 1);
        assert_eq!(first_log(&fs), "first\n");
        assert!(listener.errors().is_empty());
    }

    #[test]
    fn test_cancelled_session_stays_quiet() {
        let fs = MockFilesystem::new();
        let logger = MockLogger::capture_all();
        let listener = RecordingListener::new();

        let capture = CaptureLoop::new(
            Arc::new(MockSource::new(["never"]).with_read_error("interrupted")),
            LineFilter::default(),
            shared_writer(&fs, &logger, None),
            logger.clone(),
            Arc::new(listener.clone()),
        );
        capture.cancel.trigger();
        capture.run();

        assert_eq!(first_log(&fs), "");
        assert!(listener.errors().is_empty());
        assert!(logger.messages_at_level(Verbosity::Error).is_empty());
    }

    #[test]
    fn test_read_error_after_cancel_is_quiet() {
        let fs = MockFilesystem::new();
        let logger = MockLogger::capture_all();
        let listener = RecordingListener::new();
        let (feed, source) = ChannelSource::new();

        let handle = CaptureLoop::new(
            Arc::new(source),
            LineFilter::default(),
            shared_writer(&fs, &logger, None),
            logger.clone(),
            Arc::new(listener.clone()),
        )
        .spawn()
        .expect("spawn");

        feed.send_line("first");
        wait_until(|| handle.stats().lines_forwarded == 1);
        handle.cancel.trigger();
        feed.fail("interrupted");
        handle.join().expect("join");

        assert!(listener.errors().is_empty());
        assert!(logger.messages_at_level(Verbosity::Error).is_empty());
    }

    #[test]
    fn test_liveness_logged_every_interval() {
        let fs = MockFilesystem::new();
        let logger = MockLogger::capture_all();
        let lines: Vec<String> = (0..250).map(|i| format!("line {}", i)).collect();

        CaptureLoop::new(
            Arc::new(MockSource::new(lines)),
            LineFilter::default(),
            shared_writer(&fs, &logger, None),
            logger.clone(),
            Arc::new(RecordingListener::new()),
        )
        .run();

        let alive: Vec<String> = logger
            .messages_at_level(Verbosity::Debug)
            .into_iter()
            .filter(|m| m.starts_with("Capture alive"))
            .collect();
        assert_eq!(
            alive,
            vec![
                "Capture alive, 100 lines written",
                "Capture alive, 200 lines written"
            ]
        );
    }
}
