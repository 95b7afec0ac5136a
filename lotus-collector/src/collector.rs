//! Capture session lifecycle.
//!
//! [`CollectorController`] owns at most one capture session at a time:
//! - `start` builds and initializes a [`RotatingWriter`], then launches a
//!   [`CaptureLoop`] on its own thread
//! - `stop` cancels the loop and returns without waiting for the thread; the
//!   writer is closed here when idle, otherwise by the thread once its
//!   current write or rotation is done
//! - `status` can be read from any thread at any time
//!
//! A stream failure ends the capture thread but leaves the controller in
//! `Collecting` until `stop` is called.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::thread;

use lotus_clock::Clock;
use lotus_fs::Filesystem;
use parking_lot::Mutex;
use thiserror::Error;

use crate::capture::{CaptureHandle, CaptureLoop, CaptureStats, SharedWriter};
use crate::config::CollectConfig;
use crate::listener::CollectListener;
use crate::logger::Logger;
use crate::source::StreamSource;
use crate::writer::RotatingWriter;

/// Lifecycle state of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Collecting,
    /// Transient while `stop` tears the session down.
    Stopping,
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureState::Idle => "idle",
            CaptureState::Collecting => "collecting",
            CaptureState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Errors from controller lifecycle calls. None of them change state.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("already collecting")]
    AlreadyCollecting,

    #[error("a capture session is still stopping")]
    Stopping,

    #[error("not collecting")]
    NotCollecting,

    #[error("failed to launch capture thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Starts and stops capture sessions.
pub struct CollectorController<F, C, L>
where
    F: Filesystem + Clone,
    C: Clock,
    L: Logger,
{
    fs: F,
    clock: C,
    logger: L,
    listener: Arc<dyn CollectListener>,
    source: Arc<dyn StreamSource>,
    config: CollectConfig,
    state: Mutex<CaptureState>,
    writer: Mutex<Option<SharedWriter<F, C, L>>>,
    capture: Mutex<Option<CaptureHandle>>,
}

impl<F, C, L> CollectorController<F, C, L>
where
    F: Filesystem + Clone + 'static,
    C: Clock + Clone + 'static,
    L: Logger + Clone + 'static,
{
    pub fn new(
        fs: F,
        clock: C,
        logger: L,
        listener: Arc<dyn CollectListener>,
        source: Arc<dyn StreamSource>,
        config: CollectConfig,
    ) -> Self {
        Self {
            fs,
            clock,
            logger,
            listener,
            source,
            config,
            state: Mutex::new(CaptureState::Idle),
            writer: Mutex::new(None),
            capture: Mutex::new(None),
        }
    }

    /// Begin a capture session.
    pub fn start(&self) -> Result<(), ControllerError> {
        {
            let mut state = self.state.lock();
            match *state {
                CaptureState::Idle => *state = CaptureState::Collecting,
                CaptureState::Collecting => {
                    self.logger.error("Start ignored: already collecting");
                    return Err(ControllerError::AlreadyCollecting);
                }
                CaptureState::Stopping => {
                    self.logger.error("Start ignored: previous session still stopping");
                    return Err(ControllerError::Stopping);
                }
            }
        }

        // A cancelled session may still be finishing a rotation in this directory.
        let previous = self.capture.lock().take();
        if let Some(previous) = previous {
            if previous.is_current_thread() {
                *self.capture.lock() = Some(previous);
                *self.state.lock() = CaptureState::Idle;
                self.logger.error("Start ignored: called from the capture thread");
                return Err(ControllerError::Stopping);
            }
            let _ = previous.join();
        }

        // No controller lock is held here: an archive callback fired by this
        // first rotation may call `stop`.
        let mut writer = RotatingWriter::new(
            self.fs.clone(),
            self.clock.clone(),
            self.logger.clone(),
            self.listener.clone(),
            self.config.writer_settings(),
        );
        writer.init();
        let writer: SharedWriter<F, C, L> = Arc::new(Mutex::new(writer));

        // Held until the session is installed so a concurrent stop waits for it.
        let mut writer_slot = self.writer.lock();
        if *self.state.lock() != CaptureState::Collecting {
            writer.lock().close();
            self.logger.info("Start superseded by stop");
            return Ok(());
        }

        let capture = CaptureLoop::new(
            self.source.clone(),
            self.config.filter(),
            writer.clone(),
            self.logger.clone(),
            self.listener.clone(),
        );

        match capture.spawn() {
            Ok(handle) => {
                *self.capture.lock() = Some(handle);
                *writer_slot = Some(writer);
                self.logger.info(&format!(
                    "Collecting into {}",
                    self.config.log_dir.display()
                ));
                Ok(())
            }
            Err(e) => {
                writer.lock().close();
                *self.state.lock() = CaptureState::Idle;
                self.logger
                    .error(&format!("Cannot launch capture thread: {}", e));
                Err(ControllerError::Spawn(e))
            }
        }
    }

    /// End the current capture session without waiting for the capture
    /// thread. Safe to call from a [`CollectListener`] callback.
    pub fn stop(&self) -> Result<(), ControllerError> {
        {
            let mut state = self.state.lock();
            match *state {
                CaptureState::Collecting => *state = CaptureState::Stopping,
                CaptureState::Idle | CaptureState::Stopping => {
                    self.logger.error("Stop ignored: not collecting");
                    return Err(ControllerError::NotCollecting);
                }
            }
        }

        let writer = self.writer.lock().take();

        // Cancel first: the capture thread re-checks the flag under the writer
        // lock and closes the writer itself when it exits.
        if let Some(capture) = self.capture.lock().as_ref() {
            capture.cancel();
        }
        if let Some(mut writer) = writer.as_ref().and_then(|w| w.try_lock()) {
            writer.close();
        }

        *self.state.lock() = CaptureState::Idle;
        self.logger.info("Collecting stopped");
        Ok(())
    }

    pub fn status(&self) -> CaptureState {
        *self.state.lock()
    }

    /// Counters of the current, or most recent, capture session.
    pub fn stats(&self) -> CaptureStats {
        self.capture
            .lock()
            .as_ref()
            .map(CaptureHandle::stats)
            .unwrap_or_default()
    }

    /// True when no capture thread is running, including after the stream
    /// ended or failed on its own.
    pub fn is_capture_finished(&self) -> bool {
        self.capture
            .lock()
            .as_ref()
            .map_or(true, CaptureHandle::is_finished)
    }

    /// Wait for the most recent capture thread to exit. Blocks for as long as
    /// the stream stays open, so call it after `stop` or once the stream ended.
    pub fn join_capture(&self) -> Option<thread::Result<CaptureStats>> {
        let handle = self.capture.lock().take();
        handle.map(CaptureHandle::join)
    }
}
