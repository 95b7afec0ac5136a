//! Callbacks from the pipeline to its host.

use std::sync::{Arc, PoisonError, RwLock};

use lotus_fs::ArchiveArtifact;

use crate::logger::Logger;

/// Receives archive results and unrecoverable stream errors.
///
/// `on_archive_produced` runs on the thread that rotated the writer, with the
/// writer locked; `on_error` runs on the capture thread. Either may call
/// `CollectorController::stop`.
pub trait CollectListener: Send + Sync {
    fn on_archive_produced(&self, artifact: &ArchiveArtifact);
    fn on_error(&self, message: &str);
}

impl<T: CollectListener + ?Sized> CollectListener for Arc<T> {
    fn on_archive_produced(&self, artifact: &ArchiveArtifact) {
        (**self).on_archive_produced(artifact);
    }

    fn on_error(&self, message: &str) {
        (**self).on_error(message);
    }
}

/// Reports callbacks through a [`Logger`]. Used by the binary.
#[derive(Debug, Clone)]
pub struct LoggingListener<L: Logger> {
    logger: L,
}

impl<L: Logger> LoggingListener<L> {
    pub fn new(logger: L) -> Self {
        Self { logger }
    }
}

impl<L: Logger> CollectListener for LoggingListener<L> {
    fn on_archive_produced(&self, artifact: &ArchiveArtifact) {
        self.logger.info(&format!(
            "Archive ready: {} ({} files)",
            artifact.path.display(),
            artifact.entries
        ));
    }

    fn on_error(&self, message: &str) {
        self.logger.error(&format!("Capture stopped: {}", message));
    }
}

/// Records every callback for assertions.
#[derive(Debug, Clone, Default)]
pub struct RecordingListener {
    archives: Arc<RwLock<Vec<ArchiveArtifact>>>,
    errors: Arc<RwLock<Vec<String>>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn archives(&self) -> Vec<ArchiveArtifact> {
        self.archives
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CollectListener for RecordingListener {
    fn on_archive_produced(&self, artifact: &ArchiveArtifact) {
        self.archives
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(artifact.clone());
    }

    fn on_error(&self, message: &str) {
        self.errors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
    }
}
