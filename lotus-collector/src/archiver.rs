//! Compression of a full working directory into one numbered zip archive.

use std::path::{Path, PathBuf};

use lotus_clock::Clock;
use lotus_fs::{archive_filename, bundle_files, ArchiveArtifact, Filesystem, FsError, SequenceIndex};
use thiserror::Error;

/// Errors from archive production.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("cannot prepare archive destination {}: {source}", path.display())]
    Destination {
        path: PathBuf,
        #[source]
        source: FsError,
    },

    #[error("failed to bundle {}: {source}", dir.display())]
    Bundle {
        dir: PathBuf,
        #[source]
        source: FsError,
    },

    #[error("archive index update failed: {0}")]
    Index(#[source] FsError),

    #[error("archived files left behind in {}: {source}", dir.display())]
    Cleanup {
        dir: PathBuf,
        #[source]
        source: FsError,
    },
}

/// Produces numbered archives in `archive_dir`, tracked by its own index.
#[derive(Debug, Clone)]
pub struct Archiver<F: Filesystem + Clone, C: Clock> {
    fs: F,
    clock: C,
    archive_dir: PathBuf,
    index: SequenceIndex<F>,
}

impl<F: Filesystem + Clone, C: Clock> Archiver<F, C> {
    pub fn new(fs: F, clock: C, archive_dir: impl Into<PathBuf>) -> Self {
        let archive_dir = archive_dir.into();
        let index = SequenceIndex::new(fs.clone(), &archive_dir);
        Self {
            fs,
            clock,
            archive_dir,
            index,
        }
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    pub fn index(&self) -> &SequenceIndex<F> {
        &self.index
    }

    /// Bundle every first-level file in `working_dir` into the next archive.
    ///
    /// The archive name is recorded in the archive index only once the zip has
    /// been written and closed. On any failure the partial archive is removed
    /// and `working_dir` is left as it was, so a later call retries from the
    /// same state. Once this returns `Ok` the batch is committed and the caller
    /// clears `working_dir` with [`clear_working_dir`](Self::clear_working_dir).
    pub fn compress(&self, working_dir: &Path) -> Result<ArchiveArtifact, ArchiveError> {
        self.fs
            .create_dir_all(&self.archive_dir)
            .map_err(|source| ArchiveError::Destination {
                path: self.archive_dir.clone(),
                source,
            })?;

        let count = self.index.load().map_err(ArchiveError::Index)?;
        let name = archive_filename(count as u64 + 1, self.clock.now_unix_sec());
        let path = self.archive_dir.join(&name);

        self.fs
            .create_file_if_absent(&path)
            .map_err(|source| ArchiveError::Destination {
                path: path.clone(),
                source,
            })?;

        let bundled = self
            .fs
            .list_files(working_dir)
            .and_then(|files| bundle_files(&self.fs, &files, &path));

        let entries = match bundled {
            Ok(entries) => entries,
            Err(source) => {
                let _ = self.fs.remove(&path);
                return Err(ArchiveError::Bundle {
                    dir: working_dir.to_path_buf(),
                    source,
                });
            }
        };

        if let Err(e) = self.index.append(&name) {
            let _ = self.fs.remove(&path);
            return Err(ArchiveError::Index(e));
        }

        Ok(ArchiveArtifact {
            name,
            path,
            entries,
        })
    }

    /// Delete an archived `working_dir`. When the directory cannot be removed
    /// as a whole, its files are removed one by one; only files that survive
    /// that as well are reported.
    pub fn clear_working_dir(&self, working_dir: &Path) -> Result<(), ArchiveError> {
        if self.fs.remove_dir_all(working_dir).is_ok() {
            return Ok(());
        }

        let cleanup = |source| ArchiveError::Cleanup {
            dir: working_dir.to_path_buf(),
            source,
        };
        for file in self.fs.list_files(working_dir).map_err(cleanup)? {
            self.fs.remove(&file).map_err(cleanup)?;
        }
        Ok(())
    }
}
