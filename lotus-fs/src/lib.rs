//! Filesystem layer for lotus.
//!
//! This crate provides:
//! - Filesystem trait with real and in-memory implementations
//! - SequenceIndex, the durable name list behind rotation and retention
//! - Entry naming for rotated log files and archives
//! - Zip bundling of a batch of log files

pub mod archive;
pub mod filesystem;
pub mod index;
pub mod naming;

pub use archive::{bundle_files, ArchiveArtifact};
pub use filesystem::{Filesystem, FsError, MockFilesystem, RealFilesystem, WriteSeek};
pub use index::SequenceIndex;
pub use naming::{
    archive_filename, entry_filename, log_filename, ARCHIVE_EXTENSION,
    INDEX_FILE, LOG_EXTENSION,
};
