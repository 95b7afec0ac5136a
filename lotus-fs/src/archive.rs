//! Zip bundling of rotated log files.

use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::filesystem::{Filesystem, FsError};

/// Read buffer used while streaming file contents into an archive.
const COPY_BUFFER_SIZE: usize = 1024 * 1024;

/// A finished archive bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveArtifact {
    /// File name, as recorded in the archive index.
    pub name: String,

    /// Full path of the archive.
    pub path: PathBuf,

    /// Number of files bundled.
    pub entries: u64,
}

/// Write every file in `files` into a deflate-compressed zip at `dest`.
///
/// Each file is stored under its bare file name. `dest` is created or truncated.
/// Returns the number of bundled entries. On error `dest` may be left partially
/// written; removing it is the caller's job.
pub fn bundle_files<F: Filesystem>(
    fs: &F,
    files: &[PathBuf],
    dest: &Path,
) -> Result<u64, FsError> {
    let mut zip = ZipWriter::new(fs.create_truncate(dest)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut entries = 0u64;

    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| FsError::Path(format!("no file name: {}", path.display())))?;

        zip.start_file(name, options)?;
        let mut reader = BufReader::with_capacity(COPY_BUFFER_SIZE, fs.open_read(path)?);
        io::copy(&mut reader, &mut zip)?;
        entries += 1;
    }

    let mut inner = zip.finish()?;
    inner.flush()?;

    Ok(entries)
}
