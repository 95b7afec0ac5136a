//! Durable sequence index.
//!
//! A flat, newline-delimited list of entry names kept in a directory's `index`
//! file. The number of entries is the ordinal of the most recently created entry,
//! which is what rotation and retention decisions are based on.

use std::path::{Path, PathBuf};

use crate::filesystem::{Filesystem, FsError};
use crate::naming::INDEX_FILE;

/// Append-only list of entry names backed by `<dir>/index`.
#[derive(Debug, Clone)]
pub struct SequenceIndex<F: Filesystem> {
    fs: F,
    path: PathBuf,
}

impl<F: Filesystem> SequenceIndex<F> {
    /// Bind an index to the `index` file inside `dir`.
    pub fn new(fs: F, dir: &Path) -> Self {
        Self {
            fs,
            path: dir.join(INDEX_FILE),
        }
    }

    /// Path of the backing index file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the index file if absent and return the number of entries.
    pub fn load(&self) -> Result<usize, FsError> {
        self.fs.create_file_if_absent(&self.path)?;
        Ok(self.entries()?.len())
    }

    /// All recorded entry names, oldest first. A missing index has no entries.
    pub fn entries(&self) -> Result<Vec<String>, FsError> {
        if !self.fs.exists(&self.path) {
            return Ok(Vec::new());
        }
        let content = self.fs.read_file(&self.path)?;
        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Record one entry. Callers append only after the named file exists.
    pub fn append(&self, name: &str) -> Result<(), FsError> {
        if name.is_empty() || name.contains('\n') {
            return Err(FsError::Path(format!("invalid index entry: {:?}", name)));
        }
        self.fs
            .append_atomic(&self.path, format!("{}\n", name).as_bytes())
    }

    /// Truncate the index to zero entries.
    pub fn reset(&self) -> Result<(), FsError> {
        self.fs.write_atomic(&self.path, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::{MockFilesystem, RealFilesystem};
    use tempfile::tempdir;

    #[test]
    fn test_load_creates_missing_index() {
        let fs = MockFilesystem::new();
        let index = SequenceIndex::new(fs.clone(), Path::new("/data/log"));

        assert_eq!(index.load().expect("load"), 0);
        assert_eq!(fs.get_file(Path::new("/data/log/index")), Some(vec![]));
    }

    #[test]
    fn test_load_counts_existing_entries() {
        let fs = MockFilesystem::new();
        fs.add_file(
            PathBuf::from("/data/log/index"),
            b"1_a.log\n2_b.log\n\n".to_vec(),
        );
        let index = SequenceIndex::new(fs, Path::new("/data/log"));

        assert_eq!(index.load().expect("load"), 2);
    }

    #[test]
    fn test_append_then_entries_in_order() {
        let fs = MockFilesystem::new();
        let index = SequenceIndex::new(fs, Path::new("/data/zip"));

        index.append("1_a.zip").expect("append");
        index.append("2_b.zip").expect("append");

        assert_eq!(
            index.entries().expect("entries"),
            vec!["1_a.zip".to_string(), "2_b.zip".to_string()]
        );
        assert_eq!(index.load().expect("load"), 2);
    }

    #[test]
    fn test_append_rejects_multiline_names() {
        let fs = MockFilesystem::new();
        let index = SequenceIndex::new(fs, Path::new("/data/log"));

        assert!(index.append("a\nb").is_err());
        assert!(index.append("").is_err());
        assert_eq!(index.load().expect("load"), 0);
    }

    #[test]
    fn test_reset_clears_entries() {
        let fs = MockFilesystem::new();
        let index = SequenceIndex::new(fs, Path::new("/data/log"));
        index.append("1_a.log").expect("append");

        index.reset().expect("reset");

        assert_eq!(index.load().expect("load"), 0);
    }

    #[test]
    fn test_load_fails_when_index_cannot_be_created() {
        let fs = MockFilesystem::new();
        fs.fail_path(PathBuf::from("/data/log"));
        let index = SequenceIndex::new(fs, Path::new("/data/log"));

        assert!(index.load().is_err());
    }

    #[test]
    fn test_real_index_survives_reopen() {
        let dir = tempdir().expect("tempdir");
        {
            let index = SequenceIndex::new(RealFilesystem, dir.path());
            index.load().expect("load");
            index.append("1_a.log").expect("append");
        }

        let reopened = SequenceIndex::new(RealFilesystem, dir.path());
        assert_eq!(reopened.load().expect("load"), 1);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("index")).expect("read"),
            "1_a.log\n"
        );
    }
}
