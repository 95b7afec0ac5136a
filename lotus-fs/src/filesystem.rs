//! Filesystem abstraction for lotus.
//!
//! Every disk access made by the writer, the sequence indexes and the archiver
//! goes through the [`Filesystem`] trait so that rotation and archiving logic can
//! be exercised against [`MockFilesystem`] without touching the disk.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread;
use std::time::Duration;

use thiserror::Error;

/// Errors from filesystem operations.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("path error: {0}")]
    Path(String),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

/// A writer that can also seek; archives are written through this.
pub trait WriteSeek: Write + Seek + Send {}

impl<T: Write + Seek + Send> WriteSeek for T {}

/// Trait for filesystem operations.
/// Abstracted for testing with mock implementations.
pub trait Filesystem: Send + Sync {
    /// Write data atomically to a path (write to temp, then rename).
    fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<(), FsError>;

    /// Append data to a file and sync it.
    /// Creates the file if it doesn't exist.
    fn append_atomic(&self, path: &Path, data: &[u8]) -> Result<(), FsError>;

    /// Read file contents as a string.
    fn read_file(&self, path: &Path) -> Result<String, FsError>;

    /// Create an empty file unless one already exists. Never truncates.
    fn create_file_if_absent(&self, path: &Path) -> Result<(), FsError>;

    /// Open a long-lived append stream on an existing or new file.
    fn open_append(&self, path: &Path) -> Result<Box<dyn Write + Send>, FsError>;

    /// Open a file for reading.
    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>, FsError>;

    /// Create (or truncate) a file and return a seekable writer on it.
    fn create_truncate(&self, path: &Path) -> Result<Box<dyn WriteSeek>, FsError>;

    /// List the regular files directly inside `dir`, sorted by file name.
    /// A missing directory lists as empty.
    fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>, FsError>;

    /// Remove a file.
    fn remove(&self, path: &Path) -> Result<(), FsError>;

    /// Remove a directory and everything below it. A missing directory is not an error.
    fn remove_dir_all(&self, path: &Path) -> Result<(), FsError>;

    /// Check if a path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Create directory and parents if needed.
    fn create_dir_all(&self, path: &Path) -> Result<(), FsError>;
}

/// Real filesystem implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFilesystem;

impl Filesystem for RealFilesystem {
    fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<(), FsError> {
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, data)?;
        // Rename to final path (atomic on most filesystems)
        fs::rename(&temp_path, path)?;
        Ok(())
    }

    fn append_atomic(&self, path: &Path, data: &[u8]) -> Result<(), FsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(data)?;
        // sync_data skips the metadata sync and is still durable for append-only files
        file.sync_data()?;

        Ok(())
    }

    fn read_file(&self, path: &Path) -> Result<String, FsError> {
        Ok(fs::read_to_string(path)?)
    }

    fn create_file_if_absent(&self, path: &Path) -> Result<(), FsError> {
        OpenOptions::new().create(true).append(true).open(path)?;
        Ok(())
    }

    fn open_append(&self, path: &Path) -> Result<Box<dyn Write + Send>, FsError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Box::new(file))
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>, FsError> {
        Ok(Box::new(File::open(path)?))
    }

    fn create_truncate(&self, path: &Path) -> Result<Box<dyn WriteSeek>, FsError> {
        Ok(Box::new(File::create(path)?))
    }

    fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>, FsError> {
        let mut files = Vec::new();

        if !dir.exists() {
            return Ok(files);
        }

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }

        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(files)
    }

    fn remove(&self, path: &Path) -> Result<(), FsError> {
        fs::remove_file(path)?;
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> Result<(), FsError> {
        match fs::remove_dir_all(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), FsError> {
        fs::create_dir_all(path)?;
        Ok(())
    }
}

type FileMap = Arc<RwLock<HashMap<PathBuf, Vec<u8>>>>;
type PathSet = Arc<RwLock<HashSet<PathBuf>>>;

/// Mock filesystem for testing.
/// Cloning creates a new handle to the same underlying data.
///
/// Paths registered with [`MockFilesystem::fail_path`] make every operation that
/// creates, writes or reads them (or anything below them) fail with
/// `PermissionDenied`, including writes through streams opened earlier.
#[derive(Debug, Clone, Default)]
pub struct MockFilesystem {
    files: FileMap,
    dirs: PathSet,
    failing: PathSet,
    failing_removals: PathSet,
    read_delay: Arc<RwLock<Duration>>,
}

impl MockFilesystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all files in the mock filesystem.
    pub fn files(&self) -> HashMap<PathBuf, Vec<u8>> {
        self.files.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Get content of a specific file.
    pub fn get_file(&self, path: &Path) -> Option<Vec<u8>> {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    /// Add a file directly (for test setup).
    pub fn add_file(&self, path: PathBuf, data: Vec<u8>) {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path, data);
    }

    /// Make every access to `path` (and anything below it) fail.
    pub fn fail_path(&self, path: PathBuf) {
        self.failing
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path);
    }

    /// Make the next `remove_dir_all` of exactly `path` fail. Later calls succeed.
    pub fn fail_dir_removal_once(&self, path: PathBuf) {
        self.failing_removals
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path);
    }

    /// Stall every `open_read` for `delay`.
    pub fn set_read_delay(&self, delay: Duration) {
        *self.read_delay.write().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) {
        self.failing
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.failing_removals
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn check(&self, path: &Path) -> Result<(), FsError> {
        check_failing(&self.failing, path)
    }
}

fn check_failing(failing: &PathSet, path: &Path) -> Result<(), FsError> {
    let failing = failing.read().unwrap_or_else(PoisonError::into_inner);
    if failing.iter().any(|p| path.starts_with(p)) {
        return Err(FsError::Io(io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!("injected failure: {}", path.display()),
        )));
    }
    Ok(())
}

fn not_found(path: &Path) -> FsError {
    FsError::Io(io::Error::new(
        io::ErrorKind::NotFound,
        format!("file not found: {}", path.display()),
    ))
}

impl Filesystem for MockFilesystem {
    fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<(), FsError> {
        self.check(path)?;
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_path_buf(), data.to_vec());
        Ok(())
    }

    fn append_atomic(&self, path: &Path, data: &[u8]) -> Result<(), FsError> {
        self.check(path)?;
        let mut files = self.files.write().unwrap_or_else(PoisonError::into_inner);
        files
            .entry(path.to_path_buf())
            .or_default()
            .extend_from_slice(data);
        Ok(())
    }

    fn read_file(&self, path: &Path) -> Result<String, FsError> {
        self.check(path)?;
        let files = self.files.read().unwrap_or_else(PoisonError::into_inner);
        match files.get(path) {
            Some(data) => String::from_utf8(data.clone())
                .map_err(|e| FsError::Path(format!("invalid utf8: {}", e))),
            None => Err(not_found(path)),
        }
    }

    fn create_file_if_absent(&self, path: &Path) -> Result<(), FsError> {
        self.check(path)?;
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(path.to_path_buf())
            .or_default();
        Ok(())
    }

    fn open_append(&self, path: &Path) -> Result<Box<dyn Write + Send>, FsError> {
        self.create_file_if_absent(path)?;
        Ok(Box::new(MockAppender {
            files: self.files.clone(),
            failing: self.failing.clone(),
            path: path.to_path_buf(),
        }))
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>, FsError> {
        self.check(path)?;
        let delay = *self.read_delay.read().unwrap_or_else(PoisonError::into_inner);
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        let data = self.get_file(path).ok_or_else(|| not_found(path))?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn create_truncate(&self, path: &Path) -> Result<Box<dyn WriteSeek>, FsError> {
        self.write_atomic(path, &[])?;
        Ok(Box::new(MockFileHandle {
            files: self.files.clone(),
            failing: self.failing.clone(),
            path: path.to_path_buf(),
            pos: 0,
        }))
    }

    fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>, FsError> {
        let mut files: Vec<PathBuf> = self
            .files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter(|path| path.parent() == Some(dir))
            .cloned()
            .collect();

        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(files)
    }

    fn remove(&self, path: &Path) -> Result<(), FsError> {
        self.check(path)?;
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> Result<(), FsError> {
        self.check(path)?;
        if self
            .failing_removals
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path)
        {
            return Err(FsError::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("injected removal failure: {}", path.display()),
            )));
        }
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|p, _| !p.starts_with(path));
        self.dirs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|p| !p.starts_with(path));
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(path)
            || self
                .dirs
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(path)
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), FsError> {
        self.check(path)?;
        self.dirs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_path_buf());
        Ok(())
    }
}

/// Append stream handed out by [`MockFilesystem::open_append`].
struct MockAppender {
    files: FileMap,
    failing: PathSet,
    path: PathBuf,
}

impl Write for MockAppender {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        check_failing(&self.failing, &self.path).map_err(into_io)?;
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(self.path.clone())
            .or_default()
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        check_failing(&self.failing, &self.path).map_err(into_io)
    }
}

/// Seekable writer handed out by [`MockFilesystem::create_truncate`].
struct MockFileHandle {
    files: FileMap,
    failing: PathSet,
    path: PathBuf,
    pos: u64,
}

impl Write for MockFileHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        check_failing(&self.failing, &self.path).map_err(into_io)?;
        let mut files = self.files.write().unwrap_or_else(PoisonError::into_inner);
        let data = files.entry(self.path.clone()).or_default();

        let start = usize::try_from(self.pos)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "position overflow"))?;
        let end = start + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        self.pos = end as u64;

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MockFileHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = self
            .files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&self.path)
            .map_or(0, |d| d.len() as u64);

        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };

        match target {
            Some(p) => {
                self.pos = p;
                Ok(p)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of file",
            )),
        }
    }
}

fn into_io(err: FsError) -> io::Error {
    match err {
        FsError::Io(e) => e,
        other => io::Error::other(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    // --- Mock write / append ---

    #[test]
    fn test_mock_write_atomic_overwrites() {
        let fs = MockFilesystem::new();
        let path = PathBuf::from("/tmp/test.txt");

        fs.write_atomic(&path, b"first").expect("write");
        fs.write_atomic(&path, b"second").expect("write");

        assert_eq!(fs.get_file(&path), Some(b"second".to_vec()));
    }

    #[test]
    fn test_mock_append_atomic_appends() {
        let fs = MockFilesystem::new();
        let path = PathBuf::from("/tmp/index");

        fs.append_atomic(&path, b"line1\n").expect("append 1");
        fs.append_atomic(&path, b"line2\n").expect("append 2");

        assert_eq!(fs.get_file(&path), Some(b"line1\nline2\n".to_vec()));
    }

    #[test]
    fn test_mock_create_file_if_absent_keeps_content() {
        let fs = MockFilesystem::new();
        let path = PathBuf::from("/tmp/index");
        fs.add_file(path.clone(), b"keep\n".to_vec());

        fs.create_file_if_absent(&path).expect("create");

        assert_eq!(fs.get_file(&path), Some(b"keep\n".to_vec()));
    }

    #[test]
    fn test_mock_open_append_streams_into_file() {
        let fs = MockFilesystem::new();
        let path = PathBuf::from("/tmp/1.log");

        let mut stream = fs.open_append(&path).expect("open");
        stream.write_all(b"a\n").expect("write");
        stream.write_all(b"b\n").expect("write");

        assert_eq!(fs.get_file(&path), Some(b"a\nb\n".to_vec()));
    }

    #[test]
    fn test_mock_read_file_not_found() {
        let fs = MockFilesystem::new();
        let result = fs.read_file(Path::new("/tmp/nonexistent.txt"));
        assert!(matches!(result, Err(FsError::Io(_))));
    }

    #[test]
    fn test_mock_seekable_handle_overwrites_in_place() {
        let fs = MockFilesystem::new();
        let path = PathBuf::from("/tmp/a.zip");

        let mut handle = fs.create_truncate(&path).expect("create");
        handle.write_all(b"hello world").expect("write");
        handle.seek(SeekFrom::Start(0)).expect("seek");
        handle.write_all(b"J").expect("write");
        let end = handle.seek(SeekFrom::End(0)).expect("seek end");

        assert_eq!(end, 11);
        assert_eq!(fs.get_file(&path), Some(b"Jello world".to_vec()));
    }

    // --- Listing and removal ---

    #[test]
    fn test_mock_list_files_first_level_only_sorted() {
        let fs = MockFilesystem::new();
        let dir = PathBuf::from("/data/log");

        fs.add_file(dir.join("2_b.log"), vec![]);
        fs.add_file(dir.join("1_a.log"), vec![]);
        fs.add_file(dir.join("nested").join("3_c.log"), vec![]);
        fs.add_file(PathBuf::from("/data/other.log"), vec![]);

        let files = fs.list_files(&dir).expect("list");

        assert_eq!(files, vec![dir.join("1_a.log"), dir.join("2_b.log")]);
    }

    #[test]
    fn test_mock_remove_dir_all_removes_subtree() {
        let fs = MockFilesystem::new();
        let dir = PathBuf::from("/data/log");
        fs.create_dir_all(&dir).expect("mkdir");
        fs.add_file(dir.join("1_a.log"), vec![]);
        fs.add_file(PathBuf::from("/data/zip/1_a.zip"), vec![]);

        fs.remove_dir_all(&dir).expect("remove");

        assert!(!fs.exists(&dir));
        assert!(!fs.exists(&dir.join("1_a.log")));
        assert!(fs.exists(Path::new("/data/zip/1_a.zip")));
    }

    // --- Failure injection ---

    #[test]
    fn test_mock_fail_path_blocks_creation() {
        let fs = MockFilesystem::new();
        let dir = PathBuf::from("/data/log");
        fs.fail_path(dir.clone());

        let result = fs.create_file_if_absent(&dir.join("index"));
        assert!(matches!(result, Err(FsError::Io(ref e)) if e.kind() == io::ErrorKind::PermissionDenied));

        fs.clear_failures();
        fs.create_file_if_absent(&dir.join("index")).expect("create");
    }

    #[test]
    fn test_mock_dir_removal_fails_only_once() {
        let fs = MockFilesystem::new();
        let dir = PathBuf::from("/data/log");
        fs.add_file(dir.join("1_a.log"), vec![]);
        fs.fail_dir_removal_once(dir.clone());

        assert!(fs.remove_dir_all(&dir).is_err());
        assert!(fs.exists(&dir.join("1_a.log")));
        fs.remove(&dir.join("1_a.log")).expect("single file removal unaffected");

        fs.remove_dir_all(&dir).expect("second removal");
    }

    #[test]
    fn test_mock_fail_path_breaks_open_stream() {
        let fs = MockFilesystem::new();
        let path = PathBuf::from("/data/log/1.log");
        let mut stream = fs.open_append(&path).expect("open");

        fs.fail_path(path.clone());

        assert!(stream.write_all(b"x\n").is_err());
        assert_eq!(fs.get_file(&path), Some(vec![]));
    }

    // --- Real filesystem ---

    #[test]
    fn test_real_create_file_if_absent_does_not_truncate() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("index");
        std::fs::write(&path, "a\n").expect("seed");

        RealFilesystem.create_file_if_absent(&path).expect("create");

        assert_eq!(std::fs::read_to_string(&path).expect("read"), "a\n");
    }

    #[test]
    fn test_real_list_files_skips_directories() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("2_b.log"), "").expect("write");
        std::fs::write(dir.path().join("1_a.log"), "").expect("write");
        std::fs::create_dir(dir.path().join("sub")).expect("mkdir");

        let files = RealFilesystem.list_files(dir.path()).expect("list");

        assert_eq!(
            files,
            vec![dir.path().join("1_a.log"), dir.path().join("2_b.log")]
        );
    }

    #[test]
    fn test_real_list_files_missing_dir_is_empty() {
        let dir = tempdir().expect("tempdir");
        let files = RealFilesystem
            .list_files(&dir.path().join("missing"))
            .expect("list");
        assert!(files.is_empty());
    }

    #[test]
    fn test_real_remove_dir_all_missing_is_ok() {
        let dir = tempdir().expect("tempdir");
        RealFilesystem
            .remove_dir_all(&dir.path().join("missing"))
            .expect("remove");
    }

    #[test]
    fn test_real_write_atomic_replaces_content() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("index");
        std::fs::write(&path, "old\n").expect("seed");

        RealFilesystem.write_atomic(&path, b"").expect("write");

        assert_eq!(std::fs::read_to_string(&path).expect("read"), "");
        assert!(!dir.path().join("index.tmp").exists());
    }
}
