//! On-disk fixtures for durable stream tests.
//!
//! A [`StreamDir`] owns a temporary directory holding a target file and its
//! backup log. Streams opened from it use real files, so a test can drop a
//! stream mid-transaction and reopen it the way a restarted process would.

use durastream_core::{CoreResult, DurableStream, StreamConfig};
use durastream_storage::FileBackend;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A file-backed durable stream.
pub type FileStream = DurableStream<FileBackend, FileBackend>;

/// A temporary directory with a target file and a backup log.
pub struct StreamDir {
    target_path: PathBuf,
    log_path: PathBuf,
    _temp_dir: TempDir,
}

impl StreamDir {
    /// Creates an empty directory.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        Self {
            target_path: temp_dir.path().join("target.dat"),
            log_path: temp_dir.path().join("target.dat.undo"),
            _temp_dir: temp_dir,
        }
    }

    /// Creates a directory whose target file starts with `contents`.
    pub fn with_target(contents: &[u8]) -> Self {
        let dir = Self::new();
        std::fs::write(&dir.target_path, contents).expect("Failed to write target file");
        dir
    }

    /// Returns the target file path.
    pub fn target_path(&self) -> &Path {
        &self.target_path
    }

    /// Returns the backup log path.
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Creates a stream with a fresh backup log.
    ///
    /// # Errors
    ///
    /// Returns an error if the log already has content.
    pub fn create(&self, config: StreamConfig) -> CoreResult<FileStream> {
        let (target, log) = self.open_files();
        DurableStream::create(target, log, config)
    }

    /// Opens a stream over the existing backup log.
    ///
    /// # Errors
    ///
    /// Returns an error if the log is corrupt.
    pub fn open(&self, config: StreamConfig) -> CoreResult<FileStream> {
        let (target, log) = self.open_files();
        DurableStream::open(target, log, config)
    }

    /// Reads the target file.
    pub fn target_contents(&self) -> Vec<u8> {
        std::fs::read(&self.target_path).expect("Failed to read target file")
    }

    /// Reads the backup log.
    pub fn log_contents(&self) -> Vec<u8> {
        std::fs::read(&self.log_path).expect("Failed to read backup log")
    }

    /// Overwrites the backup log.
    pub fn set_log_contents(&self, contents: &[u8]) {
        std::fs::write(&self.log_path, contents).expect("Failed to write backup log");
    }

    /// Returns the backup log size in bytes.
    pub fn log_size(&self) -> u64 {
        std::fs::metadata(&self.log_path)
            .expect("Failed to stat backup log")
            .len()
    }

    fn open_files(&self) -> (FileBackend, FileBackend) {
        let target = FileBackend::open(&self.target_path).expect("Failed to open target file");
        let log = FileBackend::open(&self.log_path).expect("Failed to open backup log");
        (target, log)
    }
}

impl Default for StreamDir {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a test against a file-backed stream over `contents`.
///
/// The stream is created with `config`; the directory is removed afterwards.
///
/// # Example
///
/// ```rust,ignore
/// use durastream_testkit::with_file_stream;
///
/// with_file_stream(b"hello", StreamConfig::default(), |stream, dir| {
///     stream.write(b"J").unwrap();
///     stream.rollback().unwrap();
///     assert_eq!(dir.target_contents(), b"hello");
/// });
/// ```
pub fn with_file_stream<F, R>(contents: &[u8], config: StreamConfig, f: F) -> R
where
    F: FnOnce(FileStream, &StreamDir) -> R,
{
    let dir = StreamDir::with_target(contents);
    let stream = dir.create(config).expect("Failed to create durable stream");
    f(stream, &dir)
}
