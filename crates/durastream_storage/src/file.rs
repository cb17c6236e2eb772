//! File-based stream backend for persistent storage.

use crate::backend::StreamBackend;
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A file-based stream backend.
///
/// This backend provides persistent storage using OS file APIs.
/// Data survives process restarts.
///
/// # Exclusive Ownership
///
/// The file is locked exclusively (advisory lock via `fs2`) for as long as
/// the backend lives. A second `open` of the same path fails with
/// [`StorageError::Locked`].
///
/// # Durability
///
/// - `flush()` calls `File::flush()` to push data to the OS
/// - `sync()` calls `File::sync_all()` to ensure data is on disk
///
/// # Example
///
/// ```no_run
/// use durastream_storage::{StreamBackend, FileBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("data.bin")).unwrap();
/// backend.write_at(0, b"persistent data").unwrap();
/// backend.sync().unwrap();  // Ensure data is durable
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: Option<PathBuf>,
    file: RwLock<File>,
    size: RwLock<u64>,
}

impl FileBackend {
    /// Opens or creates a file backend at the given path.
    ///
    /// If the file exists, its contents are kept.
    /// If it doesn't exist, a new file is created.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created, or if
    /// another owner holds its lock.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked {
                path: path.display().to_string(),
            });
        }

        let size = file.metadata()?.len();

        Ok(Self {
            path: Some(path.to_path_buf()),
            file: RwLock::new(file),
            size: RwLock::new(size),
        })
    }

    /// Opens an existing file for reading only.
    ///
    /// No lock is taken, so this succeeds while another backend owns the
    /// file. Writes and length changes fail with an I/O error. The size is
    /// read once, at open.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or cannot be read.
    pub fn open_read_only(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path: Some(path.to_path_buf()),
            file: RwLock::new(file),
            size: RwLock::new(size),
        })
    }

    /// Opens or creates a file backend, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or file cannot be opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Creates an anonymous temporary file backend.
    ///
    /// The file is removed by the OS once the backend is dropped. This is
    /// the default home for a backup log when the caller supplies none.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary file cannot be created.
    pub fn temporary() -> StorageResult<Self> {
        let file = tempfile::tempfile()?;
        Ok(Self {
            path: None,
            file: RwLock::new(file),
            size: RwLock::new(0),
        })
    }

    /// Returns the path to the underlying file, `None` for temporary files.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl StreamBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let size = *self.size.read();
        let end = offset.saturating_add(len as u64);

        if offset > size || end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        if len == 0 {
            return Ok(Vec::new());
        }

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;

        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;

        Ok(buffer)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> StorageResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let mut file = self.file.write();
        let mut size = self.size.write();

        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        *size = (*size).max(offset + data.len() as u64);

        Ok(())
    }

    fn set_len(&mut self, new_size: u64) -> StorageResult<()> {
        let file = self.file.write();
        let mut size = self.size.write();

        file.set_len(new_size)?;
        *size = new_size;

        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(*self.size.read())
    }

    fn flush(&mut self) -> StorageResult<()> {
        let mut file = self.file.write();
        file.flush()?;
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        let file = self.file.write();
        file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;
    use proptest::prelude::*;
    use tempfile::tempdir;

    #[test]
    fn file_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bin");

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(path.exists());
    }

    #[test]
    fn file_append_and_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bin");

        let mut backend = FileBackend::open(&path).unwrap();

        let offset1 = backend.append(b"hello").unwrap();
        assert_eq!(offset1, 0);

        let offset2 = backend.append(b" world").unwrap();
        assert_eq!(offset2, 5);

        assert_eq!(backend.size().unwrap(), 11);
        assert_eq!(backend.read_at(0, 11).unwrap(), b"hello world");
    }

    #[test]
    fn file_overwrite_keeps_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bin");

        let mut backend = FileBackend::open(&path).unwrap();
        backend.write_at(0, b"hello world").unwrap();
        backend.write_at(6, b"WORLD").unwrap();

        assert_eq!(backend.size().unwrap(), 11);
        assert_eq!(backend.read_at(0, 11).unwrap(), b"hello WORLD");
    }

    #[test]
    fn file_read_past_end_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bin");

        let mut backend = FileBackend::open(&path).unwrap();
        backend.append(b"hello").unwrap();

        let result = backend.read_at(10, 5);
        assert!(matches!(result, Err(StorageError::ReadPastEnd { .. })));
    }

    #[test]
    fn file_set_len_grows_and_shrinks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bin");

        let mut backend = FileBackend::open(&path).unwrap();
        backend.append(b"hello").unwrap();

        backend.set_len(8).unwrap();
        assert_eq!(backend.size().unwrap(), 8);
        assert_eq!(backend.read_at(5, 3).unwrap(), vec![0, 0, 0]);

        backend.set_len(2).unwrap();
        assert_eq!(backend.read_at(0, 2).unwrap(), b"he");
        assert!(backend.read_at(0, 3).is_err());
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bin");

        {
            let mut backend = FileBackend::open(&path).unwrap();
            backend.append(b"persistent data").unwrap();
            backend.sync().unwrap();
        }

        {
            let backend = FileBackend::open(&path).unwrap();
            assert_eq!(backend.size().unwrap(), 15);
            assert_eq!(backend.read_at(0, 15).unwrap(), b"persistent data");
        }
    }

    #[test]
    fn file_second_open_is_locked() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bin");

        let _first = FileBackend::open(&path).unwrap();
        let second = FileBackend::open(&path);
        assert!(matches!(second, Err(StorageError::Locked { .. })));
    }

    #[test]
    fn file_lock_released_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bin");

        drop(FileBackend::open(&path).unwrap());
        assert!(FileBackend::open(&path).is_ok());
    }

    #[test]
    fn file_temporary_has_no_path() {
        let mut backend = FileBackend::temporary().unwrap();
        assert!(backend.path().is_none());
        backend.append(b"scratch").unwrap();
        assert_eq!(backend.read_at(0, 7).unwrap(), b"scratch");
    }

    #[test]
    fn file_create_with_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("path").join("test.bin");

        let backend = FileBackend::open_with_create_dirs(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
        assert_eq!(backend.path(), Some(path.as_path()));
    }

    #[test]
    fn file_read_only_ignores_owner_lock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bin");

        let mut owner = FileBackend::open(&path).unwrap();
        owner.write_at(0, b"owned").unwrap();
        owner.flush().unwrap();

        let mut reader = FileBackend::open_read_only(&path).unwrap();
        assert_eq!(reader.read_at(0, 5).unwrap(), b"owned");
        assert!(reader.write_at(0, b"x").is_err());
        assert!(reader.set_len(0).is_err());
        assert_eq!(owner.read_at(0, 5).unwrap(), b"owned");
    }

    #[test]
    fn file_read_only_does_not_create() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.bin");

        assert!(matches!(
            FileBackend::open_read_only(&path),
            Err(StorageError::Io(_))
        ));
        assert!(!path.exists());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Write(u64, Vec<u8>),
        SetLen(u64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u64..64, prop::collection::vec(any::<u8>(), 0..16))
                .prop_map(|(offset, data)| Op::Write(offset, data)),
            (0u64..80).prop_map(Op::SetLen),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn file_matches_memory_backend(ops in prop::collection::vec(op(), 0..24)) {
            let mut file = FileBackend::temporary().unwrap();
            let mut memory = InMemoryBackend::new();

            for op in &ops {
                match op {
                    Op::Write(offset, data) => {
                        file.write_at(*offset, data).unwrap();
                        memory.write_at(*offset, data).unwrap();
                    }
                    Op::SetLen(len) => {
                        file.set_len(*len).unwrap();
                        memory.set_len(*len).unwrap();
                    }
                }
                prop_assert_eq!(file.size().unwrap(), memory.size().unwrap());
            }

            let size = memory.size().unwrap() as usize;
            prop_assert_eq!(file.read_at(0, size).unwrap(), memory.read_at(0, size).unwrap());
        }
    }
}
