//! In-memory stream backend for testing.

use crate::backend::StreamBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// An in-memory stream backend.
///
/// This backend stores all data in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral streams that don't need persistence
///
/// # Shared Handles
///
/// Cloning an `InMemoryBackend` yields a second handle onto the *same*
/// buffer. Tests keep one handle and give the other to a durable stream
/// so they can observe the bytes it produces.
///
/// # Example
///
/// ```rust
/// use durastream_storage::{StreamBackend, InMemoryBackend};
///
/// let mut backend = InMemoryBackend::new();
/// let observer = backend.clone();
/// backend.append(b"test data").unwrap();
/// assert_eq!(observer.size().unwrap(), 9);
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    data: Arc<RwLock<Vec<u8>>>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory backend with pre-existing data.
    ///
    /// Useful for testing recovery scenarios.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Returns a copy of all data in the backend.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Replaces the whole buffer.
    ///
    /// Used by tests to corrupt a log in place.
    pub fn replace(&self, data: Vec<u8>) {
        *self.data.write() = data;
    }

    /// Clears all data from the backend.
    pub fn clear(&mut self) {
        self.data.write().clear();
    }
}

impl StreamBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let end = offset.saturating_add(len as u64);

        if offset > size || end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        let start = offset as usize;
        Ok(data[start..start + len].to_vec())
    }

    fn write_at(&mut self, offset: u64, new_data: &[u8]) -> StorageResult<()> {
        if new_data.is_empty() {
            return Ok(());
        }

        let mut data = self.data.write();
        let start = usize::try_from(offset).map_err(|_| offset_too_large(offset))?;
        let end = start
            .checked_add(new_data.len())
            .ok_or_else(|| offset_too_large(offset))?;

        if end > data.len() {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(new_data);
        Ok(())
    }

    fn set_len(&mut self, new_size: u64) -> StorageResult<()> {
        let new_size = usize::try_from(new_size).map_err(|_| offset_too_large(new_size))?;
        self.data.write().resize(new_size, 0);
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn flush(&mut self) -> StorageResult<()> {
        // In-memory backend has no pending writes
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }
}

fn offset_too_large(offset: u64) -> StorageError {
    StorageError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        format!("offset {offset} does not fit in memory"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_new_is_empty() {
        let backend = InMemoryBackend::new();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(backend.data().is_empty());
    }

    #[test]
    fn memory_append_returns_correct_offset() {
        let mut backend = InMemoryBackend::new();

        let offset1 = backend.append(b"hello").unwrap();
        assert_eq!(offset1, 0);

        let offset2 = backend.append(b" world").unwrap();
        assert_eq!(offset2, 5);

        assert_eq!(backend.size().unwrap(), 11);
    }

    #[test]
    fn memory_write_at_overwrites_in_place() {
        let mut backend = InMemoryBackend::with_data(b"hello world".to_vec());
        backend.write_at(0, b"HELLO").unwrap();
        assert_eq!(backend.data(), b"HELLO world");
        assert_eq!(backend.size().unwrap(), 11);
    }

    #[test]
    fn memory_write_past_end_zero_fills() {
        let mut backend = InMemoryBackend::with_data(b"ab".to_vec());
        backend.write_at(4, b"z").unwrap();
        assert_eq!(backend.data(), vec![b'a', b'b', 0, 0, b'z']);
    }

    #[test]
    fn memory_empty_write_past_end_keeps_size() {
        let mut backend = InMemoryBackend::with_data(b"abc".to_vec());
        backend.write_at(10, b"").unwrap();
        assert_eq!(backend.size().unwrap(), 3);
    }

    #[test]
    fn memory_read_at_past_end_fails() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"hello").unwrap();

        let result = backend.read_at(10, 5);
        assert!(matches!(result, Err(StorageError::ReadPastEnd { .. })));

        let result = backend.read_at(3, 10);
        assert!(matches!(result, Err(StorageError::ReadPastEnd { .. })));
    }

    #[test]
    fn memory_empty_read() {
        let backend = InMemoryBackend::with_data(b"hello".to_vec());
        assert!(backend.read_at(5, 0).unwrap().is_empty());
    }

    #[test]
    fn memory_set_len_grows_and_shrinks() {
        let mut backend = InMemoryBackend::with_data(b"hello".to_vec());

        backend.set_len(8).unwrap();
        assert_eq!(backend.data(), b"hello\0\0\0");

        backend.set_len(2).unwrap();
        assert_eq!(backend.data(), b"he");
    }

    #[test]
    fn memory_truncate_to_larger_size_fails() {
        let mut backend = InMemoryBackend::with_data(b"hello".to_vec());
        assert!(backend.truncate(100).is_err());
        backend.truncate(0).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
    }

    #[test]
    fn memory_clones_share_buffer() {
        let mut backend = InMemoryBackend::new();
        let observer = backend.clone();
        backend.append(b"shared").unwrap();
        assert_eq!(observer.data(), b"shared");

        observer.replace(b"swapped".to_vec());
        assert_eq!(backend.read_at(0, 7).unwrap(), b"swapped");
    }

    #[test]
    fn memory_clear() {
        let mut backend = InMemoryBackend::with_data(b"some data".to_vec());
        backend.clear();
        assert_eq!(backend.size().unwrap(), 0);
    }

    #[test]
    fn memory_flush_and_sync_succeed() {
        let mut backend = InMemoryBackend::with_data(b"data".to_vec());
        assert!(backend.flush().is_ok());
        assert!(backend.sync().is_ok());
    }
}
