//! Backup log initialization and appends.

use crate::error::{CoreError, CoreResult};
use crate::log::reader::LogReader;
use crate::log::record::{BackupRecord, HEADER_SIZE};
use crate::types::Timestamp;
use durastream_storage::StreamBackend;
use tracing::{debug, warn};

/// Writes the log header for `target` into an empty `backup`.
///
/// Returns the target length that was recorded.
///
/// # Errors
///
/// Returns an invalid argument error if `backup` is not empty, or an I/O
/// error if either stream fails.
pub fn initialize<T, B>(target: &T, backup: &mut B) -> CoreResult<u64>
where
    T: StreamBackend + ?Sized,
    B: StreamBackend + ?Sized,
{
    let existing = backup.size()?;
    if existing != 0 {
        return Err(CoreError::invalid_argument(format!(
            "backup log must be empty to initialize, found {existing} bytes"
        )));
    }

    let length = target.size()?;
    write_header(backup, length)?;
    Ok(length)
}

fn write_header<B: StreamBackend + ?Sized>(backup: &mut B, length: u64) -> CoreResult<()> {
    let raw = i64::try_from(length).map_err(|_| {
        CoreError::invalid_argument(format!("target length {length} exceeds i64::MAX"))
    })?;
    backup.write_at(0, &raw.to_le_bytes())?;
    Ok(())
}

/// Owns a backup log and appends undo records to it.
///
/// The writer tracks how many records are pending (written since the last
/// reset) and hands out timestamps that never go backwards.
pub struct LogWriter<B: StreamBackend> {
    /// Storage backend for the log.
    backend: B,
    /// Records appended since the last reset.
    pending: u64,
    /// Timestamp of the newest record.
    last_timestamp: Timestamp,
    /// Whether to sync after each append.
    sync_on_append: bool,
}

impl<B: StreamBackend> LogWriter<B> {
    /// Initializes an empty log for `target` and wraps it.
    ///
    /// # Errors
    ///
    /// See [`initialize`].
    pub fn create<T>(target: &T, mut backend: B, sync_on_append: bool) -> CoreResult<Self>
    where
        T: StreamBackend + ?Sized,
    {
        let length = initialize(target, &mut backend)?;
        if sync_on_append {
            backend.sync()?;
        }
        debug!(length, "initialized backup log");
        Ok(Self {
            backend,
            pending: 0,
            last_timestamp: Timestamp::ZERO,
            sync_on_append,
        })
    }

    /// Wraps an existing, initialized log.
    ///
    /// Every record already in the log counts as pending. A torn final
    /// record is cut off when `tolerate_torn_tail` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the log is corrupt or cannot be read.
    pub fn open(mut backend: B, sync_on_append: bool, tolerate_torn_tail: bool) -> CoreResult<Self> {
        let (pending, last_timestamp, torn_at) = {
            let mut reader = LogReader::new(&backend)?.tolerate_torn_tail(tolerate_torn_tail);
            reader.read_header_length()?;
            let mut pending = 0u64;
            let mut last_timestamp = Timestamp::ZERO;
            while let Some(record) = reader.next_record()? {
                pending += 1;
                last_timestamp = last_timestamp.max(record.timestamp());
            }
            (pending, last_timestamp, reader.torn_at())
        };

        if let Some(offset) = torn_at {
            warn!(offset, "discarding torn record at end of backup log");
            backend.truncate(offset)?;
            backend.sync()?;
        }

        debug!(pending, "opened existing backup log");
        Ok(Self {
            backend,
            pending,
            last_timestamp,
            sync_on_append,
        })
    }

    /// Returns a timestamp for the next record.
    #[must_use]
    pub fn next_timestamp(&self) -> Timestamp {
        Timestamp::now_after(self.last_timestamp)
    }

    /// Appends records as a single write.
    ///
    /// # Errors
    ///
    /// Returns an error if a record cannot be encoded or the log write fails.
    pub fn append(&mut self, records: &[BackupRecord]) -> CoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut data = Vec::with_capacity(records.iter().map(BackupRecord::encoded_len).sum());
        for record in records {
            if record.timestamp() < self.last_timestamp {
                return Err(CoreError::invalid_argument(format!(
                    "record {} is older than the newest logged record {}",
                    record.timestamp(),
                    self.last_timestamp
                )));
            }
            data.extend(record.encode()?);
        }

        let offset = self.backend.size()?;
        let written = self.backend.write_at(offset, &data).and_then(|()| {
            if self.sync_on_append {
                self.backend.sync()
            } else {
                Ok(())
            }
        });
        if let Err(e) = written {
            // A partial record must not sit in front of later appends.
            if let Err(cut) = self.backend.truncate(offset) {
                warn!(offset, error = %cut, "could not discard partial backup record");
            }
            return Err(e.into());
        }

        self.pending += records.len() as u64;
        if let Some(last) = records.last() {
            self.last_timestamp = last.timestamp();
        }
        debug!(offset, count = records.len(), pending = self.pending, "appended backup records");
        Ok(())
    }

    /// Returns the number of pending records.
    #[must_use]
    pub fn pending(&self) -> u64 {
        self.pending
    }

    /// Reads all pending records, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the log is corrupt or cannot be read.
    pub fn read_pending(&self) -> CoreResult<Vec<BackupRecord>> {
        let mut reader = LogReader::new(&self.backend)?;
        reader.read_header_length()?;
        let mut records = Vec::new();
        while let Some(record) = reader.next_record()? {
            records.push(record);
        }
        Ok(records)
    }

    /// Drops all records and restarts the log at `target_length`.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be truncated or rewritten.
    pub fn reset(&mut self, target_length: u64) -> CoreResult<()> {
        self.backend.truncate(HEADER_SIZE)?;
        write_header(&mut self.backend, target_length)?;
        if self.sync_on_append {
            self.backend.sync()?;
        }
        self.pending = 0;
        Ok(())
    }

    /// Flushes the log.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    pub fn flush(&mut self) -> CoreResult<()> {
        self.backend.flush()?;
        Ok(())
    }

    /// Returns the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Consumes the writer, returning the backend.
    pub fn into_inner(self) -> B {
        self.backend
    }
}

impl<B: StreamBackend> std::fmt::Debug for LogWriter<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogWriter")
            .field("pending", &self.pending)
            .field("last_timestamp", &self.last_timestamp)
            .field("sync_on_append", &self.sync_on_append)
            .finish_non_exhaustive()
    }
}
