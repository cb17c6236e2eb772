//! Forward reader over a backup log.

use crate::error::{CoreError, CoreResult};
use crate::log::record::{
    BackupRecord, RecordType, HEADER_SIZE, LENGTH_UNDO_SIZE, TAG_SIZE, WRITE_UNDO_FIXED_SIZE,
};
use durastream_storage::StreamBackend;

/// Reads a backup log front to back.
///
/// The reader keeps its own position and never writes to the log.
///
/// # Error Handling
///
/// - A negative header length or field is data corruption
/// - A record whose fixed part runs past the end of the log is data
///   corruption, unless torn tails are tolerated, in which case it ends the
///   log
/// - A pre-image that runs past the end of the log is always data
///   corruption: its length comes from the record's own fields, so a
///   damaged field could otherwise hide every record after it
/// - An unknown discriminator is unrecoverable: the log was written by an
///   incompatible version
pub struct LogReader<'a, B: StreamBackend + ?Sized> {
    backend: &'a B,
    size: u64,
    position: u64,
    tolerate_torn_tail: bool,
    torn_at: Option<u64>,
}

impl<'a, B: StreamBackend + ?Sized> LogReader<'a, B> {
    /// Creates a reader positioned at the start of the log.
    ///
    /// # Errors
    ///
    /// Returns an error if the log size cannot be determined.
    pub fn new(backend: &'a B) -> CoreResult<Self> {
        Self::at(backend, 0)
    }

    /// Creates a reader positioned at `position`.
    ///
    /// # Errors
    ///
    /// Returns an error if the log size cannot be determined.
    pub fn at(backend: &'a B, position: u64) -> CoreResult<Self> {
        let size = backend.size()?;
        Ok(Self {
            backend,
            size,
            position,
            tolerate_torn_tail: false,
            torn_at: None,
        })
    }

    /// Treats a truncated final record as the end of the log.
    #[must_use]
    pub fn tolerate_torn_tail(mut self, value: bool) -> Self {
        self.tolerate_torn_tail = value;
        self
    }

    /// Returns the current read position.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Returns where a tolerated torn record starts, if one was found.
    #[must_use]
    pub fn torn_at(&self) -> Option<u64> {
        self.torn_at
    }

    /// Reads the header: the target length when the log was initialized.
    ///
    /// # Errors
    ///
    /// - Invalid argument if the reader is not at position 0
    /// - Data corruption if the log is shorter than the header or the
    ///   stored length is negative
    pub fn read_header_length(&mut self) -> CoreResult<u64> {
        if self.position != 0 {
            return Err(CoreError::invalid_argument(format!(
                "header must be read at position 0, reader is at {}",
                self.position
            )));
        }
        if self.size < HEADER_SIZE {
            return Err(CoreError::data_corruption(format!(
                "log is {} bytes, shorter than its {HEADER_SIZE}-byte header",
                self.size
            )));
        }

        let bytes = self.backend.read_at(0, HEADER_SIZE as usize)?;
        let raw = i64::from_le_bytes(
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| CoreError::data_corruption("short header read"))?,
        );
        let length = u64::try_from(raw)
            .map_err(|_| CoreError::data_corruption(format!("negative header length {raw}")))?;

        self.position = HEADER_SIZE;
        Ok(length)
    }

    /// Reads the next record.
    ///
    /// Returns `Ok(None)` at the end of the log.
    ///
    /// # Errors
    ///
    /// See the type-level documentation.
    pub fn next_record(&mut self) -> CoreResult<Option<BackupRecord>> {
        if self.position < HEADER_SIZE {
            return Err(CoreError::invalid_operation(
                "record read before the log header",
            ));
        }
        if self.torn_at.is_some() || self.position >= self.size {
            return Ok(None);
        }

        let record_start = self.position;
        let tag = self.backend.read_at(record_start, TAG_SIZE)?[0];
        let record_type = RecordType::from_byte(tag).ok_or_else(|| {
            CoreError::unrecoverable(format!(
                "unknown record discriminator {tag} at offset {record_start}"
            ))
        })?;

        let fixed = match record_type {
            RecordType::WriteUndo => WRITE_UNDO_FIXED_SIZE,
            RecordType::LengthUndo => LENGTH_UNDO_SIZE,
        };
        let body_start = record_start + TAG_SIZE as u64;
        if !self.available(body_start, fixed as u64)? {
            return Ok(None);
        }

        let body = self.backend.read_at(body_start, fixed)?;
        let (mut record, preimage_len) = BackupRecord::decode_fixed(record_type, &body)?;

        let preimage_start = body_start + fixed as u64;
        if preimage_start.saturating_add(preimage_len) > self.size {
            return Err(CoreError::data_corruption(format!(
                "record at offset {record_start} declares a {preimage_len}-byte pre-image, \
                 log ends {} bytes after its fixed part",
                self.size - preimage_start
            )));
        }
        if let BackupRecord::WriteUndo { original_bytes, .. } = &mut record {
            let len = usize::try_from(preimage_len)
                .map_err(|_| CoreError::data_corruption("pre-image too large"))?;
            *original_bytes = self.backend.read_at(preimage_start, len)?;
        }

        self.position = preimage_start + preimage_len;
        Ok(Some(record))
    }

    /// Reads the next record and checks it against the tracked target length.
    ///
    /// # Errors
    ///
    /// Fails like [`next_record`](Self::next_record), and with data
    /// corruption if the record breaks the length chain.
    pub fn next_validated(&mut self, tracked_length: u64) -> CoreResult<Option<BackupRecord>> {
        match self.next_record()? {
            Some(record) => {
                record.validate_against(tracked_length)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Returns true if `len` bytes starting at `start` are in the log.
    ///
    /// A shortfall either ends the log (tolerated torn tail) or is an error.
    /// Only fixed-size parts go through here.
    fn available(&mut self, start: u64, len: u64) -> CoreResult<bool> {
        if start.saturating_add(len) <= self.size {
            return Ok(true);
        }
        if self.tolerate_torn_tail {
            self.torn_at = Some(self.position);
            return Ok(false);
        }
        Err(CoreError::data_corruption(format!(
            "record at offset {} is truncated: needs {} bytes past {}, log ends at {}",
            self.position, len, start, self.size
        )))
    }
}

impl<B: StreamBackend + ?Sized> Iterator for LogReader<'_, B> {
    type Item = CoreResult<BackupRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position == 0 {
            if let Err(e) = self.read_header_length() {
                self.position = self.size.max(HEADER_SIZE);
                return Some(Err(e));
            }
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => {
                // Stop after the first error
                self.position = self.size.max(HEADER_SIZE);
                self.torn_at = Some(self.position);
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timestamp;
    use durastream_storage::InMemoryBackend;

    fn log_with(header: i64, records: &[BackupRecord]) -> InMemoryBackend {
        let mut data = header.to_le_bytes().to_vec();
        for record in records {
            data.extend(record.encode().unwrap());
        }
        InMemoryBackend::with_data(data)
    }

    fn length_undo(ts: i64, old_length: u64, new_length: u64) -> BackupRecord {
        BackupRecord::LengthUndo {
            timestamp: Timestamp::from_micros(ts),
            old_length,
            new_length,
        }
    }

    #[test]
    fn header_only_log_has_no_records() {
        let log = log_with(42, &[]);
        let mut reader = LogReader::new(&log).unwrap();
        assert_eq!(reader.read_header_length().unwrap(), 42);
        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn header_must_be_read_at_zero() {
        let log = log_with(42, &[]);
        let mut reader = LogReader::at(&log, 4).unwrap();
        assert!(matches!(
            reader.read_header_length(),
            Err(CoreError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn negative_header_is_corruption() {
        let log = log_with(-1, &[]);
        let mut reader = LogReader::new(&log).unwrap();
        assert!(matches!(
            reader.read_header_length(),
            Err(CoreError::DataCorruption { .. })
        ));
    }

    #[test]
    fn short_header_is_corruption() {
        let log = InMemoryBackend::with_data(vec![1, 2, 3]);
        let mut reader = LogReader::new(&log).unwrap();
        assert!(reader.read_header_length().unwrap_err().is_corruption());
    }

    #[test]
    fn reads_records_in_order() {
        let write = BackupRecord::WriteUndo {
            timestamp: Timestamp::from_micros(2),
            offset: 1,
            length: 2,
            original_length: 3,
            original_bytes: b"bc".to_vec(),
        };
        let log = log_with(3, &[length_undo(1, 3, 3), write.clone()]);
        let mut reader = LogReader::new(&log).unwrap();
        reader.read_header_length().unwrap();

        assert_eq!(reader.next_record().unwrap(), Some(length_undo(1, 3, 3)));
        assert_eq!(reader.next_record().unwrap(), Some(write));
        assert_eq!(reader.next_record().unwrap(), None);
        assert_eq!(reader.position(), log.size().unwrap());
    }

    #[test]
    fn unknown_discriminator_is_unrecoverable() {
        let mut data = 0i64.to_le_bytes().to_vec();
        data.push(0x7F);
        data.extend_from_slice(&[0u8; 24]);
        let log = InMemoryBackend::with_data(data);

        let mut reader = LogReader::new(&log).unwrap();
        reader.read_header_length().unwrap();
        assert!(matches!(
            reader.next_record(),
            Err(CoreError::Unrecoverable { .. })
        ));
    }

    #[test]
    fn truncated_record_is_corruption_by_default() {
        let log = log_with(0, &[length_undo(1, 0, 10)]);
        let mut data = log.data();
        data.truncate(data.len() - 3);
        log.replace(data);

        let mut reader = LogReader::new(&log).unwrap();
        reader.read_header_length().unwrap();
        assert!(reader.next_record().unwrap_err().is_corruption());
    }

    #[test]
    fn truncated_record_ends_log_when_tolerated() {
        let log = log_with(0, &[length_undo(1, 0, 10), length_undo(2, 10, 4)]);
        let mut data = log.data();
        data.truncate(data.len() - 3);
        log.replace(data);

        let mut reader = LogReader::new(&log).unwrap().tolerate_torn_tail(true);
        reader.read_header_length().unwrap();
        assert!(reader.next_record().unwrap().is_some());
        assert!(reader.next_record().unwrap().is_none());
        assert_eq!(reader.torn_at(), Some(HEADER_SIZE + 25));
    }

    #[test]
    fn truncated_preimage_is_detected() {
        let write = BackupRecord::WriteUndo {
            timestamp: Timestamp::from_micros(2),
            offset: 0,
            length: 4,
            original_length: 4,
            original_bytes: b"abcd".to_vec(),
        };
        let log = log_with(4, &[write]);
        let mut data = log.data();
        data.pop();
        log.replace(data);

        let mut reader = LogReader::new(&log).unwrap();
        reader.read_header_length().unwrap();
        assert!(reader.next_record().unwrap_err().is_corruption());
    }

    fn raw_write_undo(offset: i64, length: i64, original_length: i64) -> Vec<u8> {
        let mut bytes = vec![RecordType::WriteUndo.as_byte()];
        for field in [1i64, offset, length, original_length] {
            bytes.extend_from_slice(&field.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn truncated_preimage_is_corruption_even_when_tolerated() {
        let log = log_with(4, &[]);
        let mut data = log.data();
        data.extend(raw_write_undo(0, 4, 4));
        data.extend_from_slice(b"ab");
        log.replace(data);

        let mut reader = LogReader::new(&log).unwrap().tolerate_torn_tail(true);
        reader.read_header_length().unwrap();
        assert!(reader.next_record().unwrap_err().is_corruption());
        assert_eq!(reader.torn_at(), None);
    }

    #[test]
    fn oversized_preimage_does_not_hide_later_records() {
        let log = log_with(1_000_000, &[]);
        let mut data = log.data();
        data.extend(raw_write_undo(0, 1_000_000, 1_000_000));
        data.extend(length_undo(2, 1_000_000, 1).encode().unwrap());
        log.replace(data);

        let mut reader = LogReader::new(&log).unwrap().tolerate_torn_tail(true);
        reader.read_header_length().unwrap();
        assert!(matches!(
            reader.next_record(),
            Err(CoreError::DataCorruption { .. })
        ));
    }

    #[test]
    fn next_validated_checks_length_chain() {
        let log = log_with(0, &[length_undo(1, 5, 20)]);
        let mut reader = LogReader::new(&log).unwrap();
        reader.read_header_length().unwrap();
        assert!(matches!(
            reader.next_validated(10),
            Err(CoreError::DataCorruption { .. })
        ));
    }

    #[test]
    fn iterator_reads_header_then_records() {
        let log = log_with(0, &[length_undo(1, 0, 10), length_undo(2, 10, 20)]);
        let records: Vec<_> = LogReader::new(&log)
            .unwrap()
            .collect::<CoreResult<_>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], length_undo(2, 10, 20));
    }

    #[test]
    fn iterator_stops_after_error() {
        let log = log_with(-5, &[length_undo(1, 0, 10)]);
        let mut reader = LogReader::new(&log).unwrap();
        assert!(reader.next().unwrap().is_err());
        assert!(reader.next().is_none());
    }
}
