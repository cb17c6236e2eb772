//! Read-only investigation of a backup log.
//!
//! The investigator walks a log from its header, replays the length chain
//! the records describe and checks the log's ordering rules. It never
//! touches the target stream, so it is safe to run on the log of a crashed
//! process before deciding whether to roll back or commit.
//!
//! Record numbers in errors start at 1; record 0 is the header.

use crate::error::{CoreError, CoreResult};
use crate::log::{BackupRecord, LogReader, RecordType};
use crate::types::Timestamp;
use durastream_storage::StreamBackend;
use serde::Serialize;

/// Summary of a backup log that passed investigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogReport {
    /// Number of records after the header.
    pub record_count: u64,
    /// Target length stored in the header.
    pub initial_length: u64,
    /// Target length after replaying every length-undo record.
    pub final_length: u64,
    /// Number of write-undo records.
    pub write_records: u64,
    /// Number of length-undo records.
    pub length_records: u64,
    /// Timestamp of the first record.
    pub first_timestamp: Option<Timestamp>,
    /// Timestamp of the last record.
    pub last_timestamp: Option<Timestamp>,
}

/// Validates backup logs.
#[derive(Debug, Clone, Default)]
pub struct Investigator {
    tolerate_torn_tail: bool,
}

impl Investigator {
    /// Creates an investigator that treats a torn final record as corruption.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Treats a truncated final record as the end of the log.
    #[must_use]
    pub fn tolerate_torn_tail(mut self, value: bool) -> Self {
        self.tolerate_torn_tail = value;
        self
    }

    /// Walks the whole log and returns its summary.
    ///
    /// # Errors
    ///
    /// - [`CoreError::LogCorruption`] naming the failing record for a bad
    ///   header, a truncated or malformed record, a timestamp older than the
    ///   record before it, or a broken length chain
    /// - [`CoreError::Unrecoverable`] for an unknown record discriminator,
    ///   which means the log was written by an incompatible version
    pub fn run<B: StreamBackend + ?Sized>(&self, backup: &B) -> CoreResult<LogReport> {
        let mut report = None;
        self.walk(backup, |_, _| {}, &mut report)?;
        report.ok_or_else(|| CoreError::unrecoverable("investigation produced no report"))
    }

    /// Walks the whole log and returns its records, oldest first.
    ///
    /// # Errors
    ///
    /// Fails like [`run`](Self::run).
    pub fn records<B: StreamBackend + ?Sized>(&self, backup: &B) -> CoreResult<Vec<BackupRecord>> {
        let mut records = Vec::new();
        self.walk(backup, |_, record| records.push(record.clone()), &mut None)?;
        Ok(records)
    }

    fn walk<B, F>(&self, backup: &B, mut visit: F, report: &mut Option<LogReport>) -> CoreResult<()>
    where
        B: StreamBackend + ?Sized,
        F: FnMut(u64, &BackupRecord),
    {
        let mut reader = LogReader::new(backup)
            .map_err(|e| wrap(0, e))?
            .tolerate_torn_tail(self.tolerate_torn_tail);
        let initial_length = reader.read_header_length().map_err(|e| wrap(0, e))?;

        let mut summary = LogReport {
            record_count: 0,
            initial_length,
            final_length: initial_length,
            write_records: 0,
            length_records: 0,
            first_timestamp: None,
            last_timestamp: None,
        };

        loop {
            let seq = summary.record_count + 1;
            let record = match reader.next_validated(summary.final_length) {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(e) => return Err(wrap(seq, e)),
            };

            if let Some(previous) = summary.last_timestamp {
                if record.timestamp() < previous {
                    return Err(wrap(
                        seq,
                        CoreError::data_corruption(format!(
                            "timestamp {} precedes previous record's {previous}",
                            record.timestamp()
                        )),
                    ));
                }
            }

            match record.record_type() {
                RecordType::WriteUndo => summary.write_records += 1,
                RecordType::LengthUndo => summary.length_records += 1,
            }
            summary.final_length = record.next_tracked_length(summary.final_length);
            summary.first_timestamp.get_or_insert(record.timestamp());
            summary.last_timestamp = Some(record.timestamp());
            summary.record_count = seq;
            visit(seq, &record);
        }

        *report = Some(summary);
        Ok(())
    }
}

/// Runs a default [`Investigator`] over `backup`.
///
/// # Errors
///
/// See [`Investigator::run`].
pub fn investigate<B: StreamBackend + ?Sized>(backup: &B) -> CoreResult<LogReport> {
    Investigator::new().run(backup)
}

fn wrap(record: u64, err: CoreError) -> CoreError {
    match err {
        CoreError::Unrecoverable { .. } => err,
        other => CoreError::log_corruption(record, other),
    }
}
