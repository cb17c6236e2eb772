//! Dump command implementation.

use durastream_core::{BackupRecord, Investigator};
use durastream_storage::FileBackend;
use serde::Serialize;
use std::path::Path;

/// Backup record representation for output.
#[derive(Debug, Serialize)]
pub struct RecordInfo {
    /// Sequence number, starting at 1.
    pub seq: u64,
    /// Record type.
    pub record_type: String,
    /// Timestamp in microseconds since the Unix epoch.
    pub timestamp: i64,
    /// Write offset (write undo only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    /// Bytes written (write undo only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
    /// Target length before the change.
    pub old_length: u64,
    /// Target length the change set (length undo only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_length: Option<u64>,
    /// Size of the saved pre-image (write undo only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preimage_size: Option<usize>,
}

impl RecordInfo {
    fn new(seq: u64, record: &BackupRecord) -> Self {
        let record_type = record.record_type().name().to_string();
        let timestamp = record.timestamp().as_micros();
        match record {
            BackupRecord::WriteUndo {
                offset,
                length,
                original_length,
                original_bytes,
                ..
            } => Self {
                seq,
                record_type,
                timestamp,
                offset: Some(*offset),
                length: Some(*length),
                old_length: *original_length,
                new_length: None,
                preimage_size: Some(original_bytes.len()),
            },
            BackupRecord::LengthUndo {
                old_length,
                new_length,
                ..
            } => Self {
                seq,
                record_type,
                timestamp,
                offset: None,
                length: None,
                old_length: *old_length,
                new_length: Some(*new_length),
                preimage_size: None,
            },
        }
    }
}

/// Runs the dump command.
pub fn run(path: &Path, limit: Option<usize>, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let records = read_records(path, limit)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        _ => {
            print_text_output(&records);
        }
    }

    Ok(())
}

/// Reads up to `limit` records from the log at `path`.
pub fn read_records(path: &Path, limit: Option<usize>) -> Result<Vec<RecordInfo>, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err("Backup log not found".into());
    }

    let backend = FileBackend::open_read_only(path)?;
    let records = Investigator::new().tolerate_torn_tail(true).records(&backend)?;

    Ok(records
        .iter()
        .zip(1u64..)
        .take(limit.unwrap_or(usize::MAX))
        .map(|(record, seq)| RecordInfo::new(seq, record))
        .collect())
}

fn print_text_output(records: &[RecordInfo]) {
    println!("Backup Log Records");
    println!("==================");
    println!();

    for r in records {
        match (r.offset, r.length, r.new_length) {
            (Some(offset), Some(length), _) => println!(
                "#{:<5} {:<6} ts:{} offset={} length={} old_length={} preimage={}",
                r.seq,
                r.record_type,
                r.timestamp,
                offset,
                length,
                r.old_length,
                r.preimage_size.unwrap_or(0)
            ),
            (_, _, Some(new_length)) => println!(
                "#{:<5} {:<6} ts:{} {} -> {}",
                r.seq, r.record_type, r.timestamp, r.old_length, new_length
            ),
            _ => println!("#{:<5} {:<6} ts:{}", r.seq, r.record_type, r.timestamp),
        }
    }

    println!();
    println!("Total: {} records", records.len());
}
