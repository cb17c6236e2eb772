//! Inspect command implementation.

use durastream_core::{Investigator, LogReport};
use durastream_storage::{FileBackend, StreamBackend};
use serde::Serialize;
use std::path::Path;

/// Backup log inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Log path.
    pub path: String,
    /// Log file size in bytes.
    pub log_size: u64,
    /// Investigator summary.
    #[serde(flatten)]
    pub report: LogReport,
}

/// Runs the inspect command.
pub fn run(path: &Path, tolerate_torn_tail: bool, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path, tolerate_torn_tail)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Investigates the log at `path`.
pub fn inspect(path: &Path, tolerate_torn_tail: bool) -> Result<InspectResult, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No backup log found at {}", path.display()).into());
    }

    let backend = FileBackend::open_read_only(path)?;
    let report = Investigator::new()
        .tolerate_torn_tail(tolerate_torn_tail)
        .run(&backend)?;

    Ok(InspectResult {
        path: path.display().to_string(),
        log_size: backend.size()?,
        report,
    })
}

fn print_text_output(result: &InspectResult) {
    let report = &result.report;
    println!("Backup Log Inspection");
    println!("=====================");
    println!();
    println!("Path:      {}", result.path);
    println!("Log size:  {} bytes", result.log_size);
    println!();
    println!("Target length:");
    println!("  At last commit:  {}", report.initial_length);
    println!("  After changes:   {}", report.final_length);
    println!();
    println!("Pending records:   {}", report.record_count);
    println!("  Write undo:      {}", report.write_records);
    println!("  Length undo:     {}", report.length_records);

    if let (Some(first), Some(last)) = (report.first_timestamp, report.last_timestamp) {
        println!();
        println!("First record:      {first}");
        println!("Last record:       {last}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use durastream_core::{DurableStream, StreamConfig};
    use tempfile::TempDir;

    #[test]
    fn inspects_pending_log() {
        let dir = TempDir::new().unwrap();
        let target_path = dir.path().join("data");
        let log_path = dir.path().join("data.undo");
        std::fs::write(&target_path, b"abcdef").unwrap();

        {
            let stream = DurableStream::create(
                FileBackend::open(&target_path).unwrap(),
                FileBackend::open(&log_path).unwrap(),
                StreamConfig::default(),
            )
            .unwrap();
            stream.set_len(2).unwrap();
        }

        let result = inspect(&log_path, false).unwrap();
        assert_eq!(result.report.record_count, 2);
        assert_eq!(result.report.initial_length, 6);
        assert_eq!(result.report.final_length, 2);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["record_count"], 2);
    }

    #[test]
    fn inspects_log_held_by_live_stream() {
        let dir = TempDir::new().unwrap();
        let target_path = dir.path().join("data");
        let log_path = dir.path().join("data.undo");
        std::fs::write(&target_path, b"abc").unwrap();

        let stream = DurableStream::create(
            FileBackend::open(&target_path).unwrap(),
            FileBackend::open(&log_path).unwrap(),
            StreamConfig::default(),
        )
        .unwrap();
        stream.write(b"X").unwrap();

        let result = inspect(&log_path, false).unwrap();
        assert_eq!(result.report.record_count, 1);
        assert_eq!(result.report.write_records, 1);

        stream.rollback().unwrap();
        stream.close().unwrap();
        assert_eq!(std::fs::read(&target_path).unwrap(), b"abc");
    }

    #[test]
    fn missing_log_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(inspect(&dir.path().join("absent"), false).is_err());
    }
}
