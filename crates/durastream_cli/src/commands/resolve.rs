//! Rollback and commit commands.
//!
//! Both open the target and its log the way a restarted process would and
//! settle the pending records one way or the other.

use durastream_core::{DurableStream, StreamConfig};
use durastream_storage::FileBackend;
use std::path::Path;
use tracing::info;

/// Undoes every pending record and empties the log.
pub fn rollback(target: &Path, log: &Path) -> Result<u64, Box<dyn std::error::Error>> {
    let stream = open(target, log)?;
    let pending = stream.pending_records()?;
    stream.rollback()?;
    let length = stream.len()?;
    stream.close()?;

    info!(pending, length, "rolled back");
    println!("Rolled back {pending} records; target is {length} bytes");
    Ok(pending)
}

/// Keeps every pending change and empties the log.
pub fn commit(target: &Path, log: &Path) -> Result<u64, Box<dyn std::error::Error>> {
    let stream = open(target, log)?;
    let pending = stream.pending_records()?;
    stream.commit()?;
    stream.close()?;

    info!(pending, "committed");
    println!("Committed {pending} records");
    Ok(pending)
}

fn open(
    target: &Path,
    log: &Path,
) -> Result<DurableStream<FileBackend, FileBackend>, Box<dyn std::error::Error>> {
    if !log.exists() {
        return Err(format!("No backup log found at {}", log.display()).into());
    }
    if !target.exists() {
        return Err(format!("No target file found at {}", target.display()).into());
    }

    let stream = DurableStream::open(
        FileBackend::open(target)?,
        FileBackend::open(log)?,
        StreamConfig::default(),
    )?;
    Ok(stream)
}
