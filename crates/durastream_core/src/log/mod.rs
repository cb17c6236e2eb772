//! Backup log: the undo journal that makes a durable stream recoverable.
//!
//! Every mutation of the target stream is preceded by a record that
//! describes how to reverse it. Commit discards the records; rollback
//! replays them newest first.
//!
//! ## Log Format
//!
//! All integers are little-endian `i64`; negative values are corruption.
//!
//! ```text
//! header:      | original_length (8) |
//! write-undo:  | 0x01 | timestamp (8) | offset (8) | length (8) | original_length (8) | pre-image (N) |
//! length-undo: | 0x02 | timestamp (8) | old_length (8) | new_length (8) |
//! ```
//!
//! `N` is the number of bytes the write overwrote: zero for a pure append,
//! `min(length, original_length - offset)` otherwise.
//!
//! ## Recovery Policy
//!
//! - **Truncated final record**: tolerated on open when configured, as long
//!   as the cut falls inside the record's fixed-size part. The record is
//!   appended before its mutation, so a torn record means the mutation
//!   never started.
//! - **Pre-image past the end of the log**: data corruption, never treated
//!   as a torn tail. Its length is derived from the record's fields, so a
//!   damaged field would otherwise swallow the records after it.
//! - **Negative field or header**: data corruption.
//! - **Unknown discriminator**: unrecoverable (written by an incompatible
//!   version).
//!
//! ## Invariants
//!
//! - The log is **append-only** between commits
//! - Records are written **before** the mutation they undo
//! - Timestamps never decrease
//! - A length-undo's old length is at least the length the records before
//!   it leave the target at

mod reader;
mod record;
mod writer;

pub use reader::LogReader;
pub use record::{
    overwritten_len, BackupRecord, RecordType, HEADER_SIZE, LENGTH_UNDO_SIZE, TAG_SIZE,
    WRITE_UNDO_FIXED_SIZE,
};
pub use writer::{initialize, LogWriter};
