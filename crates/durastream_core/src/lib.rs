//! # Durastream Core
//!
//! Transactional wrapper for random-access byte streams.
//!
//! This crate provides:
//! - A backup (undo) log recording how to reverse every mutation
//! - [`DurableStream`], which logs before it mutates and commits or rolls
//!   back by policy
//! - An [`Investigator`] that validates a log without touching its target
//!
//! ## Example
//!
//! ```rust
//! use durastream_core::{DurableStream, StreamConfig, StreamState};
//! use durastream_storage::InMemoryBackend;
//!
//! let target = InMemoryBackend::with_data(b"0123456789".to_vec());
//! let observer = target.clone();
//! let stream = DurableStream::create(target, InMemoryBackend::new(), StreamConfig::default())?;
//!
//! stream.set_len(4)?;
//! assert_eq!(stream.state()?, StreamState::Pending);
//!
//! stream.rollback()?;
//! assert_eq!(observer.data(), b"0123456789");
//! # Ok::<(), durastream_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
pub mod investigate;
pub mod log;
mod stream;
mod types;

pub use config::StreamConfig;
pub use error::{CoreError, CoreResult};
pub use investigate::{investigate, Investigator, LogReport};
pub use log::{BackupRecord, LogReader, LogWriter, RecordType};
pub use stream::{CommitFeed, CommitNeeded, DurableStream};
pub use types::{CancellationFlag, StreamState, Timestamp};

/// Crate version, from `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
