//! # Durastream Storage
//!
//! Random-access byte stream backends for durastream.
//!
//! This crate provides the lowest-level storage abstraction for durastream.
//! Backends are **opaque byte stores** - they do not interpret the data
//! they hold. The same trait serves both the protected target stream and
//! the backup log that records how to undo changes to it.
//!
//! ## Design Principles
//!
//! - Backends are simple byte stores (read, write, resize, flush)
//! - No knowledge of the backup log format
//! - Must be `Send + Sync` so a stream can move between threads and tasks
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral streams
//! - [`FileBackend`] - For persistent streams using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use durastream_storage::{StreamBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! backend.write_at(0, b"hello world").unwrap();
//! backend.write_at(6, b"there").unwrap();
//! assert_eq!(backend.read_at(0, 11).unwrap(), b"hello there");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StreamBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
