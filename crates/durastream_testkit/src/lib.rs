//! # Durastream Testkit
//!
//! Test utilities for durastream.
//!
//! This crate provides:
//! - A fault-injecting backend for failure and crash scenarios
//! - On-disk fixtures backed by temporary directories
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use durastream_testkit::prelude::*;
//!
//! let (target, faults) = FaultyBackend::wrap(InMemoryBackend::new());
//! faults.fail_writes(true);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faults;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use faults::*;
pub use fixtures::*;
pub use generators::*;
