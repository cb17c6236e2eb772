//! The durable stream and its commit notifications.

mod durable;
mod io;
mod notify;

pub use durable::DurableStream;
pub use notify::{CommitFeed, CommitNeeded};
