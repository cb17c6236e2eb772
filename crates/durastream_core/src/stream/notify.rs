//! Commit-needed notifications.
//!
//! When auto-commit is off, every successful mutation leaves undo records
//! pending. The stream announces this on a feed so an external policy
//! (a timer, a batch size, a UI "save" state) can decide when to commit.
//!
//! # Usage
//!
//! ```rust,ignore
//! let rx = stream.subscribe();
//! stream.write(b"data")?;
//! let event = rx.recv()?;
//! if event.pending_records > 100 {
//!     stream.commit()?;
//! }
//! ```

use parking_lot::RwLock;
use std::sync::mpsc::{self, Receiver, Sender};

/// Emitted after a successful mutation that left records pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitNeeded {
    /// Records pending after the mutation.
    pub pending_records: u64,
    /// Whether this mutation moved the stream from idle to pending.
    pub first_since_commit: bool,
}

/// Distributes commit-needed events to subscribers.
///
/// Disconnected subscribers are dropped on the next emit.
#[derive(Debug, Default)]
pub struct CommitFeed {
    subscribers: RwLock<Vec<Sender<CommitNeeded>>>,
}

impl CommitFeed {
    /// Creates a feed with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to the feed.
    ///
    /// The receiver gets every event emitted after this call.
    pub fn subscribe(&self) -> Receiver<CommitNeeded> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Sends an event to all subscribers.
    pub fn emit(&self, event: CommitNeeded) {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(event).is_ok());
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}
