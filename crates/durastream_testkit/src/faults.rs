//! Fault injection for stream backends.
//!
//! [`FaultyBackend`] wraps any backend and fails selected operations on
//! demand. The switches live in a shared [`Faults`] handle, so a test can
//! keep the handle and flip them after the backend has been moved into a
//! durable stream.
//!
//! ## Scenarios
//!
//! 1. **Failed write** - the target rejects a mutation, auto-rollback runs
//! 2. **Torn write** - only a prefix of the data lands before the error
//! 3. **Double failure** - the mutation and the rollback both fail
//! 4. **Late cancellation** - a flag is raised while the log is written
//!
//! ## Usage
//!
//! ```rust,ignore
//! use durastream_testkit::FaultyBackend;
//!
//! let (target, faults) = FaultyBackend::wrap(InMemoryBackend::new());
//! let stream = DurableStream::create(target, InMemoryBackend::new(), config)?;
//! faults.fail_writes(true);
//! assert!(stream.write(b"data").is_err());
//! ```

use durastream_core::CancellationFlag;
use durastream_storage::{StorageError, StorageResult, StreamBackend};
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

const NO_LIMIT: u64 = u64::MAX;

/// Shared fault switches for a [`FaultyBackend`].
#[derive(Debug)]
pub struct Faults {
    fail_writes: AtomicBool,
    fail_set_len: AtomicBool,
    fail_flush: AtomicBool,
    writes_before_failure: AtomicU64,
    failing_writes: AtomicU64,
    torn_write_bytes: AtomicU64,
    writes: AtomicU64,
    cancel_on_write: Mutex<Option<CancellationFlag>>,
}

impl Default for Faults {
    fn default() -> Self {
        Self {
            fail_writes: AtomicBool::new(false),
            fail_set_len: AtomicBool::new(false),
            fail_flush: AtomicBool::new(false),
            writes_before_failure: AtomicU64::new(NO_LIMIT),
            failing_writes: AtomicU64::new(0),
            torn_write_bytes: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            cancel_on_write: Mutex::new(None),
        }
    }
}

impl Faults {
    /// Makes every `write_at` fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Lets `count` more writes succeed, then fails every write after them.
    pub fn fail_writes_after(&self, count: u64) {
        self.writes_before_failure.store(count, Ordering::SeqCst);
    }

    /// Fails the next `count` writes, then lets writes through again.
    pub fn fail_next_writes(&self, count: u64) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Writes the first `bytes` bytes of a failing write before the error.
    pub fn tear_writes(&self, bytes: u64) {
        self.torn_write_bytes.store(bytes, Ordering::SeqCst);
    }

    /// Makes every `set_len` fail.
    pub fn fail_set_len(&self, fail: bool) {
        self.fail_set_len.store(fail, Ordering::SeqCst);
    }

    /// Makes `flush` and `sync` fail.
    pub fn fail_flush(&self, fail: bool) {
        self.fail_flush.store(fail, Ordering::SeqCst);
    }

    /// Raises `flag` on the next successful write.
    pub fn cancel_on_write(&self, flag: &CancellationFlag) {
        *self.cancel_on_write.lock() = Some(flag.clone());
    }

    /// Turns every fault off.
    pub fn reset(&self) {
        self.fail_writes.store(false, Ordering::SeqCst);
        self.fail_set_len.store(false, Ordering::SeqCst);
        self.fail_flush.store(false, Ordering::SeqCst);
        self.writes_before_failure.store(NO_LIMIT, Ordering::SeqCst);
        self.failing_writes.store(0, Ordering::SeqCst);
        self.torn_write_bytes.store(0, Ordering::SeqCst);
        *self.cancel_on_write.lock() = None;
    }

    /// Returns the number of `write_at` calls seen, failed ones included.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn write_should_fail(&self) -> bool {
        if self.fail_writes.load(Ordering::SeqCst) {
            return true;
        }
        let failing = self.failing_writes.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_writes.store(failing - 1, Ordering::SeqCst);
            return true;
        }
        let remaining = self.writes_before_failure.load(Ordering::SeqCst);
        if remaining == NO_LIMIT {
            return false;
        }
        if remaining == 0 {
            return true;
        }
        self.writes_before_failure.store(remaining - 1, Ordering::SeqCst);
        false
    }

    fn take_cancel(&self) -> Option<CancellationFlag> {
        self.cancel_on_write.lock().take()
    }
}

/// A backend wrapper that fails operations on demand.
#[derive(Debug)]
pub struct FaultyBackend<B> {
    inner: B,
    faults: Arc<Faults>,
}

impl<B: StreamBackend> FaultyBackend<B> {
    /// Wraps `inner` and returns the handle controlling its faults.
    pub fn wrap(inner: B) -> (Self, Arc<Faults>) {
        let faults = Arc::new(Faults::default());
        (
            Self {
                inner,
                faults: Arc::clone(&faults),
            },
            faults,
        )
    }

    /// Returns the wrapped backend.
    pub fn inner(&self) -> &B {
        &self.inner
    }

    /// Consumes the wrapper, returning the wrapped backend.
    pub fn into_inner(self) -> B {
        self.inner
    }
}

fn injected(what: &str) -> StorageError {
    StorageError::Io(io::Error::new(io::ErrorKind::Other, format!("injected {what} failure")))
}

impl<B: StreamBackend> StreamBackend for FaultyBackend<B> {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> StorageResult<()> {
        self.faults.writes.fetch_add(1, Ordering::SeqCst);
        if self.faults.write_should_fail() {
            let torn = self.faults.torn_write_bytes.load(Ordering::SeqCst);
            let torn = usize::try_from(torn).unwrap_or(usize::MAX).min(data.len());
            if torn > 0 {
                self.inner.write_at(offset, &data[..torn])?;
            }
            return Err(injected("write"));
        }
        self.inner.write_at(offset, data)?;
        if let Some(flag) = self.faults.take_cancel() {
            flag.cancel();
        }
        Ok(())
    }

    fn set_len(&mut self, new_size: u64) -> StorageResult<()> {
        if self.faults.fail_set_len.load(Ordering::SeqCst) {
            return Err(injected("set_len"));
        }
        self.inner.set_len(new_size)
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn flush(&mut self) -> StorageResult<()> {
        if self.faults.fail_flush.load(Ordering::SeqCst) {
            return Err(injected("flush"));
        }
        self.inner.flush()
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.faults.fail_flush.load(Ordering::SeqCst) {
            return Err(injected("sync"));
        }
        self.inner.sync()
    }
}
