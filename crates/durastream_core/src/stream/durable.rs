//! The durable stream decorator.

use crate::config::StreamConfig;
use crate::error::{CoreError, CoreResult};
use crate::log::{overwritten_len, BackupRecord, LogWriter};
use crate::stream::notify::{CommitFeed, CommitNeeded};
use crate::types::{CancellationFlag, StreamState};
use durastream_storage::{FileBackend, StreamBackend};
use std::io::SeekFrom;
use std::sync::mpsc::Receiver;
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// What a mutation left behind once its policy step ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MutationOutcome {
    /// Nothing was logged or changed.
    Unchanged,
    /// The change was committed straight away.
    Committed,
    /// The change is pending; `first` if it made the stream pending.
    Pending { records: u64, first: bool },
}

/// State guarded by the stream lock.
struct Inner<T: StreamBackend, B: StreamBackend> {
    target: T,
    log: LogWriter<B>,
    position: u64,
    config: StreamConfig,
    poisoned: bool,
}

/// A stream whose writes and length changes can be rolled back.
///
/// Every mutation first appends an undo record to a backup log, then
/// changes the target. [`commit`](Self::commit) discards the records;
/// [`rollback`](Self::rollback) replays them newest first and restores the
/// target's bytes and length as of the last commit.
///
/// # Locking
///
/// One lock serializes every operation, reads included. The `*_async`
/// methods take it with `lock().await`. Blocking methods take it without
/// waiting when it is free; when it is held they block the thread, unless
/// they run on an async runtime's thread, where blocking could stall the
/// holder, and they fail with [`CoreError::InvalidOperation`] instead. Both
/// styles run the same code once the lock is held.
///
/// # Example
///
/// ```rust
/// use durastream_core::{DurableStream, StreamConfig};
/// use durastream_storage::{InMemoryBackend, StreamBackend};
///
/// let target = InMemoryBackend::with_data(b"hello".to_vec());
/// let observer = target.clone();
/// let stream = DurableStream::create(target, InMemoryBackend::new(), StreamConfig::default()).unwrap();
///
/// stream.write(b"HE").unwrap();
/// assert_eq!(observer.data(), b"HEllo");
///
/// stream.rollback().unwrap();
/// assert_eq!(observer.data(), b"hello");
/// ```
pub struct DurableStream<T: StreamBackend, B: StreamBackend> {
    inner: Mutex<Option<Inner<T, B>>>,
    feed: CommitFeed,
}

impl<T: StreamBackend, B: StreamBackend> DurableStream<T, B> {
    /// Wraps `target`, initializing the empty `backup` as its log.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error if `backup` is not empty, or an
    /// I/O error if either stream fails.
    pub fn create(target: T, backup: B, config: StreamConfig) -> CoreResult<Self> {
        let log = LogWriter::create(&target, backup, config.sync_backup)?;
        Ok(Self::from_parts(target, log, config))
    }

    /// Wraps `target` with an existing, initialized `backup` log.
    ///
    /// Records already in the log are pending: they describe changes that
    /// were never committed, typically because the process crashed. Call
    /// [`rollback`](Self::rollback) to undo them or
    /// [`commit`](Self::commit) to keep them.
    ///
    /// # Errors
    ///
    /// Returns an error if the log is corrupt or cannot be read.
    pub fn open(target: T, backup: B, config: StreamConfig) -> CoreResult<Self> {
        let log = LogWriter::open(backup, config.sync_backup, config.tolerate_torn_tail)?;
        if log.pending() > 0 {
            warn!(pending = log.pending(), "opened stream with uncommitted changes");
        }
        Ok(Self::from_parts(target, log, config))
    }

    fn from_parts(target: T, log: LogWriter<B>, config: StreamConfig) -> Self {
        Self {
            inner: Mutex::new(Some(Inner {
                target,
                log,
                position: 0,
                config,
                poisoned: false,
            })),
            feed: CommitFeed::new(),
        }
    }

    // =========================================================================
    // Blocking API
    // =========================================================================

    fn with_inner<R>(
        &self,
        f: impl FnOnce(&mut Inner<T, B>, &CommitFeed) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let mut guard = match self.inner.try_lock() {
            Ok(guard) => guard,
            Err(_) if Handle::try_current().is_ok() => {
                return Err(CoreError::invalid_operation(
                    "stream is busy and a blocking call cannot wait on an async runtime thread; \
                     use the *_async methods",
                ));
            }
            Err(_) => self.inner.blocking_lock(),
        };
        let inner = guard.as_mut().ok_or_else(closed)?;
        f(inner, &self.feed)
    }

    /// Writes `data` at the current position and advances it.
    ///
    /// An empty slice is a no-op and logs nothing.
    ///
    /// # Errors
    ///
    /// Returns the write failure. With auto-rollback on, pending changes
    /// are undone first; if that fails too the error is
    /// [`CoreError::RollbackFailed`] and the stream is poisoned.
    pub fn write(&self, data: &[u8]) -> CoreResult<()> {
        self.with_inner(|inner, feed| inner.write(data, None).map(|o| announce(feed, o)))
    }

    /// Sets the target length.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error for a negative length, otherwise
    /// fails like [`write`](Self::write).
    pub fn set_len(&self, new_length: i64) -> CoreResult<()> {
        self.with_inner(|inner, feed| inner.set_len(new_length, None).map(|o| announce(feed, o)))
    }

    /// Makes all pending changes permanent and empties the log.
    ///
    /// A commit with nothing pending is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the target cannot be flushed or the log reset.
    pub fn commit(&self) -> CoreResult<()> {
        self.with_inner(|inner, _| inner.commit())
    }

    /// Undoes all pending changes and empties the log.
    ///
    /// # Errors
    ///
    /// A failure part-way through leaves the target in an unknown state;
    /// the stream is poisoned.
    pub fn rollback(&self) -> CoreResult<()> {
        self.with_inner(|inner, _| inner.rollback())
    }

    /// Reads into `buf` from the current position.
    ///
    /// Returns the number of bytes read; zero at or past the end.
    ///
    /// # Errors
    ///
    /// Returns an error if the target read fails.
    pub fn read(&self, buf: &mut [u8]) -> CoreResult<usize> {
        self.with_inner(|inner, _| inner.read(buf))
    }

    /// Moves the current position.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error if the position would be negative.
    pub fn seek(&self, pos: SeekFrom) -> CoreResult<u64> {
        self.with_inner(|inner, _| inner.seek(pos))
    }

    /// Returns the current position.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is closed or poisoned.
    pub fn position(&self) -> CoreResult<u64> {
        self.with_inner(|inner, _| {
            inner.ensure_usable()?;
            Ok(inner.position)
        })
    }

    /// Sets the current position.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is closed or poisoned.
    pub fn set_position(&self, position: u64) -> CoreResult<()> {
        self.with_inner(|inner, _| inner.seek(SeekFrom::Start(position)).map(|_| ()))
    }

    /// Returns the target length.
    ///
    /// # Errors
    ///
    /// Returns an error if the target size cannot be read.
    pub fn len(&self) -> CoreResult<u64> {
        self.with_inner(|inner, _| {
            inner.ensure_usable()?;
            Ok(inner.target.size()?)
        })
    }

    /// Returns true if the target is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the target size cannot be read.
    pub fn is_empty(&self) -> CoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Flushes the target.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    pub fn flush(&self) -> CoreResult<()> {
        self.with_inner(|inner, _| inner.flush())
    }

    /// Returns the transaction state.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is closed.
    pub fn state(&self) -> CoreResult<StreamState> {
        self.with_inner(|inner, _| Ok(inner.state()))
    }

    /// Returns the number of uncommitted records.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is closed.
    pub fn pending_records(&self) -> CoreResult<u64> {
        self.with_inner(|inner, _| Ok(inner.log.pending()))
    }

    /// Returns a copy of the active policies.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is closed.
    pub fn config(&self) -> CoreResult<StreamConfig> {
        self.with_inner(|inner, _| Ok(inner.config.clone()))
    }

    /// Turns auto-commit on or off.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is closed.
    pub fn set_auto_commit(&self, value: bool) -> CoreResult<()> {
        self.with_inner(|inner, _| {
            inner.config.auto_commit = value;
            Ok(())
        })
    }

    /// Turns auto-rollback on or off.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is closed.
    pub fn set_auto_rollback(&self, value: bool) -> CoreResult<()> {
        self.with_inner(|inner, _| {
            inner.config.auto_rollback = value;
            Ok(())
        })
    }

    /// Turns auto-flush on or off.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is closed.
    pub fn set_auto_flush(&self, value: bool) -> CoreResult<()> {
        self.with_inner(|inner, _| {
            inner.config.auto_flush = value;
            Ok(())
        })
    }

    /// Subscribes to commit-needed events.
    pub fn subscribe(&self) -> Receiver<CommitNeeded> {
        self.feed.subscribe()
    }

    /// Flushes both streams and releases them.
    ///
    /// # Errors
    ///
    /// Returns an invalid operation error if changes are still pending;
    /// they stay in the log and will be pending again on the next
    /// [`open`](Self::open).
    pub fn close(mut self) -> CoreResult<()> {
        let mut inner = self.inner.get_mut().take().ok_or_else(closed)?;
        inner.target.flush()?;
        inner.log.flush()?;
        let pending = inner.log.pending();
        if pending > 0 {
            return Err(CoreError::invalid_operation(format!(
                "stream closed with {pending} uncommitted records"
            )));
        }
        debug!("closed durable stream");
        Ok(())
    }

    /// Releases the target and log without checking for pending changes.
    ///
    /// Recovery tooling uses this to inspect a log after a failure.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream was already taken apart.
    pub fn into_parts(mut self) -> CoreResult<(T, B)> {
        let inner = self.inner.get_mut().take().ok_or_else(closed)?;
        Ok((inner.target, inner.log.into_inner()))
    }

    // =========================================================================
    // Suspend-capable API
    // =========================================================================

    async fn with_inner_async<R>(
        &self,
        f: impl FnOnce(&mut Inner<T, B>, &CommitFeed) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let mut guard = self.inner.lock().await;
        let inner = guard.as_mut().ok_or_else(closed)?;
        f(inner, &self.feed)
    }

    /// Async [`write`](Self::write) with cooperative cancellation.
    ///
    /// Cancellation seen before the record is logged aborts with nothing
    /// pending. Cancellation seen after it is treated as a failed write,
    /// so auto-rollback applies.
    ///
    /// # Errors
    ///
    /// Fails like [`write`](Self::write), or with [`CoreError::Cancelled`].
    pub async fn write_async(&self, data: &[u8], cancel: &CancellationFlag) -> CoreResult<()> {
        self.with_inner_async(|inner, feed| {
            inner.write(data, Some(cancel)).map(|o| announce(feed, o))
        })
        .await
    }

    /// Async [`set_len`](Self::set_len) with cooperative cancellation.
    ///
    /// # Errors
    ///
    /// Fails like [`set_len`](Self::set_len), or with [`CoreError::Cancelled`].
    pub async fn set_len_async(&self, new_length: i64, cancel: &CancellationFlag) -> CoreResult<()> {
        self.with_inner_async(|inner, feed| {
            inner.set_len(new_length, Some(cancel)).map(|o| announce(feed, o))
        })
        .await
    }

    /// Async [`commit`](Self::commit).
    ///
    /// # Errors
    ///
    /// Fails like [`commit`](Self::commit).
    pub async fn commit_async(&self) -> CoreResult<()> {
        self.with_inner_async(|inner, _| inner.commit()).await
    }

    /// Async [`rollback`](Self::rollback).
    ///
    /// # Errors
    ///
    /// Fails like [`rollback`](Self::rollback).
    pub async fn rollback_async(&self) -> CoreResult<()> {
        self.with_inner_async(|inner, _| inner.rollback()).await
    }

    /// Async [`read`](Self::read).
    ///
    /// # Errors
    ///
    /// Fails like [`read`](Self::read).
    pub async fn read_async(&self, buf: &mut [u8]) -> CoreResult<usize> {
        self.with_inner_async(|inner, _| inner.read(buf)).await
    }

    /// Async [`seek`](Self::seek).
    ///
    /// # Errors
    ///
    /// Fails like [`seek`](Self::seek).
    pub async fn seek_async(&self, pos: SeekFrom) -> CoreResult<u64> {
        self.with_inner_async(|inner, _| inner.seek(pos)).await
    }

    /// Async [`set_position`](Self::set_position).
    ///
    /// # Errors
    ///
    /// Fails like [`set_position`](Self::set_position).
    pub async fn set_position_async(&self, position: u64) -> CoreResult<()> {
        self.with_inner_async(|inner, _| inner.seek(SeekFrom::Start(position)).map(|_| ()))
            .await
    }

    /// Async [`flush`](Self::flush).
    ///
    /// # Errors
    ///
    /// Fails like [`flush`](Self::flush).
    pub async fn flush_async(&self) -> CoreResult<()> {
        self.with_inner_async(|inner, _| inner.flush()).await
    }

    /// Async [`len`](Self::len).
    ///
    /// # Errors
    ///
    /// Fails like [`len`](Self::len).
    pub async fn len_async(&self) -> CoreResult<u64> {
        self.with_inner_async(|inner, _| {
            inner.ensure_usable()?;
            Ok(inner.target.size()?)
        })
        .await
    }

    /// Async [`state`](Self::state).
    ///
    /// # Errors
    ///
    /// Fails like [`state`](Self::state).
    pub async fn state_async(&self) -> CoreResult<StreamState> {
        self.with_inner_async(|inner, _| Ok(inner.state())).await
    }
}

impl<T: StreamBackend> DurableStream<T, FileBackend> {
    /// Wraps `target` with a log in an anonymous temporary file.
    ///
    /// The log disappears with the stream, so this protects against failed
    /// operations within a process but not against crashes.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary file cannot be created.
    pub fn with_temp_backup(target: T, config: StreamConfig) -> CoreResult<Self> {
        Self::create(target, FileBackend::temporary()?, config)
    }
}

impl<T: StreamBackend, B: StreamBackend> Drop for DurableStream<T, B> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.get_mut() {
            if inner.log.pending() > 0 {
                warn!(
                    pending = inner.log.pending(),
                    "durable stream dropped with uncommitted changes"
                );
            }
        }
    }
}

impl<T: StreamBackend, B: StreamBackend> std::fmt::Debug for DurableStream<T, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableStream")
            .field("subscribers", &self.feed.subscriber_count())
            .finish_non_exhaustive()
    }
}

fn closed() -> CoreError {
    CoreError::invalid_operation("stream is closed")
}

fn announce(feed: &CommitFeed, outcome: MutationOutcome) {
    if let MutationOutcome::Pending { records, first } = outcome {
        feed.emit(CommitNeeded {
            pending_records: records,
            first_since_commit: first,
        });
    }
}

fn check_cancel(cancel: Option<&CancellationFlag>) -> CoreResult<()> {
    match cancel {
        Some(flag) if flag.is_cancelled() => Err(CoreError::Cancelled),
        _ => Ok(()),
    }
}

impl<T: StreamBackend, B: StreamBackend> Inner<T, B> {
    fn ensure_usable(&self) -> CoreResult<()> {
        if self.poisoned {
            return Err(CoreError::Poisoned);
        }
        Ok(())
    }

    fn state(&self) -> StreamState {
        if self.poisoned {
            StreamState::Poisoned
        } else if self.log.pending() > 0 {
            StreamState::Pending
        } else {
            StreamState::Idle
        }
    }

    fn write(&mut self, data: &[u8], cancel: Option<&CancellationFlag>) -> CoreResult<MutationOutcome> {
        self.ensure_usable()?;
        if data.is_empty() {
            return Ok(MutationOutcome::Unchanged);
        }
        check_cancel(cancel)?;

        let offset = self.position;
        let length = data.len() as u64;
        let original_length = self.target.size()?;
        let overwritten = overwritten_len(offset, length, original_length);
        let original_bytes = if overwritten > 0 {
            self.target.read_at(offset, overwritten as usize)?
        } else {
            Vec::new()
        };

        let was_pending = self.log.pending() > 0;
        self.log.append(&[BackupRecord::WriteUndo {
            timestamp: self.log.next_timestamp(),
            offset,
            length,
            original_length,
            original_bytes,
        }])?;

        let result = check_cancel(cancel).and_then(|()| {
            self.target.write_at(offset, data)?;
            if self.config.auto_flush {
                self.target.flush()?;
            }
            Ok(())
        });
        if result.is_ok() {
            self.position = offset + length;
        }
        self.finish_mutation(result, was_pending)
    }

    fn set_len(
        &mut self,
        new_length: i64,
        cancel: Option<&CancellationFlag>,
    ) -> CoreResult<MutationOutcome> {
        self.ensure_usable()?;
        let new_length = u64::try_from(new_length).map_err(|_| {
            CoreError::invalid_argument(format!("length must not be negative, got {new_length}"))
        })?;
        check_cancel(cancel)?;

        let old_length = self.target.size()?;
        if new_length == old_length {
            return Ok(MutationOutcome::Unchanged);
        }

        let timestamp = self.log.next_timestamp();
        let mut records = Vec::with_capacity(2);
        if new_length < old_length {
            // Shrinking drops bytes that set_len(old) alone cannot bring back.
            let dropped = usize::try_from(old_length - new_length).map_err(|_| {
                CoreError::invalid_argument("truncated region does not fit in memory")
            })?;
            records.push(BackupRecord::WriteUndo {
                timestamp,
                offset: new_length,
                length: old_length - new_length,
                original_length: old_length,
                original_bytes: self.target.read_at(new_length, dropped)?,
            });
        }
        records.push(BackupRecord::LengthUndo {
            timestamp,
            old_length,
            new_length,
        });

        let was_pending = self.log.pending() > 0;
        self.log.append(&records)?;

        let result = check_cancel(cancel).and_then(|()| {
            self.target.set_len(new_length)?;
            if self.config.auto_flush {
                self.target.flush()?;
            }
            Ok(())
        });
        self.finish_mutation(result, was_pending)
    }

    /// Applies the commit/rollback policy to the outcome of a mutation.
    fn finish_mutation(
        &mut self,
        result: CoreResult<()>,
        was_pending: bool,
    ) -> CoreResult<MutationOutcome> {
        match result {
            Ok(()) if self.config.auto_commit => {
                self.commit()?;
                Ok(MutationOutcome::Committed)
            }
            Ok(()) => Ok(MutationOutcome::Pending {
                records: self.log.pending(),
                first: !was_pending,
            }),
            Err(cause) if self.config.auto_rollback => {
                warn!(error = %cause, "mutation failed, rolling back");
                match self.rollback() {
                    Ok(()) => Err(cause),
                    Err(rollback) => Err(CoreError::rollback_failed(cause, rollback)),
                }
            }
            Err(cause) => Err(cause),
        }
    }

    fn commit(&mut self) -> CoreResult<()> {
        self.ensure_usable()?;
        if self.log.pending() == 0 {
            return Ok(());
        }

        // Target changes must be durable before their undo records go.
        self.target.flush()?;
        if self.config.sync_backup {
            self.target.sync()?;
        }
        let length = self.target.size()?;
        let committed = self.log.pending();
        self.log.reset(length)?;
        debug!(committed, length, "committed");
        Ok(())
    }

    fn rollback(&mut self) -> CoreResult<()> {
        self.ensure_usable()?;
        if self.log.pending() == 0 {
            return Ok(());
        }

        match self.replay_undo() {
            Ok(undone) => {
                debug!(undone, "rolled back");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "rollback failed, stream poisoned");
                self.poisoned = true;
                Err(e)
            }
        }
    }

    fn replay_undo(&mut self) -> CoreResult<usize> {
        let records = self.log.read_pending()?;
        for record in records.iter().rev() {
            match record {
                BackupRecord::LengthUndo { old_length, .. } => {
                    self.target.set_len(*old_length)?;
                }
                BackupRecord::WriteUndo {
                    offset,
                    length,
                    original_length,
                    original_bytes,
                    ..
                } => {
                    if !original_bytes.is_empty() {
                        self.target.write_at(*offset, original_bytes)?;
                    }
                    if offset.saturating_add(*length) > *original_length {
                        self.target.set_len(*original_length)?;
                    }
                }
            }
        }

        self.target.flush()?;
        if self.config.sync_backup {
            self.target.sync()?;
        }
        let length = self.target.size()?;
        self.log.reset(length)?;
        Ok(records.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> CoreResult<usize> {
        self.ensure_usable()?;
        let size = self.target.size()?;
        if self.position >= size || buf.is_empty() {
            return Ok(0);
        }
        let available = usize::try_from(size - self.position).unwrap_or(usize::MAX);
        let n = buf.len().min(available);
        let bytes = self.target.read_at(self.position, n)?;
        buf[..n].copy_from_slice(&bytes);
        self.position += n as u64;
        Ok(n)
    }

    fn seek(&mut self, pos: SeekFrom) -> CoreResult<u64> {
        self.ensure_usable()?;
        let (base, delta) = match pos {
            SeekFrom::Start(p) => {
                self.position = p;
                return Ok(p);
            }
            SeekFrom::Current(d) => (self.position, d),
            SeekFrom::End(d) => (self.target.size()?, d),
        };
        let new_position = base.checked_add_signed(delta).ok_or_else(|| {
            CoreError::invalid_argument(format!("seek to {base}{delta:+} is out of range"))
        })?;
        self.position = new_position;
        Ok(new_position)
    }

    fn flush(&mut self) -> CoreResult<()> {
        self.ensure_usable()?;
        self.target.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use durastream_storage::InMemoryBackend;

    type MemStream = DurableStream<InMemoryBackend, InMemoryBackend>;

    fn stream_over(data: &[u8], config: StreamConfig) -> (MemStream, InMemoryBackend, InMemoryBackend) {
        let target = InMemoryBackend::with_data(data.to_vec());
        let backup = InMemoryBackend::new();
        let stream = DurableStream::create(target.clone(), backup.clone(), config).unwrap();
        (stream, target, backup)
    }

    #[test]
    fn write_then_rollback_restores_bytes() {
        let (stream, target, _) = stream_over(b"abcdef", StreamConfig::default());
        stream.seek(SeekFrom::Start(2)).unwrap();
        stream.write(b"XYZW").unwrap();
        assert_eq!(target.data(), b"abXYZW");
        assert_eq!(stream.position().unwrap(), 6);

        stream.rollback().unwrap();
        assert_eq!(target.data(), b"abcdef");
        assert_eq!(stream.state().unwrap(), StreamState::Idle);
    }

    #[test]
    fn write_past_end_rolls_back_length() {
        let (stream, target, _) = stream_over(b"abc", StreamConfig::default());
        stream.seek(SeekFrom::End(0)).unwrap();
        stream.write(b"defg").unwrap();
        assert_eq!(target.data(), b"abcdefg");

        stream.rollback().unwrap();
        assert_eq!(target.data(), b"abc");
    }

    #[test]
    fn shrink_then_rollback_restores_tail() {
        let (stream, target, _) = stream_over(b"0123456789", StreamConfig::default());
        stream.set_len(3).unwrap();
        assert_eq!(target.data(), b"012");
        assert_eq!(stream.pending_records().unwrap(), 2);

        stream.rollback().unwrap();
        assert_eq!(target.data(), b"0123456789");
    }

    #[test]
    fn set_len_to_current_length_logs_nothing() {
        let (stream, _, backup) = stream_over(b"abc", StreamConfig::default());
        stream.set_len(3).unwrap();
        assert_eq!(stream.pending_records().unwrap(), 0);
        assert_eq!(backup.size().unwrap(), 8);
    }

    #[test]
    fn negative_length_is_rejected() {
        let (stream, _, _) = stream_over(b"abc", StreamConfig::default());
        assert!(matches!(
            stream.set_len(-1),
            Err(CoreError::InvalidArgument { .. })
        ));
        assert_eq!(stream.state().unwrap(), StreamState::Idle);
    }

    #[test]
    fn empty_write_is_noop() {
        let (stream, _, backup) = stream_over(b"abc", StreamConfig::default());
        stream.write(&[]).unwrap();
        assert_eq!(stream.pending_records().unwrap(), 0);
        assert_eq!(backup.size().unwrap(), 8);
    }

    #[test]
    fn commit_resets_log_header() {
        let (stream, _, backup) = stream_over(b"abc", StreamConfig::default());
        stream.set_len(10).unwrap();
        stream.commit().unwrap();

        assert_eq!(backup.data(), 10i64.to_le_bytes().to_vec());
        assert_eq!(stream.state().unwrap(), StreamState::Idle);
        stream.commit().unwrap();
    }

    #[test]
    fn auto_commit_leaves_nothing_pending() {
        let (stream, target, _) = stream_over(b"abc", StreamConfig::new().auto_commit(true));
        let rx = stream.subscribe();
        stream.write(b"X").unwrap();
        assert_eq!(stream.pending_records().unwrap(), 0);
        assert!(rx.try_recv().is_err());

        stream.rollback().unwrap();
        assert_eq!(target.data(), b"Xbc");
    }

    #[test]
    fn commit_needed_reports_first_mutation() {
        let (stream, _, _) = stream_over(b"abc", StreamConfig::default());
        let rx = stream.subscribe();

        stream.write(b"x").unwrap();
        stream.write(b"y").unwrap();
        stream.commit().unwrap();
        stream.write(b"z").unwrap();

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                CommitNeeded { pending_records: 1, first_since_commit: true },
                CommitNeeded { pending_records: 2, first_since_commit: false },
                CommitNeeded { pending_records: 1, first_since_commit: true },
            ]
        );
    }

    #[test]
    fn read_stops_at_end() {
        let (stream, _, _) = stream_over(b"hello", StreamConfig::default());
        stream.set_position(3).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(stream.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"lo");
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn seek_before_start_is_rejected() {
        let (stream, _, _) = stream_over(b"hello", StreamConfig::default());
        assert!(stream.seek(SeekFrom::Current(-1)).is_err());
        assert_eq!(stream.seek(SeekFrom::End(-2)).unwrap(), 3);
    }

    #[tokio::test]
    async fn cancelled_before_logging_leaves_nothing_pending() {
        let (stream, target, _) = stream_over(b"abc", StreamConfig::default());
        let cancel = CancellationFlag::new();
        cancel.cancel();

        let result = stream.write_async(b"zz", &cancel).await;
        assert!(matches!(result, Err(CoreError::Cancelled)));
        assert_eq!(target.data(), b"abc");
        assert_eq!(stream.state_async().await.unwrap(), StreamState::Idle);
    }

    #[tokio::test]
    async fn blocking_calls_work_on_runtime_thread() {
        let (stream, target, _) = stream_over(b"abc", StreamConfig::default());
        stream.write(b"X").unwrap();
        assert_eq!(stream.state().unwrap(), StreamState::Pending);
        stream.rollback().unwrap();
        assert_eq!(target.data(), b"abc");
    }

    #[tokio::test]
    async fn busy_stream_refuses_blocking_call_on_runtime_thread() {
        let (stream, target, _) = stream_over(b"abc", StreamConfig::default());
        let held = stream.inner.lock().await;

        let result = stream.write(b"X");
        assert!(matches!(result, Err(CoreError::InvalidOperation { .. })));
        drop(held);

        assert_eq!(target.data(), b"abc");
        assert_eq!(stream.state_async().await.unwrap(), StreamState::Idle);
    }

    #[test]
    fn close_refuses_pending_changes() {
        let (stream, _, backup) = stream_over(b"abc", StreamConfig::default());
        stream.write(b"x").unwrap();
        assert!(matches!(
            stream.close(),
            Err(CoreError::InvalidOperation { .. })
        ));
        assert!(backup.size().unwrap() > 8);
    }

    #[test]
    fn close_after_commit_succeeds() {
        let (stream, _, _) = stream_over(b"abc", StreamConfig::default());
        stream.write(b"x").unwrap();
        stream.commit().unwrap();
        stream.close().unwrap();
    }

    #[test]
    fn open_sees_pending_records() {
        let (stream, target, backup) = stream_over(b"abc", StreamConfig::default());
        stream.write(b"XY").unwrap();
        let _ = stream.into_parts().unwrap();

        let reopened = DurableStream::open(target.clone(), backup, StreamConfig::default()).unwrap();
        assert_eq!(reopened.state().unwrap(), StreamState::Pending);
        reopened.rollback().unwrap();
        assert_eq!(target.data(), b"abc");
    }

    #[test]
    fn create_rejects_used_backup() {
        let target = InMemoryBackend::new();
        let backup = InMemoryBackend::with_data(vec![0; 8]);
        assert!(DurableStream::create(target, backup, StreamConfig::default()).is_err());
    }
}
