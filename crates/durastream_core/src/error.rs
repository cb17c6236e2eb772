//! Error types for durastream core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in durastream core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] durastream_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed call-site input.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the bad argument.
        message: String,
    },

    /// Backup log content violates a structural or ordering invariant.
    #[error("backup log corruption: {message}")]
    DataCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// A record failed validation while walking a backup log.
    #[error("backup log corrupt at record {record}: {source}")]
    LogCorruption {
        /// One-based sequence number of the failing record (0 = header).
        record: u64,
        /// What went wrong with it.
        #[source]
        source: Box<CoreError>,
    },

    /// An internal invariant that holds by construction was violated.
    ///
    /// Indicates a log written by an incompatible version or a defect,
    /// never a condition the caller can recover from.
    #[error("unrecoverable: {message}")]
    Unrecoverable {
        /// Description of the violated invariant.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// A suspend-capable operation observed its cancellation flag.
    #[error("operation cancelled")]
    Cancelled,

    /// A mutation failed and the automatic rollback that followed failed too.
    #[error("rollback failed after {cause}; rollback error: {rollback}")]
    RollbackFailed {
        /// The failure that triggered the rollback.
        cause: Box<CoreError>,
        /// The failure of the rollback itself.
        rollback: Box<CoreError>,
    },

    /// The stream suffered a failed rollback and must not be used again.
    #[error("stream is poisoned by an earlier failed rollback")]
    Poisoned,
}

impl CoreError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a data corruption error.
    pub fn data_corruption(message: impl Into<String>) -> Self {
        Self::DataCorruption {
            message: message.into(),
        }
    }

    /// Wraps an error as the failure of a given log record.
    pub fn log_corruption(record: u64, source: CoreError) -> Self {
        Self::LogCorruption {
            record,
            source: Box::new(source),
        }
    }

    /// Creates an unrecoverable error.
    pub fn unrecoverable(message: impl Into<String>) -> Self {
        Self::Unrecoverable {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Combines a mutation failure with the failure of its rollback.
    pub fn rollback_failed(cause: CoreError, rollback: CoreError) -> Self {
        Self::RollbackFailed {
            cause: Box::new(cause),
            rollback: Box::new(rollback),
        }
    }

    /// Returns true if the error describes damaged backup log content.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::DataCorruption { .. } | Self::LogCorruption { .. }
        )
    }

    /// Returns true if the error leaves the stream unusable.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::RollbackFailed { .. } | Self::Poisoned | Self::Unrecoverable { .. }
        )
    }
}

impl From<CoreError> for io::Error {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Io(inner) => inner,
            CoreError::Storage(durastream_storage::StorageError::Io(inner)) => inner,
            CoreError::InvalidArgument { .. } => io::Error::new(io::ErrorKind::InvalidInput, err),
            CoreError::DataCorruption { .. } | CoreError::LogCorruption { .. } => {
                io::Error::new(io::ErrorKind::InvalidData, err)
            }
            CoreError::Cancelled => io::Error::new(io::ErrorKind::Interrupted, err),
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollback_failed_mentions_both_causes() {
        let err = CoreError::rollback_failed(
            CoreError::invalid_operation("disk full"),
            CoreError::data_corruption("bad record"),
        );
        let text = err.to_string();
        assert!(text.contains("disk full"));
        assert!(text.contains("bad record"));
        assert!(err.is_fatal());
    }

    #[test]
    fn log_corruption_names_record() {
        let err = CoreError::log_corruption(3, CoreError::data_corruption("timestamp"));
        assert_eq!(
            err.to_string(),
            "backup log corrupt at record 3: backup log corruption: timestamp"
        );
        assert!(err.is_corruption());
    }

    #[test]
    fn io_conversion_keeps_kind() {
        let err: io::Error = CoreError::invalid_argument("negative length").into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        let err: io::Error = CoreError::data_corruption("x").into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let err: io::Error = CoreError::Io(io::Error::new(io::ErrorKind::NotFound, "gone")).into();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
