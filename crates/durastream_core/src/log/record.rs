//! Backup record types and serialization.

use crate::error::{CoreError, CoreResult};
use crate::types::Timestamp;

/// Size of the log header: the target length at initialization (i64).
pub const HEADER_SIZE: u64 = 8;

/// Size of the discriminator that starts every record.
pub const TAG_SIZE: usize = 1;

/// Fixed body of a write-undo record:
/// timestamp (8) + offset (8) + length (8) + original length (8).
pub const WRITE_UNDO_FIXED_SIZE: usize = 32;

/// Body of a length-undo record:
/// timestamp (8) + old length (8) + new length (8).
pub const LENGTH_UNDO_SIZE: usize = 24;

/// Type of backup record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// Undo information for a write.
    WriteUndo = 1,
    /// Undo information for a length change.
    LengthUndo = 2,
}

impl RecordType {
    /// Converts a byte to a record type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::WriteUndo),
            2 => Some(Self::LengthUndo),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Returns a short upper-case name for listings.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::WriteUndo => "WRITE",
            Self::LengthUndo => "LENGTH",
        }
    }
}

/// One undo entry in a backup log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupRecord {
    /// Restores the target after a write of `length` bytes at `offset`.
    WriteUndo {
        /// When the record was written.
        timestamp: Timestamp,
        /// Target offset of the write.
        offset: u64,
        /// Number of bytes written.
        length: u64,
        /// Target length just before the write.
        original_length: u64,
        /// Bytes the write overwrote; empty for a pure append.
        original_bytes: Vec<u8>,
    },

    /// Restores the target length after a length change.
    LengthUndo {
        /// When the record was written.
        timestamp: Timestamp,
        /// Target length before the change.
        old_length: u64,
        /// Target length requested by the change.
        new_length: u64,
    },
}

/// Number of pre-existing bytes a write of `length` at `offset` overwrites
/// on a target that was `original_length` long.
#[must_use]
pub fn overwritten_len(offset: u64, length: u64, original_length: u64) -> u64 {
    original_length.saturating_sub(offset).min(length)
}

impl BackupRecord {
    /// Returns the record type.
    #[must_use]
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::WriteUndo { .. } => RecordType::WriteUndo,
            Self::LengthUndo { .. } => RecordType::LengthUndo,
        }
    }

    /// Returns when the record was written.
    #[must_use]
    pub fn timestamp(&self) -> Timestamp {
        match self {
            Self::WriteUndo { timestamp, .. } | Self::LengthUndo { timestamp, .. } => *timestamp,
        }
    }

    /// Returns the encoded size of the record, discriminator included.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::WriteUndo { original_bytes, .. } => {
                TAG_SIZE + WRITE_UNDO_FIXED_SIZE + original_bytes.len()
            }
            Self::LengthUndo { .. } => TAG_SIZE + LENGTH_UNDO_SIZE,
        }
    }

    /// Serializes the record, discriminator first.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error if a field does not fit the
    /// signed on-disk representation, or if the pre-image length does not
    /// match the overwritten region.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.push(self.record_type().as_byte());

        match self {
            Self::WriteUndo {
                timestamp,
                offset,
                length,
                original_length,
                original_bytes,
            } => {
                let expected = overwritten_len(*offset, *length, *original_length);
                if original_bytes.len() as u64 != expected {
                    return Err(CoreError::invalid_argument(format!(
                        "write-undo pre-image is {} bytes, overwritten region is {} bytes",
                        original_bytes.len(),
                        expected
                    )));
                }
                buf.extend_from_slice(&timestamp.as_micros().to_le_bytes());
                put_length(&mut buf, *offset, "offset")?;
                put_length(&mut buf, *length, "length")?;
                put_length(&mut buf, *original_length, "original length")?;
                buf.extend_from_slice(original_bytes);
            }

            Self::LengthUndo {
                timestamp,
                old_length,
                new_length,
            } => {
                buf.extend_from_slice(&timestamp.as_micros().to_le_bytes());
                put_length(&mut buf, *old_length, "old length")?;
                put_length(&mut buf, *new_length, "new length")?;
            }
        }

        Ok(buf)
    }

    /// Deserializes the fixed part of a record body.
    ///
    /// For a write-undo record the returned record has an empty pre-image
    /// and the second value is the number of pre-image bytes that follow.
    pub(crate) fn decode_fixed(record_type: RecordType, body: &[u8]) -> CoreResult<(Self, u64)> {
        let mut cursor = 0;

        let mut read_i64 = |name: &str| -> CoreResult<i64> {
            let bytes: [u8; 8] = body
                .get(cursor..cursor + 8)
                .and_then(|s| s.try_into().ok())
                .ok_or_else(|| CoreError::data_corruption(format!("unexpected end of {name}")))?;
            cursor += 8;
            Ok(i64::from_le_bytes(bytes))
        };

        let timestamp = Timestamp::from_micros(read_i64("timestamp")?);

        match record_type {
            RecordType::WriteUndo => {
                let offset = non_negative(read_i64("offset")?, "offset")?;
                let length = non_negative(read_i64("length")?, "length")?;
                let original_length =
                    non_negative(read_i64("original length")?, "original length")?;
                if offset.checked_add(length).map_or(true, |end| end > i64::MAX as u64) {
                    return Err(CoreError::data_corruption(format!(
                        "write-undo range {offset}+{length} overflows"
                    )));
                }
                let preimage = overwritten_len(offset, length, original_length);
                Ok((
                    Self::WriteUndo {
                        timestamp,
                        offset,
                        length,
                        original_length,
                        original_bytes: Vec::new(),
                    },
                    preimage,
                ))
            }

            RecordType::LengthUndo => {
                let old_length = non_negative(read_i64("old length")?, "old length")?;
                let new_length = non_negative(read_i64("new length")?, "new length")?;
                Ok((
                    Self::LengthUndo {
                        timestamp,
                        old_length,
                        new_length,
                    },
                    0,
                ))
            }
        }
    }

    /// Checks the record against the target length implied by the records
    /// before it.
    ///
    /// # Errors
    ///
    /// Returns a data corruption error if a length-undo claims the target was
    /// shorter than the preceding records leave it. A write-undo's original
    /// length is not checked: a length change that failed after its record
    /// was logged leaves the real length behind the tracked one.
    pub fn validate_against(&self, tracked_length: u64) -> CoreResult<()> {
        match self {
            Self::LengthUndo { old_length, .. } if *old_length < tracked_length => {
                Err(CoreError::data_corruption(format!(
                    "length-undo old length {old_length} is below tracked length {tracked_length}"
                )))
            }
            _ => Ok(()),
        }
    }

    /// Returns the tracked target length after this record.
    ///
    /// Only length changes move the tracked length.
    #[must_use]
    pub fn next_tracked_length(&self, tracked_length: u64) -> u64 {
        match self {
            Self::LengthUndo { new_length, .. } => *new_length,
            Self::WriteUndo { .. } => tracked_length,
        }
    }
}

fn put_length(buf: &mut Vec<u8>, value: u64, name: &str) -> CoreResult<()> {
    let value = i64::try_from(value)
        .map_err(|_| CoreError::invalid_argument(format!("{name} {value} exceeds i64::MAX")))?;
    buf.extend_from_slice(&value.to_le_bytes());
    Ok(())
}

fn non_negative(value: i64, name: &str) -> CoreResult<u64> {
    u64::try_from(value)
        .map_err(|_| CoreError::data_corruption(format!("negative {name} {value}")))
}
