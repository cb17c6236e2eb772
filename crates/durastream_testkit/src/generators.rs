//! Property-based test generators using proptest.
//!
//! Operations stay within small bounds so shrinking produces readable
//! counterexamples.

use proptest::prelude::*;

/// Largest offset or length a generated operation touches.
pub const MAX_EXTENT: u64 = 256;

/// A mutation to apply to a durable stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOp {
    /// Write `data` at `offset`.
    Write {
        /// Position to seek to before writing.
        offset: u64,
        /// Bytes to write.
        data: Vec<u8>,
    },
    /// Set the stream length.
    SetLen(u64),
}

/// Strategy for initial target contents.
pub fn contents_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..MAX_EXTENT as usize)
}

/// Strategy for a single mutation.
pub fn stream_op_strategy() -> impl Strategy<Value = StreamOp> {
    prop_oneof![
        3 => (0..MAX_EXTENT, prop::collection::vec(any::<u8>(), 0..64))
            .prop_map(|(offset, data)| StreamOp::Write { offset, data }),
        1 => (0..MAX_EXTENT).prop_map(StreamOp::SetLen),
    ]
}

/// Strategy for a sequence of mutations.
pub fn stream_ops_strategy(max_len: usize) -> impl Strategy<Value = Vec<StreamOp>> {
    prop::collection::vec(stream_op_strategy(), 0..max_len)
}

/// Applies `ops` to a plain byte vector.
///
/// This is the reference model durable streams are checked against.
pub fn apply_to_model(model: &mut Vec<u8>, ops: &[StreamOp]) {
    for op in ops {
        match op {
            StreamOp::Write { offset, data } => {
                if data.is_empty() {
                    continue;
                }
                let start = *offset as usize;
                let end = start + data.len();
                if model.len() < end {
                    model.resize(end, 0);
                }
                model[start..end].copy_from_slice(data);
            }
            StreamOp::SetLen(len) => model.resize(*len as usize, 0),
        }
    }
}
