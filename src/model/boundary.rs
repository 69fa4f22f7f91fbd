//! Message boundaries: byte ranges in file coordinates.

use serde::{Deserialize, Serialize};

use super::preview::Preview;

/// A half-open byte range `[start, end)` in file coordinates.
///
/// Invariant: `start < end` for every range produced by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Create a range. Callers must uphold `start < end`.
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start < end, "empty or inverted range {start}..{end}");
        Self { start, end }
    }

    /// Length of the range in bytes.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// A range is never empty by invariant, but serde input may violate it.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// One message in the archive: its position in file order, its byte range,
/// and a cheap preview of its key header fields.
///
/// The scanner guarantees that the boundary list is strictly ordered by
/// `range.start`, contiguous (`boundaries[i].range.end ==
/// boundaries[i+1].range.start`) and that the union covers the whole file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageBoundary {
    /// 0-based position in file order.
    pub index: u32,

    /// Byte range of the message, including its `From ` separator line.
    pub range: ByteRange,

    /// Lossy summary extracted from the first few KB of the message.
    /// Always present; placeholder values on decode failure.
    pub preview: Preview,
}
