//! Per-level pagination state.

use serde::Serialize;

/// Pagination cursor of one tree level.
///
/// `offset` is where the level started, `loaded` the number of entries the
/// server has returned for it, duplicates included.
/// `offset + loaded <= total` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageCursor {
    pub offset: u64,
    pub limit: u64,
    pub total: u64,
    pub loaded: u64,
}

impl PageCursor {
    /// Create a cursor, raising `total` if the server returned more than it
    /// announced.
    pub fn new(offset: u64, limit: u64, total: u64, loaded: u64) -> Self {
        Self {
            offset,
            limit,
            total: total.max(offset + loaded),
            loaded,
        }
    }

    /// Offset of the next page.
    pub fn next_offset(&self) -> u64 {
        self.offset + self.loaded
    }

    /// Whether a sentinel belongs at the end of the level.
    pub fn has_more(&self) -> bool {
        self.next_offset() < self.total
    }

    pub fn remaining(&self) -> u64 {
        self.total - self.next_offset()
    }
}
