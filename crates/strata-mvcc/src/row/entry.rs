//! Cell layouts of the rows, log and boundary arrays.

use strata_common::types::{RowId, Version};

/// Live value of one row.
#[derive(Clone, Default)]
pub(crate) struct Row<T> {
    pub data: T,
    /// Packed log pointer and deleted flag, see [`pack`].
    pub state: i64,
}

/// Pre-image of a row as it was before its first write in a transaction.
#[derive(Clone, Default)]
pub(crate) struct LogEntry<T> {
    pub data: T,
    pub row: RowId,
    /// The row's state before the write.
    pub prev_state: i64,
}

/// Array sizes recorded when `version` committed.
///
/// `table_start` and `log_start` are the sizes at the time the transaction
/// first wrote the store; everything in between belongs to `version`.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub(crate) struct Boundary {
    pub version: Version,
    pub table_start: usize,
    pub table_size: usize,
    pub log_start: usize,
    pub log_size: usize,
}

/// Sizes captured on the first write of an open transaction.
#[derive(Clone, Copy, Debug)]
pub(crate) struct TouchState {
    pub version: Version,
    pub table_start: usize,
    pub log_start: usize,
}

// A pointer is a log index plus one; 0 means the row was never logged.
// Deleted rows store the bitwise complement of their pointer.

#[inline]
pub(crate) const fn pack(pointer: i64, deleted: bool) -> i64 {
    if deleted {
        !pointer
    } else {
        pointer
    }
}

#[inline]
pub(crate) const fn pointer(state: i64) -> i64 {
    if state < 0 {
        !state
    } else {
        state
    }
}

#[inline]
pub(crate) const fn is_deleted(state: i64) -> bool {
    state < 0
}

/// Returns true if `state` points at nothing newer than `log_size`.
#[inline]
pub(crate) const fn predates(state: i64, log_size: usize) -> bool {
    let p = pointer(state);
    p == 0 || ((p - 1) as usize) < log_size
}
