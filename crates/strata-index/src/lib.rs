//! # strata-index
//!
//! Secondary indexes for Strata tables.
//!
//! Every index keeps its own state in row stores registered with the same
//! gate as the table it indexes, so index lookups at an old version see the
//! index exactly as it was at that version, and undo/redo restore index
//! state together with table data.
//!
//! This crate implements:
//! - [`UniqueIndex`]: open-addressing hash index, one row per key
//! - [`RangeIndex`]: B-tree over (value, row id), any number of rows per key
//! - [`UniquePseudoIndex`]: the row id itself as a unique key

#![warn(missing_docs)]
#![warn(clippy::all)]

/// B-tree range index
pub mod btree;

/// Hash unique index
pub mod hash;

use std::any::Any;
use std::sync::Arc;

use strata_common::error::StoreResult;
use strata_common::types::{RowId, Version};
use strata_mvcc::{Record, RowStore};

pub use btree::{RangeIndex, RangeIter};
pub use hash::UniqueIndex;

/// Type-erased index over records of type `R`.
///
/// Tables hold their indexes through this trait and fan inserts, removals
/// and field updates out to them. Typed lookups go through [`Self::as_any`].
pub trait RecordIndex<R: Record>: Send + Sync {
    /// Index name used in errors and logs.
    fn name(&self) -> &str;

    /// Ordinals of the columns the key is built from.
    fn columns(&self) -> Vec<usize>;

    /// Returns true if the index rejects duplicate keys.
    fn is_unique(&self) -> bool;

    /// Adds the key of `record`, stored at `row`.
    fn insert(&self, row: RowId, record: &R) -> StoreResult<()>;

    /// Removes the key of `record`, stored at `row`.
    fn remove(&self, row: RowId, record: &R) -> StoreResult<()>;

    /// Returns true if `old` and `new` have different keys.
    fn key_changed(&self, old: &R, new: &R) -> bool;

    /// Downcasting hook for typed lookups.
    fn as_any(&self) -> &dyn Any;
}

/// Unique index whose key is the row id.
///
/// Lets a table without a natural unique column be the parent of a foreign
/// key. It keeps no state; lookups ask the table whether the row is live.
pub struct UniquePseudoIndex<R> {
    name: String,
    table: Arc<RowStore<R>>,
}

impl<R: Record> UniquePseudoIndex<R> {
    /// Creates a pseudo index over `table`.
    pub fn new(name: impl Into<String>, table: Arc<RowStore<R>>) -> Self {
        Self {
            name: name.into(),
            table,
        }
    }

    /// Returns `row` if it is live at `version`.
    pub fn find(&self, row: RowId, version: Version) -> Option<RowId> {
        self.table.is_live(row, version).then_some(row)
    }

    /// Returns true if `row` is live at `version`.
    pub fn exists(&self, row: RowId, version: Version) -> bool {
        self.table.is_live(row, version)
    }
}

impl<R: Record> RecordIndex<R> for UniquePseudoIndex<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> Vec<usize> {
        Vec::new()
    }

    fn is_unique(&self) -> bool {
        true
    }

    fn insert(&self, _row: RowId, _record: &R) -> StoreResult<()> {
        Ok(())
    }

    fn remove(&self, _row: RowId, _record: &R) -> StoreResult<()> {
        Ok(())
    }

    fn key_changed(&self, _old: &R, _new: &R) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
