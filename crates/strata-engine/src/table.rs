//! Tables: a row store plus its indexes and foreign keys.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use strata_common::error::{StoreError, StoreResult};
use strata_common::types::{RowId, TableId, Version};
use strata_index::{RecordIndex, RangeIndex, UniqueIndex};
use strata_mvcc::{Field, Record, RowStore};
use tracing::trace;

use crate::foreign_key::{ChildLink, DeletePlan, ParentLink};

/// Type-erased table, as held by the store.
pub(crate) trait AnyTable: Send + Sync {
    fn name(&self) -> &str;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Adds the consequences of deleting `row` to `plan`.
    fn plan_delete(&self, row: RowId, version: Version, plan: &mut DeletePlan) -> StoreResult<()>;

    /// Resets the column of child link `slot` in `row` to its default.
    fn apply_default(&self, row: RowId, slot: usize) -> StoreResult<()>;

    /// Removes `row` from every index and marks it deleted.
    fn delete_row(&self, row: RowId) -> StoreResult<()>;

    /// Checks every foreign key touched by the transaction open at `version`.
    fn validate(&self, committed: Version, version: Version) -> StoreResult<()>;
}

/// Primary key: the name of its index and a boxed `Arc<dyn PrimaryKey<R, V>>`.
pub(crate) struct PrimaryKeySlot {
    pub name: String,
    pub lookup: Box<dyn Any + Send + Sync>,
}

/// One table of records `R`.
pub struct Table<R: Record> {
    id: TableId,
    name: String,
    rows: Arc<RowStore<R>>,
    /// Every distinct index, each touched once per insert or delete.
    indexes: Vec<Arc<dyn RecordIndex<R>>>,
    /// Positions in `indexes` of the indexes reading each column.
    by_column: HashMap<usize, Vec<usize>>,
    /// Typed handles for lookups, parallel to `indexes`.
    typed: Vec<Box<dyn Any + Send + Sync>>,
    pub(crate) primary: Option<PrimaryKeySlot>,
    /// Foreign keys where this table is the parent.
    pub(crate) parents: Vec<Arc<dyn ParentLink<R>>>,
    /// Foreign keys where this table is the child.
    pub(crate) children: Vec<Arc<dyn ChildLink<R>>>,
}

impl<R: Record> Table<R> {
    pub(crate) fn new(id: TableId, name: String, rows: Arc<RowStore<R>>) -> Self {
        Self {
            id,
            name,
            rows,
            indexes: Vec::new(),
            by_column: HashMap::new(),
            typed: Vec::new(),
            primary: None,
            parents: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Table id.
    pub fn id(&self) -> TableId {
        self.id
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The backing row store.
    pub fn rows(&self) -> &Arc<RowStore<R>> {
        &self.rows
    }

    /// Attaches an index. `typed` is the same index as its concrete `Arc`.
    pub(crate) fn add_index<I>(&mut self, index: Arc<I>)
    where
        I: RecordIndex<R> + 'static,
    {
        let position = self.indexes.len();
        for column in index.columns() {
            self.by_column.entry(column).or_default().push(position);
        }
        self.typed.push(Box::new(Arc::clone(&index)));
        self.indexes.push(index);
    }

    pub(crate) fn has_index_named(&self, name: &str) -> bool {
        self.indexes.iter().any(|index| index.name() == name)
    }

    /// Unique index built over exactly `field`.
    pub(crate) fn unique_index<F: Field<R>>(&self, field: &F) -> Option<&Arc<UniqueIndex<R, F>>> {
        self.typed_index(field.columns())
    }

    /// Range index built over exactly `field`.
    pub(crate) fn range_index<F: Field<R>>(&self, field: &F) -> Option<&Arc<RangeIndex<R, F>>> {
        self.typed_index(field.columns())
    }

    fn typed_index<T: 'static>(&self, columns: Vec<usize>) -> Option<&Arc<T>> {
        self.indexes
            .iter()
            .zip(&self.typed)
            .filter(|(index, _)| index.columns() == columns)
            .find_map(|(_, typed)| typed.downcast_ref::<Arc<T>>())
    }

    /// Writable version, or an error if the caller cannot write.
    fn live(&self) -> StoreResult<Version> {
        self.rows.gate().writable_version()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Inserts a row and adds it to every index.
    ///
    /// The row id is consumed even when an index rejects the key; the slot
    /// is left deleted and the keys already added are removed again.
    pub(crate) fn insert(&self, data: R) -> StoreResult<RowId> {
        let row = self.rows.insert(data.clone())?;
        for (position, index) in self.indexes.iter().enumerate() {
            if let Err(e) = index.insert(row, &data) {
                for done in self.indexes[..position].iter().rev() {
                    done.remove(row, &data)?;
                }
                self.rows.delete(row)?;
                return Err(e);
            }
        }
        trace!(table = %self.name, %row, "inserted");
        Ok(row)
    }

    /// Updates one field, maintaining the indexes that read it.
    pub(crate) fn set_field<F: Field<R>>(&self, row: RowId, field: &F, value: F::Value) -> StoreResult<bool> {
        let version = self.live()?;
        let old = self.rows.data(row, version)?;
        let mut new = old.clone();
        field.set(&mut new, value);
        if new == old {
            return Ok(false);
        }
        let mut positions: Vec<usize> = field
            .columns()
            .iter()
            .filter_map(|column| self.by_column.get(column))
            .flatten()
            .copied()
            .collect();
        positions.sort_unstable();
        positions.dedup();
        self.replace(row, old, new, &positions)?;
        Ok(true)
    }

    /// Replaces a row's data, maintaining every index whose key changes.
    pub(crate) fn set_data(&self, row: RowId, data: R) -> StoreResult<bool> {
        let version = self.live()?;
        let old = self.rows.data(row, version)?;
        if data == old {
            return Ok(false);
        }
        let positions: Vec<usize> = (0..self.indexes.len()).collect();
        self.replace(row, old, data, &positions)?;
        Ok(true)
    }

    /// Removes old keys, writes the data, then inserts new keys. On failure
    /// the old data and keys are restored before the error is returned.
    fn replace(&self, row: RowId, old: R, new: R, positions: &[usize]) -> StoreResult<()> {
        let affected: Vec<&Arc<dyn RecordIndex<R>>> = positions
            .iter()
            .map(|&p| &self.indexes[p])
            .filter(|index| index.key_changed(&old, &new))
            .collect();

        for (done, index) in affected.iter().enumerate() {
            if let Err(e) = index.remove(row, &old) {
                for undo in affected[..done].iter().rev() {
                    undo.insert(row, &old)?;
                }
                return Err(e);
            }
        }
        self.rows.set_data(row, new.clone())?;
        for (done, index) in affected.iter().enumerate() {
            if let Err(e) = index.insert(row, &new) {
                for undo in affected[..done].iter().rev() {
                    undo.remove(row, &new)?;
                }
                self.rows.set_data(row, old.clone())?;
                for restore in &affected {
                    restore.insert(row, &old)?;
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Makes a deleted row live again and re-adds its keys.
    pub(crate) fn undelete(&self, row: RowId) -> StoreResult<()> {
        self.rows.undelete(row)?;
        let data = self.rows.data(row, self.live()?)?;
        for (position, index) in self.indexes.iter().enumerate() {
            if let Err(e) = index.insert(row, &data) {
                for done in self.indexes[..position].iter().rev() {
                    done.remove(row, &data)?;
                }
                self.rows.delete(row)?;
                return Err(e);
            }
        }
        Ok(())
    }
}

impl<R: Record> AnyTable for Table<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn plan_delete(&self, row: RowId, version: Version, plan: &mut DeletePlan) -> StoreResult<()> {
        let data = self.rows.data(row, version)?;
        for link in &self.parents {
            link.plan_delete(row, &data, version, plan)?;
        }
        Ok(())
    }

    fn apply_default(&self, row: RowId, slot: usize) -> StoreResult<()> {
        let link = self
            .children
            .get(slot)
            .ok_or_else(|| StoreError::internal(format!("no foreign key {slot} on {}", self.name)))?;
        let data = self.rows.data(row, self.live()?)?;
        self.set_data(row, link.with_default(&data))?;
        Ok(())
    }

    fn delete_row(&self, row: RowId) -> StoreResult<()> {
        let data = self.rows.data(row, self.live()?)?;
        for index in &self.indexes {
            index.remove(row, &data)?;
        }
        self.rows.delete(row)?;
        trace!(table = %self.name, %row, "deleted");
        Ok(())
    }

    fn validate(&self, committed: Version, version: Version) -> StoreResult<()> {
        if !self.children.is_empty() {
            for row in self.rows.pending_rows() {
                if let Some(data) = self.rows.visible(row, version)? {
                    for link in &self.children {
                        link.check(row, &data, version)?;
                    }
                }
            }
        }
        if !self.parents.is_empty() {
            for change in self.rows.changes_between(committed, version)? {
                if let Some(old) = &change.old {
                    for link in &self.parents {
                        link.check_removed(change.row, old, change.new.as_ref(), version)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl<R: Record> std::fmt::Debug for Table<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("indexes", &self.indexes.len())
            .field("primary", &self.primary.as_ref().map(|p| &p.name))
            .finish()
    }
}
