//! Row store implementation.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use strata_common::error::{StoreError, StoreResult};
use strata_common::memory::PagedArray;
use strata_common::types::{RowId, StoreId, Version};
use tracing::trace;

use super::change::RowChange;
use super::entry::{is_deleted, pack, pointer, predates, Boundary, LogEntry, Row, TouchState};
use super::VersionedStore;
use crate::field::{Field, Record};
use crate::gate::TransactionGate;

/// Versioned store of fixed-shape rows.
///
/// Any number of threads may read at committed versions while the editor
/// thread writes. Reads at the open transaction's version see its writes.
pub struct RowStore<T> {
    id: StoreId,
    name: String,
    gate: Arc<TransactionGate>,
    rows: PagedArray<Row<T>>,
    log: PagedArray<LogEntry<T>>,
    boundaries: PagedArray<Boundary>,
    /// Set on the first write of the open transaction.
    touch: Mutex<Option<TouchState>>,
}

impl<T: Record> RowStore<T> {
    /// Creates an empty store bound to `gate`.
    pub fn new(id: StoreId, name: impl Into<String>, gate: Arc<TransactionGate>, page_size: usize) -> Self {
        Self {
            id,
            name: name.into(),
            gate,
            rows: PagedArray::with_page_size(page_size),
            log: PagedArray::with_page_size(page_size),
            boundaries: PagedArray::with_page_size(page_size),
            touch: Mutex::new(None),
        }
    }

    /// The gate this store is bound to.
    pub fn gate(&self) -> &Arc<TransactionGate> {
        &self.gate
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Appends a live row and returns its id.
    pub fn insert(&self, data: T) -> StoreResult<RowId> {
        self.begin_write()?;
        let row = RowId::from_index(self.rows.len())
            .ok_or_else(|| StoreError::internal(format!("row ids exhausted in {}", self.name)))?;
        self.rows.prepare_add(1);
        self.rows.fixed_add(Row { data, state: 0 });
        trace!(store = %self.name, %row, "insert");
        Ok(row)
    }

    /// Appends `count` live default rows in one reservation and returns the
    /// id of the first.
    pub fn insert_defaults(&self, count: usize) -> StoreResult<RowId> {
        self.begin_write()?;
        let first = self.rows.len();
        let exhausted = || StoreError::internal(format!("row ids exhausted in {}", self.name));
        let row = RowId::from_index(first).ok_or_else(exhausted)?;
        RowId::from_index((first + count).saturating_sub(1)).ok_or_else(exhausted)?;
        self.rows.prepare_add(count);
        self.rows.fixed_allocate(count);
        trace!(store = %self.name, %row, count, "insert defaults");
        Ok(row)
    }

    /// Marks a live row deleted.
    pub fn delete(&self, row: RowId) -> StoreResult<()> {
        let touch = self.begin_write()?;
        let current = self.live_cell(row, touch.version)?;
        let data = current.data.clone();
        self.write(row, &touch, current, data, true)
    }

    /// Makes a deleted row live again.
    pub fn undelete(&self, row: RowId) -> StoreResult<()> {
        let touch = self.begin_write()?;
        let current = self.cell(row, touch.version)?;
        if !is_deleted(current.state) {
            return Err(StoreError::illegal_state(format!(
                "row {row} of {} is not deleted",
                self.name
            )));
        }
        let data = current.data.clone();
        self.write(row, &touch, current, data, false)
    }

    /// Writes one field of a live row. Returns false if the value is unchanged.
    pub fn set_field<F: Field<T>>(&self, row: RowId, field: &F, value: F::Value) -> StoreResult<bool> {
        self.modify(row, |data| field.set(data, value))
    }

    /// Replaces the data of a live row. Returns false if it is unchanged.
    pub fn set_data(&self, row: RowId, data: T) -> StoreResult<bool> {
        self.modify(row, |current| *current = data)
    }

    /// Applies `f` to a copy of a live row and writes it back if it differs.
    pub fn modify(&self, row: RowId, f: impl FnOnce(&mut T)) -> StoreResult<bool> {
        let touch = self.begin_write()?;
        let current = self.live_cell(row, touch.version)?;
        let mut data = current.data.clone();
        f(&mut data);
        if data == current.data {
            return Ok(false);
        }
        self.write(row, &touch, current, data, false)?;
        Ok(true)
    }

    fn begin_write(&self) -> StoreResult<TouchState> {
        let version = self.gate.writable_version()?;
        let mut touch = self.touch.lock();
        match *touch {
            Some(state) if state.version == version => Ok(state),
            _ => {
                let state = TouchState {
                    version,
                    table_start: self.rows.len(),
                    log_start: self.log.len(),
                };
                *touch = Some(state);
                self.gate.mark_touched(self.id);
                trace!(store = %self.name, %version, "first write");
                Ok(state)
            }
        }
    }

    fn cell(&self, row: RowId, version: Version) -> StoreResult<Row<T>> {
        self.rows
            .get(row.as_usize())
            .ok_or_else(|| StoreError::out_of_range(&self.name, row, version))
    }

    fn live_cell(&self, row: RowId, version: Version) -> StoreResult<Row<T>> {
        let cell = self.cell(row, version)?;
        if is_deleted(cell.state) {
            return Err(StoreError::out_of_range(&self.name, row, version));
        }
        Ok(cell)
    }

    /// Overwrites a row, saving its pre-image on the first write of the
    /// transaction. Rows inserted by the transaction are never logged.
    fn write(&self, row: RowId, touch: &TouchState, current: Row<T>, data: T, deleted: bool) -> StoreResult<()> {
        let first_write = row.as_usize() < touch.table_start && predates(current.state, touch.log_start);
        let ptr = if first_write {
            let state = current.state;
            self.log.prepare_add(1);
            let at = self.log.fixed_add(LogEntry {
                data: current.data,
                row,
                prev_state: state,
            });
            at as i64 + 1
        } else {
            pointer(current.state)
        };
        self.rows
            .update(row.as_usize(), |cell| {
                cell.data = data;
                cell.state = pack(ptr, deleted);
            })
            .ok_or_else(|| StoreError::out_of_range(&self.name, row, touch.version))
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Data of a live row at `version`.
    pub fn data(&self, row: RowId, version: Version) -> StoreResult<T> {
        match self.resolve(row, version)? {
            Some((data, false)) => Ok(data),
            _ => Err(StoreError::out_of_range(&self.name, row, version)),
        }
    }

    /// One field of a live row at `version`.
    pub fn field<F: Field<T>>(&self, row: RowId, field: &F, version: Version) -> StoreResult<F::Value> {
        self.data(row, version).map(|data| field.get(&data))
    }

    /// Whether the row is deleted at `version`.
    ///
    /// Fails with `OutOfRange` if the row did not exist at `version`.
    pub fn is_deleted(&self, row: RowId, version: Version) -> StoreResult<bool> {
        match self.resolve(row, version)? {
            Some((_, deleted)) => Ok(deleted),
            None => Err(StoreError::out_of_range(&self.name, row, version)),
        }
    }

    /// Whether the row exists and is live at `version`.
    pub fn is_live(&self, row: RowId, version: Version) -> bool {
        matches!(self.is_deleted(row, version), Ok(false))
    }

    /// Data of the row at `version`, or `None` if absent or deleted.
    pub fn visible(&self, row: RowId, version: Version) -> StoreResult<Option<T>> {
        Ok(match self.resolve(row, version)? {
            Some((data, false)) => Some(data),
            _ => None,
        })
    }

    /// Number of row slots visible at `version`, live or deleted.
    pub fn len_at(&self, version: Version) -> usize {
        if self.gate.is_live(version) {
            self.rows.len()
        } else {
            self.boundary_at(version).table_size
        }
    }

    /// Number of row slots ever allocated, including rolled-back ones.
    pub fn slot_count(&self) -> usize {
        self.rows.len()
    }

    /// Live rows at `version` in id order.
    pub fn rows(&self, version: Version) -> impl Iterator<Item = RowId> + '_ {
        (0..self.len_at(version))
            .filter_map(RowId::from_index)
            .filter(move |row| self.is_live(*row, version))
    }

    /// Number of live rows at `version`.
    pub fn live_count(&self, version: Version) -> usize {
        self.rows(version).count()
    }

    /// Resolves a row to its data and deleted flag at `version`.
    ///
    /// Returns `None` if the row had not been inserted at `version`.
    fn resolve(&self, row: RowId, version: Version) -> StoreResult<Option<(T, bool)>> {
        let index = row.as_usize();
        if self.gate.is_live(version) {
            return Ok(self.rows.with(index, |cell| (cell.data.clone(), is_deleted(cell.state))));
        }

        let boundary = self.boundary_at(version);
        if index >= boundary.table_size {
            return Ok(None);
        }

        let live = self.rows.with(index, |cell| {
            if predates(cell.state, boundary.log_size) {
                Ok((cell.data.clone(), is_deleted(cell.state)))
            } else {
                Err(pointer(cell.state))
            }
        });
        let mut ptr = match live {
            Some(Ok(found)) => return Ok(Some(found)),
            Some(Err(ptr)) => ptr,
            None => return Err(self.corrupt(row)),
        };

        // Walk back to the entry whose own predecessor predates the boundary.
        loop {
            let at = (ptr - 1) as usize;
            let step = self.log.with(at, |entry| {
                if predates(entry.prev_state, boundary.log_size) {
                    Ok((entry.data.clone(), is_deleted(entry.prev_state)))
                } else {
                    Err(pointer(entry.prev_state))
                }
            });
            match step {
                Some(Ok(found)) => return Ok(Some(found)),
                Some(Err(prev)) => ptr = prev,
                None => return Err(self.corrupt(row)),
            }
        }
    }

    fn corrupt(&self, row: RowId) -> StoreError {
        StoreError::internal(format!("broken log chain for row {row} of {}", self.name))
    }

    fn boundary(&self, index: usize) -> Boundary {
        self.boundaries.get(index).unwrap_or_default()
    }

    /// Index of the first boundary with a version greater than `version`.
    fn boundary_after(&self, version: Version) -> usize {
        let (mut lo, mut hi) = (0, self.boundaries.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.boundary(mid).version <= version {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Latest boundary at or before `version`, or the empty boundary.
    fn boundary_at(&self, version: Version) -> Boundary {
        match self.boundary_after(version) {
            0 => Boundary::default(),
            n => self.boundary(n - 1),
        }
    }

    fn boundary_of(&self, version: Version) -> Option<Boundary> {
        let b = self.boundary_at(version);
        (b.version == version && !version.is_initial()).then_some(b)
    }

    /// The open transaction's touch state if it is `version`.
    fn pending_touch(&self, version: Version) -> Option<TouchState> {
        if !self.gate.is_live(version) {
            return None;
        }
        (*self.touch.lock()).filter(|t| t.version == version)
    }

    // =========================================================================
    // Change enumeration
    // =========================================================================

    /// Rows changed by exactly `version`.
    pub fn changes(&self, version: Version) -> StoreResult<Vec<RowChange<T>>> {
        self.changes_between(version.prev(), version)
    }

    /// Rows whose data or liveness differ between `from` and `to`.
    ///
    /// `to` may be the open transaction's version when called by the editor.
    pub fn changes_between(&self, from: Version, to: Version) -> StoreResult<Vec<RowChange<T>>> {
        let mut candidates = BTreeSet::new();
        let count = self.boundaries.len();
        for index in self.boundary_after(from)..count {
            let b = self.boundary(index);
            if b.version > to {
                break;
            }
            self.collect_rows(b.log_start..b.log_size, b.table_start..b.table_size, &mut candidates);
        }
        if let Some(t) = self.pending_touch(to) {
            self.collect_rows(t.log_start..self.log.len(), t.table_start..self.rows.len(), &mut candidates);
        }

        let mut changes = Vec::new();
        for row in candidates {
            let old = self.visible(row, from)?;
            let new = self.visible(row, to)?;
            if let Some(change) = RowChange::classify(row, old, new) {
                changes.push(change);
            }
        }
        Ok(changes)
    }

    /// Rows written by the open transaction, in id order.
    pub fn pending_rows(&self) -> Vec<RowId> {
        let mut rows = BTreeSet::new();
        if let Some(version) = self.gate.in_progress_version() {
            if let Some(t) = self.pending_touch(version) {
                self.collect_rows(t.log_start..self.log.len(), t.table_start..self.rows.len(), &mut rows);
            }
        }
        rows.into_iter().collect()
    }

    fn collect_rows(
        &self,
        log: std::ops::Range<usize>,
        inserted: std::ops::Range<usize>,
        into: &mut BTreeSet<RowId>,
    ) {
        for at in log {
            if let Some(row) = self.log.with(at, |entry| entry.row) {
                into.insert(row);
            }
        }
        into.extend(inserted.filter_map(RowId::from_index));
    }

    /// Writes `data` and liveness to a row unless it already matches.
    fn restore(&self, row: RowId, data: T, deleted: bool) -> StoreResult<bool> {
        let touch = self.begin_write()?;
        let current = self.cell(row, touch.version)?;
        if is_deleted(current.state) == deleted && current.data == data {
            return Ok(false);
        }
        self.write(row, &touch, current, data, deleted)?;
        Ok(true)
    }
}

impl<T: Record> VersionedStore for RowStore<T> {
    fn id(&self) -> StoreId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn commit(&self, version: Version) {
        let Some(touch) = self.touch.lock().take() else {
            return;
        };
        if touch.version != version {
            return;
        }
        let boundary = Boundary {
            version,
            table_start: touch.table_start,
            table_size: self.rows.len(),
            log_start: touch.log_start,
            log_size: self.log.len(),
        };
        self.boundaries.prepare_add(1);
        self.boundaries.fixed_add(boundary);
        trace!(store = %self.name, %version, rows = boundary.table_size, log = boundary.log_size, "commit");
    }

    fn rollback(&self) {
        let Some(touch) = self.touch.lock().take() else {
            return;
        };
        for at in (touch.log_start..self.log.len()).rev() {
            if let Some(entry) = self.log.get(at) {
                self.rows.update(entry.row.as_usize(), |cell| {
                    cell.data = entry.data;
                    cell.state = entry.prev_state;
                });
            }
        }
        for index in touch.table_start..self.rows.len() {
            self.rows.update(index, |cell| cell.state = pack(0, true));
        }
        trace!(store = %self.name, version = %touch.version, "rollback");
    }

    fn revert(&self, version: Version) -> StoreResult<bool> {
        let Some(b) = self.boundary_of(version) else {
            return Ok(false);
        };
        let mut changed = false;
        for at in b.log_start..b.log_size {
            let entry = self
                .log
                .get(at)
                .ok_or_else(|| StoreError::internal(format!("missing log entry {at} in {}", self.name)))?;
            changed |= self.restore(entry.row, entry.data, is_deleted(entry.prev_state))?;
        }
        for row in (b.table_start..b.table_size).filter_map(RowId::from_index) {
            let touch = self.begin_write()?;
            let current = self.cell(row, touch.version)?;
            if !is_deleted(current.state) {
                let data = current.data.clone();
                self.write(row, &touch, current, data, true)?;
                changed = true;
            }
        }
        trace!(store = %self.name, %version, changed, "revert");
        Ok(changed)
    }

    fn was_changed(&self, from: Version, to: Version) -> bool {
        let index = self.boundary_after(from);
        if index < self.boundaries.len() && self.boundary(index).version <= to {
            return true;
        }
        self.pending_touch(to).is_some()
    }
}

impl<T> std::fmt::Debug for RowStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStore")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("rows", &self.rows.len())
            .field("log", &self.log.len())
            .field("boundaries", &self.boundaries.len())
            .finish()
    }
}
