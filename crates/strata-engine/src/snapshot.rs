//! Views pinned to one version.
//!
//! A [`StoreSnapshot`] holds the version every one of its [`TableSnapshot`]s
//! reads at, and the transaction verbs. Starting a transaction moves the
//! view to the open version so its reads see its own writes; commit,
//! rollback, undo and redo move it to the resulting committed version.
//! Moving a view never copies data.

use std::ops::RangeBounds;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use strata_common::error::{StoreError, StoreResult};
use strata_common::types::{RowId, Version};
use strata_mvcc::{Field, Record, RowChange, VersionedStore};
use tracing::debug;

use crate::foreign_key::DeletePlan;
use crate::store::{Store, TableRef};
use crate::table::{AnyTable, Table};

/// A view of a frozen store at one version.
pub struct StoreSnapshot {
    store: Arc<Store>,
    version: AtomicU64,
}

impl StoreSnapshot {
    pub(crate) fn new(store: Arc<Store>) -> Self {
        let version = store.committed_version();
        Self {
            store,
            version: AtomicU64::new(version.as_u64()),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Version this view reads at.
    pub fn version(&self) -> Version {
        Version::new(self.version.load(Ordering::Acquire))
    }

    fn set_version(&self, version: Version) {
        self.version.store(version.as_u64(), Ordering::Release);
    }

    /// View of one table at this view's version.
    pub fn table<R: Record>(&self, table: TableRef<R>) -> StoreResult<TableSnapshot<'_, R>> {
        Ok(TableSnapshot {
            snapshot: self,
            table: self.store.table(table)?,
        })
    }

    /// Returns true if this view holds the open transaction.
    pub fn is_editing(&self) -> bool {
        let gate = self.store.manager().gate();
        gate.is_live(self.version()) && gate.is_editor()
    }

    fn require_editing(&self) -> StoreResult<Version> {
        if !self.is_editing() {
            return Err(StoreError::illegal_state("view has no open transaction"));
        }
        Ok(self.version())
    }

    fn require_idle(&self, what: &str) -> StoreResult<()> {
        if self.is_editing() {
            return Err(StoreError::illegal_state(format!(
                "cannot {what} while the view has an open transaction"
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Opens a transaction on the calling thread and moves the view to it.
    pub fn start_transaction(&self) -> StoreResult<Version> {
        let version = self.store.manager().begin()?;
        self.set_version(version);
        Ok(version)
    }

    /// Checks every foreign key affected by the open transaction.
    ///
    /// A failure leaves the transaction open; the caller decides whether to
    /// fix the data or roll back.
    pub fn prepare_commit(&self) -> StoreResult<()> {
        let version = self.require_editing()?;
        let committed = self.store.committed_version();
        for table in self.store.tables() {
            table.validate(committed, version)?;
        }
        Ok(())
    }

    /// Validates and commits the open transaction as an undoable edit.
    pub fn commit(&self) -> StoreResult<Version> {
        self.prepare_commit()?;
        let version = self.store.manager().commit()?;
        self.set_version(version);
        Ok(version)
    }

    /// Validates and commits the open transaction, excluded from undo.
    pub fn commit_omitted(&self) -> StoreResult<Version> {
        self.prepare_commit()?;
        let version = self.store.manager().commit_omitted()?;
        self.set_version(version);
        Ok(version)
    }

    /// Discards the open transaction and returns to the committed version.
    pub fn rollback(&self) -> StoreResult<()> {
        self.require_editing()?;
        self.store.manager().rollback()?;
        self.set_version(self.store.committed_version());
        Ok(())
    }

    /// Reverts the newest undoable version and moves the view to the result.
    pub fn undo(&self) -> StoreResult<Version> {
        self.require_idle("undo")?;
        let version = self.store.manager().undo()?;
        self.set_version(version);
        Ok(version)
    }

    /// Reverts the newest redoable undo and moves the view to the result.
    pub fn redo(&self) -> StoreResult<Version> {
        self.require_idle("redo")?;
        let version = self.store.manager().redo()?;
        self.set_version(version);
        Ok(version)
    }

    /// Returns true if some version can be undone.
    pub fn can_undo(&self) -> bool {
        self.store.manager().can_undo()
    }

    /// Returns true if some undo can be redone.
    pub fn can_redo(&self) -> bool {
        self.store.manager().can_redo()
    }

    /// Moves the view to the latest completed version.
    pub fn upgrade(&self) -> StoreResult<Version> {
        self.require_idle("upgrade")?;
        let version = self.store.committed_version();
        self.set_version(version);
        Ok(version)
    }

    /// Moves the view to `version`, which must already be completed.
    pub fn advance_to(&self, version: Version) -> StoreResult<()> {
        self.require_idle("move the view")?;
        let committed = self.store.committed_version();
        if version > committed {
            return Err(StoreError::illegal_state(format!(
                "cannot move the view to {version}: latest completed version is {committed}"
            )));
        }
        self.set_version(version);
        Ok(())
    }
}

impl std::fmt::Debug for StoreSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreSnapshot")
            .field("version", &self.version())
            .field("editing", &self.is_editing())
            .finish()
    }
}

/// A view of one table, reading at its store view's version.
pub struct TableSnapshot<'a, R: Record> {
    snapshot: &'a StoreSnapshot,
    table: &'a Table<R>,
}

impl<'a, R: Record> TableSnapshot<'a, R> {
    /// Version this view reads at.
    pub fn version(&self) -> Version {
        self.snapshot.version()
    }

    /// Table name.
    pub fn name(&self) -> &str {
        self.table.name()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Inserts a row.
    pub fn insert(&self, data: R) -> StoreResult<RowId> {
        self.snapshot.require_editing()?;
        self.table.insert(data)
    }

    /// Deletes a row and applies its foreign keys' delete actions.
    ///
    /// Nothing is written if any Restrict key blocks the delete.
    pub fn delete(&self, row: RowId) -> StoreResult<()> {
        let version = self.snapshot.require_editing()?;
        let tables = self.snapshot.store.tables();
        let plan = DeletePlan::build(tables, self.table.id(), row, version)?;
        debug!(
            table = %self.table.name(),
            %row,
            deletes = plan.deletes.len(),
            defaults = plan.defaults.len(),
            "delete planned"
        );

        for &(table, child, slot) in &plan.defaults {
            if !plan.is_deleted(table, child) {
                lookup(tables, table.as_usize())?.apply_default(child, slot)?;
            }
        }
        for &(table, target) in &plan.deletes {
            lookup(tables, table.as_usize())?.delete_row(target)?;
        }
        Ok(())
    }

    /// Makes a deleted row live again.
    pub fn undelete(&self, row: RowId) -> StoreResult<()> {
        self.snapshot.require_editing()?;
        self.table.undelete(row)
    }

    /// Writes one field. Returns false if the value is unchanged.
    pub fn set_field<F: Field<R>>(&self, row: RowId, field: &F, value: F::Value) -> StoreResult<bool> {
        self.snapshot.require_editing()?;
        self.table.set_field(row, field, value)
    }

    /// Replaces a row's data. Returns false if it is unchanged.
    pub fn set_data(&self, row: RowId, data: R) -> StoreResult<bool> {
        self.snapshot.require_editing()?;
        self.table.set_data(row, data)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// One field of a live row.
    pub fn get_field<F: Field<R>>(&self, row: RowId, field: &F) -> StoreResult<F::Value> {
        self.table.rows().field(row, field, self.version())
    }

    /// Data of a live row.
    pub fn get_data(&self, row: RowId) -> StoreResult<R> {
        self.table.rows().data(row, self.version())
    }

    /// Whether a row is deleted. Fails if the row did not exist yet.
    pub fn is_deleted(&self, row: RowId) -> StoreResult<bool> {
        self.table.rows().is_deleted(row, self.version())
    }

    /// Live rows in id order.
    pub fn rows(&self) -> impl Iterator<Item = RowId> + 'a {
        self.table.rows().rows(self.version())
    }

    /// Number of live rows.
    pub fn count(&self) -> usize {
        self.table.rows().live_count(self.version())
    }

    /// First row holding `value`.
    ///
    /// Uses a unique or range index on `field` when one exists, otherwise
    /// scans the table.
    pub fn find<F: Field<R>>(&self, field: &F, value: &F::Value) -> StoreResult<Option<RowId>> {
        let version = self.version();
        if let Some(index) = self.table.unique_index(field) {
            return index.find(value, version);
        }
        if let Some(index) = self.table.range_index(field) {
            return index.select(value, version)?.next().transpose();
        }
        self.scan(field, |v| v == value).map(|rows| rows.into_iter().next())
    }

    /// Returns true if some live row holds `value`.
    pub fn exists<F: Field<R>>(&self, field: &F, value: &F::Value) -> StoreResult<bool> {
        if let Some(index) = self.table.range_index(field) {
            return index.exists(value, self.version());
        }
        Ok(self.find(field, value)?.is_some())
    }

    /// All rows holding `value`, in id order.
    pub fn select<F: Field<R>>(&self, field: &F, value: &F::Value) -> StoreResult<Vec<RowId>> {
        let version = self.version();
        if let Some(index) = self.table.unique_index(field) {
            return Ok(index.find(value, version)?.into_iter().collect());
        }
        if let Some(index) = self.table.range_index(field) {
            return index.select(value, version)?.collect();
        }
        self.scan(field, |v| v == value)
    }

    /// Rows whose value lies in `range`, ascending by value then row id.
    pub fn select_range<F, B>(&self, field: &F, range: B) -> StoreResult<Vec<RowId>>
    where
        F: Field<R>,
        B: RangeBounds<F::Value>,
    {
        let version = self.version();
        if let Some(index) = self.table.range_index(field) {
            return index.select_range(range, version)?.collect();
        }
        let mut keyed = Vec::new();
        for row in self.rows() {
            let value = self.get_field(row, field)?;
            if range.contains(&value) {
                keyed.push((value, row));
            }
        }
        keyed.sort();
        Ok(keyed.into_iter().map(|(_, row)| row).collect())
    }

    /// Smallest value of `field` over the live rows.
    pub fn minimum<F: Field<R>>(&self, field: &F) -> StoreResult<Option<F::Value>> {
        if let Some(index) = self.table.range_index(field) {
            return Ok(index.first(self.version())?.map(|(value, _)| value));
        }
        self.fold(field, |best, value| value < best)
    }

    /// Largest value of `field` over the live rows.
    pub fn maximum<F: Field<R>>(&self, field: &F) -> StoreResult<Option<F::Value>> {
        if let Some(index) = self.table.range_index(field) {
            return Ok(index.last(self.version())?.map(|(value, _)| value));
        }
        self.fold(field, |best, value| value > best)
    }

    /// Rows that differ between `from` and `to`.
    pub fn changes(&self, from: Version, to: Version) -> StoreResult<Vec<RowChange<R>>> {
        self.table.rows().changes_between(from, to)
    }

    /// Rows that differ between `from` and this view's version.
    pub fn changes_since(&self, from: Version) -> StoreResult<Vec<RowChange<R>>> {
        self.changes(from, self.version())
    }

    /// Returns true if any version in `(from, to]` wrote the table.
    pub fn was_changed(&self, from: Version, to: Version) -> bool {
        self.table.rows().was_changed(from, to)
    }

    fn scan<F: Field<R>>(&self, field: &F, matches: impl Fn(&F::Value) -> bool) -> StoreResult<Vec<RowId>> {
        let mut rows = Vec::new();
        for row in self.rows() {
            if matches(&self.get_field(row, field)?) {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    fn fold<F: Field<R>>(
        &self,
        field: &F,
        better: impl Fn(&F::Value, &F::Value) -> bool,
    ) -> StoreResult<Option<F::Value>> {
        let mut best: Option<F::Value> = None;
        for row in self.rows() {
            let value = self.get_field(row, field)?;
            if best.as_ref().map_or(true, |b| better(b, &value)) {
                best = Some(value);
            }
        }
        Ok(best)
    }
}

fn lookup(tables: &[Box<dyn AnyTable>], index: usize) -> StoreResult<&dyn AnyTable> {
    tables
        .get(index)
        .map(|t| t.as_ref())
        .ok_or_else(|| StoreError::internal(format!("unknown table {index}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ForeignKeyAction, TransactionKind};
    use strata_common::config::StoreConfig;
    use strata_mvcc::Column;

    #[derive(Clone, Default, PartialEq, Debug)]
    struct Person {
        id: i64,
        name: String,
    }

    #[derive(Clone, Default, PartialEq, Debug)]
    struct Pet {
        owner: i64,
        name: String,
    }

    fn person_id() -> Column<Person, i64> {
        Column::new("Id", 0, |p: &Person| p.id, |p, v| p.id = v)
    }

    fn person_name() -> Column<Person, String> {
        Column::new("Name", 1, |p: &Person| p.name.clone(), |p, v| p.name = v)
    }

    fn pet_owner() -> Column<Pet, i64> {
        Column::new("Owner", 0, |p: &Pet| p.owner, |p, v| p.owner = v)
    }

    fn person(id: i64, name: &str) -> Person {
        Person {
            id,
            name: name.to_string(),
        }
    }

    fn pet(owner: i64, name: &str) -> Pet {
        Pet {
            owner,
            name: name.to_string(),
        }
    }

    struct Fixture {
        store: Arc<Store>,
        people: TableRef<Person>,
        pets: TableRef<Pet>,
    }

    fn create_store(action: ForeignKeyAction) -> Fixture {
        let mut store = Store::new(StoreConfig::for_testing()).unwrap();
        let people = store.create_table::<Person>("Person").unwrap();
        let pets = store.create_table::<Pet>("Pet").unwrap();
        store.make_primary_key(people, person_id()).unwrap();
        store
            .create_foreign_key(pets, pet_owner(), people, action, true)
            .unwrap();
        store.freeze();
        Fixture {
            store: Arc::new(store),
            people,
            pets,
        }
    }

    fn seed(view: &StoreSnapshot, fixture: &Fixture) -> (RowId, RowId, Vec<RowId>) {
        view.start_transaction().unwrap();
        let people = view.table(fixture.people).unwrap();
        let ann = people.insert(person(1, "Ann")).unwrap();
        let bob = people.insert(person(2, "Bob")).unwrap();
        let pets = view.table(fixture.pets).unwrap();
        let owned = vec![
            pets.insert(pet(1, "Rex")).unwrap(),
            pets.insert(pet(1, "Tom")).unwrap(),
            pets.insert(pet(2, "Kit")).unwrap(),
        ];
        view.commit().unwrap();
        (ann, bob, owned)
    }

    #[test]
    fn test_person_history() {
        let fixture = create_store(ForeignKeyAction::Restrict);
        let view = fixture.store.snapshot().unwrap();
        let name = person_name();

        view.start_transaction().unwrap();
        let ann = view.table(fixture.people).unwrap().insert(person(1, "Ann")).unwrap();
        let v1 = view.commit().unwrap();

        view.start_transaction().unwrap();
        let bob = view.table(fixture.people).unwrap().insert(person(2, "Bob")).unwrap();
        let v2 = view.commit().unwrap();

        view.start_transaction().unwrap();
        view.table(fixture.people)
            .unwrap()
            .set_field(ann, &name, "Anna".to_string())
            .unwrap();
        let v3 = view.commit().unwrap();

        for (version, expected) in [(v1, "Ann"), (v2, "Ann"), (v3, "Anna")] {
            view.advance_to(version).unwrap();
            assert_eq!(view.table(fixture.people).unwrap().get_field(ann, &name).unwrap(), expected);
        }

        view.upgrade().unwrap();
        view.start_transaction().unwrap();
        view.table(fixture.people).unwrap().delete(bob).unwrap();
        let v4 = view.commit().unwrap();
        assert!(view.table(fixture.people).unwrap().is_deleted(bob).unwrap());
        view.advance_to(v3).unwrap();
        assert!(!view.table(fixture.people).unwrap().is_deleted(bob).unwrap());

        let v5 = view.undo().unwrap();
        assert!(v5 > v4);
        let people = view.table(fixture.people).unwrap();
        assert!(!people.is_deleted(bob).unwrap());
        assert_eq!(people.get_data(bob).unwrap(), person(2, "Bob"));
        assert_eq!(people.find(&person_id(), &2).unwrap(), Some(bob));
        assert_eq!(fixture.store.manager().kind_of(v5), Some(TransactionKind::Undo));
    }

    #[test]
    fn test_writes_need_transaction() {
        let fixture = create_store(ForeignKeyAction::Restrict);
        let view = fixture.store.snapshot().unwrap();
        let err = view
            .table(fixture.people)
            .unwrap()
            .insert(person(1, "Ann"))
            .unwrap_err();
        assert!(err.is_illegal_state());
        assert!(view.rollback().unwrap_err().is_illegal_state());
        assert!(view.prepare_commit().unwrap_err().is_illegal_state());
    }

    #[test]
    fn test_view_without_editor_role_cannot_write() {
        let fixture = create_store(ForeignKeyAction::Restrict);
        let editor = fixture.store.snapshot().unwrap();
        let reader = fixture.store.snapshot().unwrap();

        editor.start_transaction().unwrap();
        assert!(editor.is_editing());
        assert!(!reader.is_editing());
        let err = reader.start_transaction().unwrap_err();
        assert!(matches!(err, StoreError::EditorBusy));
        editor.rollback().unwrap();
    }

    #[test]
    fn test_unique_violation_leaves_orphan_slot() {
        let fixture = create_store(ForeignKeyAction::Restrict);
        let view = fixture.store.snapshot().unwrap();
        seed(&view, &fixture);
        let rows = Arc::clone(fixture.store.table(fixture.people).unwrap().rows());
        let slots = rows.slot_count();

        view.start_transaction().unwrap();
        let people = view.table(fixture.people).unwrap();
        let err = people.insert(person(1, "Again")).unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { .. }));
        assert_eq!(rows.slot_count(), slots + 1);
        assert_eq!(people.count(), 2);
        view.rollback().unwrap();

        let people = view.table(fixture.people).unwrap();
        assert_eq!(people.count(), 2);
        assert_eq!(rows.slot_count(), slots + 1);
        assert_eq!(people.select(&person_id(), &1).unwrap().len(), 1);
    }

    #[test]
    fn test_failed_key_update_restores_row() {
        let fixture = create_store(ForeignKeyAction::Restrict);
        let view = fixture.store.snapshot().unwrap();
        let (ann, bob, _) = seed(&view, &fixture);
        let id = person_id();

        view.start_transaction().unwrap();
        let people = view.table(fixture.people).unwrap();
        let err = people.set_field(bob, &id, 1).unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { .. }));
        assert_eq!(people.get_field(bob, &id).unwrap(), 2);
        assert_eq!(people.find(&id, &1).unwrap(), Some(ann));
        assert_eq!(people.find(&id, &2).unwrap(), Some(bob));
        assert!(!people.set_field(ann, &id, 1).unwrap());
        view.rollback().unwrap();
    }

    #[test]
    fn test_cascade_delete() {
        let fixture = create_store(ForeignKeyAction::Cascade);
        let view = fixture.store.snapshot().unwrap();
        let (ann, _, owned) = seed(&view, &fixture);

        view.start_transaction().unwrap();
        view.table(fixture.people).unwrap().delete(ann).unwrap();
        let version = view.commit().unwrap();

        let pets = view.table(fixture.pets).unwrap();
        assert_eq!(pets.rows().collect::<Vec<_>>(), vec![owned[2]]);
        assert!(pets.select(&pet_owner(), &1).unwrap().is_empty());

        let changes = pets.changes(version.prev(), version).unwrap();
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|c| c.action == strata_mvcc::ChangeAction::Deleted));
    }

    #[test]
    fn test_restrict_blocks_delete() {
        let fixture = create_store(ForeignKeyAction::Restrict);
        let view = fixture.store.snapshot().unwrap();
        let (ann, _, _) = seed(&view, &fixture);
        let before = view.version();

        view.start_transaction().unwrap();
        let err = view.table(fixture.people).unwrap().delete(ann).unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation { .. }));
        assert!(!view.table(fixture.people).unwrap().is_deleted(ann).unwrap());
        assert_eq!(view.table(fixture.pets).unwrap().count(), 3);
        view.rollback().unwrap();
        assert_eq!(view.version(), before);
    }

    #[test]
    fn test_set_default_on_delete() {
        let fixture = create_store(ForeignKeyAction::SetDefault);
        let view = fixture.store.snapshot().unwrap();
        let (ann, _, owned) = seed(&view, &fixture);

        view.start_transaction().unwrap();
        view.table(fixture.people).unwrap().delete(ann).unwrap();
        view.commit().unwrap();

        let pets = view.table(fixture.pets).unwrap();
        assert_eq!(pets.count(), 3);
        assert_eq!(pets.get_field(owned[0], &pet_owner()).unwrap(), 0);
        assert_eq!(pets.select(&pet_owner(), &0).unwrap(), vec![owned[0], owned[1]]);
    }

    #[test]
    fn test_dangling_child_blocks_commit() {
        let fixture = create_store(ForeignKeyAction::Restrict);
        let view = fixture.store.snapshot().unwrap();
        seed(&view, &fixture);
        let committed = view.version();

        view.start_transaction().unwrap();
        view.table(fixture.pets).unwrap().insert(pet(99, "Stray")).unwrap();
        let err = view.commit().unwrap_err();
        assert!(err.is_constraint_violation());
        assert!(view.is_editing());
        assert_eq!(fixture.store.committed_version(), committed);
        view.rollback().unwrap();
        assert_eq!(view.table(fixture.pets).unwrap().count(), 3);
    }

    #[test]
    fn test_rekeyed_parent_blocks_commit() {
        let fixture = create_store(ForeignKeyAction::Restrict);
        let view = fixture.store.snapshot().unwrap();
        let (ann, _, _) = seed(&view, &fixture);

        view.start_transaction().unwrap();
        view.table(fixture.people).unwrap().set_field(ann, &person_id(), 7).unwrap();
        assert!(view.prepare_commit().unwrap_err().is_constraint_violation());

        // Restoring the key makes the transaction valid again.
        view.table(fixture.people).unwrap().set_field(ann, &person_id(), 1).unwrap();
        view.commit().unwrap();
    }

    #[test]
    fn test_default_value_needs_no_parent() {
        let fixture = create_store(ForeignKeyAction::Restrict);
        let view = fixture.store.snapshot().unwrap();
        view.start_transaction().unwrap();
        view.table(fixture.pets).unwrap().insert(pet(0, "Stray")).unwrap();
        view.commit().unwrap();
    }

    #[test]
    fn test_advance_rules() {
        let fixture = create_store(ForeignKeyAction::Restrict);
        let view = fixture.store.snapshot().unwrap();
        let (_, _, _) = seed(&view, &fixture);
        let latest = view.version();

        assert!(view.advance_to(latest.next()).unwrap_err().is_illegal_state());
        view.advance_to(Version::new(0)).unwrap();
        assert_eq!(view.table(fixture.people).unwrap().count(), 0);

        view.start_transaction().unwrap();
        assert!(view.advance_to(latest).unwrap_err().is_illegal_state());
        assert!(view.undo().unwrap_err().is_illegal_state());
        view.rollback().unwrap();
        assert_eq!(view.version(), latest);
    }

    #[test]
    fn test_reader_pinned_while_writer_commits() {
        let fixture = create_store(ForeignKeyAction::Restrict);
        let writer = fixture.store.snapshot().unwrap();
        let (ann, _, _) = seed(&writer, &fixture);
        let reader = fixture.store.snapshot().unwrap();

        writer.start_transaction().unwrap();
        writer
            .table(fixture.people)
            .unwrap()
            .set_field(ann, &person_name(), "Anna".to_string())
            .unwrap();
        assert_eq!(
            reader.table(fixture.people).unwrap().get_field(ann, &person_name()).unwrap(),
            "Ann"
        );
        writer.commit().unwrap();
        assert_eq!(
            reader.table(fixture.people).unwrap().get_field(ann, &person_name()).unwrap(),
            "Ann"
        );
        reader.upgrade().unwrap();
        assert_eq!(
            reader.table(fixture.people).unwrap().get_field(ann, &person_name()).unwrap(),
            "Anna"
        );
    }

    #[test]
    fn test_scan_fallbacks() {
        let fixture = create_store(ForeignKeyAction::Restrict);
        let view = fixture.store.snapshot().unwrap();
        seed(&view, &fixture);
        let people = view.table(fixture.people).unwrap();
        let name = person_name();

        assert_eq!(people.minimum(&name).unwrap().as_deref(), Some("Ann"));
        assert_eq!(people.maximum(&name).unwrap().as_deref(), Some("Bob"));
        assert_eq!(people.minimum(&person_id()).unwrap(), Some(1));
        assert!(people.exists(&name, &"Bob".to_string()).unwrap());
        assert!(people.find(&name, &"Eve".to_string()).unwrap().is_none());
        assert_eq!(
            people.select_range(&person_id(), 2..).unwrap(),
            people.select(&person_id(), &2).unwrap()
        );

        let pets = view.table(fixture.pets).unwrap();
        assert_eq!(pets.minimum(&pet_owner()).unwrap(), Some(1));
        assert_eq!(pets.maximum(&pet_owner()).unwrap(), Some(2));
        assert_eq!(pets.select_range(&pet_owner(), ..=1).unwrap().len(), 2);
    }

    #[test]
    fn test_commit_listeners_run_on_commit() {
        use std::sync::atomic::AtomicUsize;

        let fixture = create_store(ForeignKeyAction::Restrict);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        fixture.store.subscribe(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let view = fixture.store.snapshot().unwrap();
        seed(&view, &fixture);
        view.undo().unwrap();
        view.redo().unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }
}
