//! Foreign keys.
//!
//! A foreign key ties a child column to the primary key of a parent table.
//! It is stored twice: the child table holds it as a [`ChildLink`] to check
//! its rows at commit, the parent table holds it as a [`ParentLink`] to
//! check removed keys at commit and to plan what a delete does to children.
//!
//! Deleting a row first builds a complete [`DeletePlan`]:
//!
//! ```text
//!   delete(Order 4)
//!     └─ OrderLine.order (Cascade)   → delete OrderLine 9, OrderLine 11
//!          └─ Shipment.line (SetDefault) → default Shipment 2
//!     └─ Invoice.order (Restrict)    → violation, nothing is written
//! ```
//!
//! Rows are planned breadth-first from a work queue, and each (table, row)
//! is visited once, so long chains and reference cycles both end. Restrict
//! keys are checked after the queue drains: a child that the same delete
//! removes does not block it. Only when every Restrict check has passed are
//! defaults written and rows deleted.

use std::collections::{HashSet, VecDeque};
use std::marker::PhantomData;
use std::sync::Arc;

use strata_common::error::{StoreError, StoreResult};
use strata_common::types::{RowId, TableId, Version};
use strata_index::{RangeIndex, UniqueIndex, UniquePseudoIndex};
use strata_mvcc::{Field, Record};
use tracing::warn;

use crate::table::AnyTable;

/// What deleting a parent row does to the rows referencing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForeignKeyAction {
    /// The delete fails while any child references the parent.
    Restrict,
    /// Children are deleted along with the parent.
    Cascade,
    /// Children have the column reset to its default value.
    SetDefault,
}

/// Key lookup of a parent table's primary key.
pub(crate) trait PrimaryKey<P, V>: Send + Sync {
    /// Key stored in `record` at `row`.
    fn key_of(&self, row: RowId, record: &P) -> V;

    /// Live row holding `key` at `version`.
    fn lookup(&self, key: &V, version: Version) -> StoreResult<Option<RowId>>;
}

impl<P, F> PrimaryKey<P, F::Value> for UniqueIndex<P, F>
where
    P: Record,
    F: Field<P>,
{
    fn key_of(&self, _row: RowId, record: &P) -> F::Value {
        self.field().get(record)
    }

    fn lookup(&self, key: &F::Value, version: Version) -> StoreResult<Option<RowId>> {
        self.find(key, version)
    }
}

impl<P: Record> PrimaryKey<P, RowId> for UniquePseudoIndex<P> {
    fn key_of(&self, row: RowId, _record: &P) -> RowId {
        row
    }

    fn lookup(&self, key: &RowId, version: Version) -> StoreResult<Option<RowId>> {
        Ok(self.find(*key, version))
    }
}

/// A child row that blocks its parent's delete unless it is deleted too.
#[derive(Debug)]
struct Restriction {
    constraint: String,
    parent: RowId,
    child_table: TableId,
    child: RowId,
}

/// Rows a delete will touch, collected before anything is written.
#[derive(Debug, Default)]
pub(crate) struct DeletePlan {
    visited: HashSet<(TableId, RowId)>,
    /// Visited rows whose own children are not planned yet.
    pending: VecDeque<(TableId, RowId)>,
    restrictions: Vec<Restriction>,
    /// Rows to delete, in discovery order.
    pub deletes: Vec<(TableId, RowId)>,
    /// Child rows to reset: table, row and the child link slot in that table.
    pub defaults: Vec<(TableId, RowId, usize)>,
}

impl DeletePlan {
    /// Plans deleting `row` of `table` and everything its foreign keys
    /// cascade to.
    ///
    /// Fails with a foreign-key violation if a Restrict key still has a
    /// child that the plan does not delete.
    pub fn build(tables: &[Box<dyn AnyTable>], table: TableId, row: RowId, version: Version) -> StoreResult<Self> {
        let mut plan = Self::default();
        plan.visit(table, row);
        while let Some((table, row)) = plan.pending.pop_front() {
            tables
                .get(table.as_usize())
                .ok_or_else(|| StoreError::internal(format!("no table {table}")))?
                .plan_delete(row, version, &mut plan)?;
        }
        plan.check_restrictions()?;
        Ok(plan)
    }

    /// Queues a row for deletion. Returns false if it was already queued.
    pub fn visit(&mut self, table: TableId, row: RowId) -> bool {
        if self.visited.insert((table, row)) {
            self.deletes.push((table, row));
            self.pending.push_back((table, row));
            true
        } else {
            false
        }
    }

    /// Records that `child` blocks deleting `parent` through `constraint`.
    fn restrict(&mut self, constraint: &str, parent: RowId, child_table: TableId, child: RowId) {
        self.restrictions.push(Restriction {
            constraint: constraint.to_string(),
            parent,
            child_table,
            child,
        });
    }

    fn check_restrictions(&self) -> StoreResult<()> {
        match self
            .restrictions
            .iter()
            .find(|r| !self.is_deleted(r.child_table, r.child))
        {
            Some(r) => {
                let reason = format!("referenced by child row {}", r.child);
                warn!(constraint = %r.constraint, row = %r.parent, %reason, "foreign key violation");
                Err(StoreError::ForeignKeyViolation {
                    constraint: r.constraint.clone(),
                    row: r.parent,
                    reason,
                })
            }
            None => Ok(()),
        }
    }

    /// Returns true if the row is queued for deletion.
    pub fn is_deleted(&self, table: TableId, row: RowId) -> bool {
        self.visited.contains(&(table, row))
    }
}

/// Foreign key as seen from the parent table.
pub(crate) trait ParentLink<P>: Send + Sync {
    /// Adds what deleting parent `row` does to children to `plan`.
    fn plan_delete(&self, row: RowId, parent: &P, version: Version, plan: &mut DeletePlan) -> StoreResult<()>;

    /// Fails if the key of a parent row deleted or re-keyed in the open
    /// transaction is still referenced.
    fn check_removed(&self, row: RowId, old: &P, new: Option<&P>, version: Version) -> StoreResult<()>;
}

/// Foreign key as seen from the child table.
pub(crate) trait ChildLink<C>: Send + Sync {
    /// Fails if `child` references a parent that does not exist.
    fn check(&self, row: RowId, child: &C, version: Version) -> StoreResult<()>;

    /// Copy of `child` with the column reset to its default.
    fn with_default(&self, child: &C) -> C;
}

/// Child column `F` of `C` referencing the primary key of `P`.
pub(crate) struct ForeignKey<C, F: Field<C>, P> {
    name: String,
    field: F,
    action: ForeignKeyAction,
    allow_default: bool,
    child_table: TableId,
    /// Position of this key among the child table's child links.
    child_slot: usize,
    child_index: Arc<RangeIndex<C, F>>,
    parent_key: Arc<dyn PrimaryKey<P, F::Value>>,
    _parent: PhantomData<fn(&P)>,
}

impl<C, F, P> ForeignKey<C, F, P>
where
    C: Record,
    F: Field<C>,
    P: Record,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        field: F,
        action: ForeignKeyAction,
        allow_default: bool,
        child_table: TableId,
        child_slot: usize,
        child_index: Arc<RangeIndex<C, F>>,
        parent_key: Arc<dyn PrimaryKey<P, F::Value>>,
    ) -> Self {
        Self {
            name,
            field,
            action,
            allow_default,
            child_table,
            child_slot,
            child_index,
            parent_key,
            _parent: PhantomData,
        }
    }

    fn violation(&self, row: RowId, reason: impl Into<String>) -> StoreError {
        let reason = reason.into();
        warn!(constraint = %self.name, %row, %reason, "foreign key violation");
        StoreError::ForeignKeyViolation {
            constraint: self.name.clone(),
            row,
            reason,
        }
    }

    fn is_exempt(&self, key: &F::Value) -> bool {
        self.allow_default && *key == self.field.default_value()
    }

    fn children_of(&self, key: &F::Value, version: Version) -> StoreResult<Vec<RowId>> {
        self.child_index.select(key, version)?.collect()
    }
}

impl<C, F, P> ParentLink<P> for ForeignKey<C, F, P>
where
    C: Record,
    F: Field<C>,
    P: Record,
{
    fn plan_delete(&self, row: RowId, parent: &P, version: Version, plan: &mut DeletePlan) -> StoreResult<()> {
        let key = self.parent_key.key_of(row, parent);
        if self.is_exempt(&key) {
            return Ok(());
        }
        for child in self.children_of(&key, version)? {
            match self.action {
                ForeignKeyAction::Restrict => {
                    plan.restrict(&self.name, row, self.child_table, child);
                }
                ForeignKeyAction::Cascade => {
                    plan.visit(self.child_table, child);
                }
                ForeignKeyAction::SetDefault => {
                    plan.defaults.push((self.child_table, child, self.child_slot));
                }
            }
        }
        Ok(())
    }

    fn check_removed(&self, row: RowId, old: &P, new: Option<&P>, version: Version) -> StoreResult<()> {
        let key = self.parent_key.key_of(row, old);
        if new.is_some_and(|new| self.parent_key.key_of(row, new) == key) {
            return Ok(());
        }
        if self.is_exempt(&key) || self.parent_key.lookup(&key, version)?.is_some() {
            return Ok(());
        }
        match self.children_of(&key, version)?.first() {
            Some(child) => Err(self.violation(
                row,
                format!("removed key {key:?} is still referenced by child row {child}"),
            )),
            None => Ok(()),
        }
    }
}

impl<C, F, P> ChildLink<C> for ForeignKey<C, F, P>
where
    C: Record,
    F: Field<C>,
    P: Record,
{
    fn check(&self, row: RowId, child: &C, version: Version) -> StoreResult<()> {
        let key = self.field.get(child);
        if self.is_exempt(&key) || self.parent_key.lookup(&key, version)?.is_some() {
            return Ok(());
        }
        Err(self.violation(row, format!("no parent with key {key:?}")))
    }

    fn with_default(&self, child: &C) -> C {
        let mut updated = child.clone();
        self.field.set(&mut updated, self.field.default_value());
        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_visits_once() {
        let mut plan = DeletePlan::default();
        let table = TableId::new(1);
        assert!(plan.visit(table, RowId::new(3)));
        assert!(!plan.visit(table, RowId::new(3)));
        assert!(plan.visit(TableId::new(2), RowId::new(3)));
        assert!(plan.is_deleted(table, RowId::new(3)));
        assert!(!plan.is_deleted(table, RowId::new(4)));
        assert_eq!(plan.deletes.len(), 2);
    }

    #[test]
    fn test_restriction_lifted_by_later_visit() {
        let parents = TableId::new(0);
        let children = TableId::new(1);
        let mut plan = DeletePlan::default();
        plan.visit(parents, RowId::new(0));
        plan.restrict("Child.Parent->Parent", RowId::new(0), children, RowId::new(5));
        assert!(matches!(
            plan.check_restrictions(),
            Err(StoreError::ForeignKeyViolation { row, .. }) if row == RowId::new(0)
        ));

        plan.visit(children, RowId::new(5));
        assert!(plan.check_restrictions().is_ok());
        assert_eq!(plan.pending.len(), 2);
    }
}
