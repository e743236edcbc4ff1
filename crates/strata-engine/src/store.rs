//! Store: schema declaration and the shared transaction manager.
//!
//! A store is built in two phases. While open, tables, indexes and foreign
//! keys are declared; [`Store::freeze`] then fixes the schema for the
//! store's lifetime and only data operations through a [`StoreSnapshot`]
//! are legal.
//!
//! ```rust
//! use std::sync::Arc;
//! use strata_common::config::StoreConfig;
//! use strata_engine::Store;
//! use strata_mvcc::Column;
//!
//! #[derive(Clone, Default, PartialEq, Debug)]
//! struct Person {
//!     id: i64,
//!     name: String,
//! }
//!
//! let mut store = Store::new(StoreConfig::default()).unwrap();
//! let people = store.create_table::<Person>("Person").unwrap();
//! let id = Column::new("Id", 0, |p: &Person| p.id, |p, v| p.id = v);
//! store.make_primary_key(people, id.clone()).unwrap();
//! store.freeze();
//!
//! let store = Arc::new(store);
//! let view = store.snapshot().unwrap();
//! view.start_transaction().unwrap();
//! view.table(people).unwrap().insert(Person { id: 1, name: "Ann".into() }).unwrap();
//! view.commit().unwrap();
//! assert!(view.table(people).unwrap().find(&id, &1).unwrap().is_some());
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use strata_common::config::StoreConfig;
use strata_common::error::{StoreError, StoreResult};
use strata_common::types::{RowId, TableId, Version};
use strata_index::{RangeIndex, RecordIndex, UniqueIndex, UniquePseudoIndex};
use strata_mvcc::{Field, Record};
use strata_txn::{TransactionKind, TransactionManager};
use tracing::{debug, info};

use crate::foreign_key::{ForeignKey, ForeignKeyAction, PrimaryKey};
use crate::snapshot::StoreSnapshot;
use crate::table::{AnyTable, PrimaryKeySlot, Table};

/// Typed handle of a table of records `R`.
pub struct TableRef<R> {
    id: TableId,
    _record: PhantomData<fn() -> R>,
}

impl<R> TableRef<R> {
    /// Table id.
    pub fn id(&self) -> TableId {
        self.id
    }
}

impl<R> Clone for TableRef<R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for TableRef<R> {}

impl<R> PartialEq for TableRef<R> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<R> Eq for TableRef<R> {}

impl<R> fmt::Debug for TableRef<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TableRef({})", self.id.as_usize())
    }
}

/// A set of tables sharing one transaction manager.
pub struct Store {
    config: StoreConfig,
    manager: TransactionManager,
    tables: Vec<Box<dyn AnyTable>>,
    frozen: bool,
}

impl Store {
    /// Creates an empty, open store.
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        Ok(Self {
            manager: TransactionManager::new(&config),
            config,
            tables: Vec::new(),
            frozen: false,
        })
    }

    /// Store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The transaction manager.
    pub fn manager(&self) -> &TransactionManager {
        &self.manager
    }

    /// Latest completed version.
    pub fn committed_version(&self) -> Version {
        self.manager.committed_version()
    }

    /// Returns true once the schema is fixed.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Fixes the schema. Later declarations fail with `IllegalState`.
    pub fn freeze(&mut self) {
        if !self.frozen {
            self.frozen = true;
            info!(
                tables = self.tables.len(),
                stores = self.manager.registry().len(),
                "schema frozen"
            );
        }
    }

    /// Registers a callback run on the committing thread after every commit.
    pub fn subscribe(&self, listener: impl Fn(Version, TransactionKind) + Send + Sync + 'static) {
        self.manager.subscribe(listener);
    }

    /// Opens a view pinned to the latest completed version.
    pub fn snapshot(self: &Arc<Self>) -> StoreResult<StoreSnapshot> {
        if !self.frozen {
            return Err(StoreError::illegal_state("schema is not frozen"));
        }
        Ok(StoreSnapshot::new(Arc::clone(self)))
    }

    pub(crate) fn tables(&self) -> &[Box<dyn AnyTable>] {
        &self.tables
    }

    pub(crate) fn table<R: Record>(&self, table: TableRef<R>) -> StoreResult<&Table<R>> {
        self.tables
            .get(table.id.as_usize())
            .and_then(|t| t.as_any().downcast_ref::<Table<R>>())
            .ok_or_else(|| StoreError::illegal_state(format!("unknown table {}", table.id.as_usize())))
    }

    fn table_mut<R: Record>(&mut self, table: TableRef<R>) -> StoreResult<&mut Table<R>> {
        self.tables
            .get_mut(table.id.as_usize())
            .and_then(|t| t.as_any_mut().downcast_mut::<Table<R>>())
            .ok_or_else(|| StoreError::illegal_state(format!("unknown table {}", table.id.as_usize())))
    }

    fn check_open(&self, what: &str) -> StoreResult<()> {
        if self.frozen {
            return Err(StoreError::illegal_state(format!("cannot {what}: schema is frozen")));
        }
        Ok(())
    }

    // =========================================================================
    // Schema declaration
    // =========================================================================

    /// Declares a table of records `R`.
    pub fn create_table<R: Record>(&mut self, name: impl Into<String>) -> StoreResult<TableRef<R>> {
        let name = name.into();
        self.check_open("create table")?;
        if self.tables.iter().any(|t| t.name() == name) {
            return Err(StoreError::illegal_state(format!("table {name} already exists")));
        }
        let id = TableId::new(self.tables.len() as u32);
        let rows = self.manager.registry_mut().create::<R>(name.clone());
        debug!(table = %name, "table created");
        self.tables.push(Box::new(Table::new(id, name, rows)));
        Ok(TableRef {
            id,
            _record: PhantomData,
        })
    }

    /// Declares a unique index on `field`.
    pub fn make_unique<R, F>(&mut self, table: TableRef<R>, field: F) -> StoreResult<()>
    where
        R: Record,
        F: Field<R>,
    {
        self.add_unique(table, field).map(|_| ())
    }

    /// Declares a unique index on `field` and makes it the primary key.
    pub fn make_primary_key<R, F>(&mut self, table: TableRef<R>, field: F) -> StoreResult<()>
    where
        R: Record,
        F: Field<R>,
    {
        self.check_primary_free(table)?;
        let index = self.add_unique(table, field)?;
        let name = index.name().to_string();
        let lookup: Arc<dyn PrimaryKey<R, F::Value>> = index;
        self.table_mut(table)?.primary = Some(PrimaryKeySlot {
            name,
            lookup: Box::new(lookup),
        });
        Ok(())
    }

    /// Makes the row id itself the primary key of `table`.
    pub fn make_auto_unique<R: Record>(&mut self, table: TableRef<R>) -> StoreResult<()> {
        self.check_open("make auto unique")?;
        self.check_primary_free(table)?;
        let target = self.table_mut(table)?;
        let name = format!("{}.RowId", target.name());
        let index = Arc::new(UniquePseudoIndex::new(name.clone(), Arc::clone(target.rows())));
        target.add_index(Arc::clone(&index));
        let lookup: Arc<dyn PrimaryKey<R, RowId>> = index;
        target.primary = Some(PrimaryKeySlot {
            name,
            lookup: Box::new(lookup),
        });
        Ok(())
    }

    /// Declares a range index on `field`.
    pub fn create_index<R, F>(&mut self, table: TableRef<R>, field: F) -> StoreResult<()>
    where
        R: Record,
        F: Field<R>,
    {
        self.add_range(table, field).map(|_| ())
    }

    /// Declares that `field` of `child` references the primary key of
    /// `parent`. A range index on `field` is created for the parent side.
    ///
    /// With `allow_default`, a child whose column holds the field's default
    /// value needs no parent.
    pub fn create_foreign_key<C, F, P>(
        &mut self,
        child: TableRef<C>,
        field: F,
        parent: TableRef<P>,
        action: ForeignKeyAction,
        allow_default: bool,
    ) -> StoreResult<()>
    where
        C: Record,
        F: Field<C> + Clone,
        P: Record,
    {
        self.check_open("create foreign key")?;
        let parent_table = self.table(parent)?;
        let slot = parent_table
            .primary
            .as_ref()
            .ok_or_else(|| StoreError::illegal_state(format!("table {} has no primary key", parent_table.name())))?;
        let parent_key = slot
            .lookup
            .downcast_ref::<Arc<dyn PrimaryKey<P, F::Value>>>()
            .cloned()
            .ok_or_else(|| {
                StoreError::illegal_state(format!(
                    "column {} does not match the primary key type of {}",
                    field.name(),
                    parent_table.name()
                ))
            })?;
        let name = format!("{}.{}->{}", self.table(child)?.name(), field.name(), parent_table.name());

        let existing = self.table(child)?.range_index(&field).cloned();
        let child_index = match existing {
            Some(index) => index,
            None => self.add_range(child, field.clone())?,
        };
        let child_table = self.table_mut(child)?;
        let key = Arc::new(ForeignKey::new(
            name.clone(),
            field,
            action,
            allow_default,
            child.id,
            child_table.children.len(),
            child_index,
            parent_key,
        ));
        child_table.children.push(key.clone());
        self.table_mut(parent)?.parents.push(key);
        debug!(foreign_key = %name, ?action, allow_default, "foreign key created");
        Ok(())
    }

    fn check_primary_free<R: Record>(&self, table: TableRef<R>) -> StoreResult<()> {
        let target = self.table(table)?;
        if let Some(primary) = &target.primary {
            return Err(StoreError::illegal_state(format!(
                "table {} already has primary key {}",
                target.name(),
                primary.name
            )));
        }
        Ok(())
    }

    fn index_name<R: Record>(&self, table: TableRef<R>, field: &str) -> StoreResult<String> {
        let target = self.table(table)?;
        let name = format!("{}.{}", target.name(), field);
        if target.has_index_named(&name) {
            return Err(StoreError::illegal_state(format!("index {name} already exists")));
        }
        Ok(name)
    }

    fn add_unique<R, F>(&mut self, table: TableRef<R>, field: F) -> StoreResult<Arc<UniqueIndex<R, F>>>
    where
        R: Record,
        F: Field<R>,
    {
        self.check_open("create unique index")?;
        let name = self.index_name(table, field.name())?;
        let rows = Arc::clone(self.table(table)?.rows());
        let hash = self.config.hash.clone();
        let index = Arc::new(UniqueIndex::new(name, field, rows, self.manager.registry_mut(), &hash));
        self.table_mut(table)?.add_index(Arc::clone(&index));
        Ok(index)
    }

    fn add_range<R, F>(&mut self, table: TableRef<R>, field: F) -> StoreResult<Arc<RangeIndex<R, F>>>
    where
        R: Record,
        F: Field<R>,
    {
        self.check_open("create index")?;
        let name = self.index_name(table, &format!("{}.range", field.name()))?;
        let index = Arc::new(RangeIndex::new(name, field, self.manager.registry_mut()));
        self.table_mut(table)?.add_index(Arc::clone(&index));
        Ok(index)
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("tables", &self.tables.iter().map(|t| t.name()).collect::<Vec<_>>())
            .field("frozen", &self.frozen)
            .field("committed", &self.committed_version())
            .finish()
    }
}
