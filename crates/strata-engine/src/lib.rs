//! # strata-engine
//!
//! Tables, indexes, foreign keys and snapshots for Strata.
//!
//! A [`Store`] is declared once (tables, unique and range indexes, foreign
//! keys), frozen, and then shared behind an `Arc`. Each [`StoreSnapshot`]
//! taken from it reads at one version and can drive transactions:
//!
//! ```text
//!        Store (frozen schema, one TransactionManager)
//!          │
//!   ┌──────┴──────────┬─────────────────┐
//!   ▼                 ▼                 ▼
//! StoreSnapshot    StoreSnapshot     StoreSnapshot
//!  @ v7 (reader)    @ v9 (editor)     @ v8 (reader)
//!   │
//!   └─ TableSnapshot<Person>: find / select / rows / changes
//! ```
//!
//! Commits validate foreign keys first; undo and redo are new versions that
//! restore an earlier state, and views pinned to older versions keep seeing
//! exactly what they saw before.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Foreign key actions and checks
pub mod foreign_key;

/// Views pinned to one version
pub mod snapshot;

/// Schema declaration and the shared manager
pub mod store;

/// Tables and their index maintenance
pub mod table;

pub use foreign_key::ForeignKeyAction;
pub use snapshot::{StoreSnapshot, TableSnapshot};
pub use store::{Store, TableRef};
pub use table::Table;

pub use strata_mvcc::{ChangeAction, Column, Field, Record, RowChange};
pub use strata_txn::TransactionKind;
