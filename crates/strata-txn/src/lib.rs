//! # strata-txn
//!
//! Transaction manager for Strata.
//!
//! One [`TransactionManager`] owns every row store of a schema and
//! sequences all writes to them:
//!
//! - **Single writer**: `begin` grants the editor role to the calling thread
//!   or fails immediately. Readers of committed versions never wait.
//!
//! - **Version history**: every commit, undo and redo consumes one version
//!   and appends its [`TransactionKind`] to the history.
//!
//! - **Undo/redo**: reverting a past transaction is itself a transaction, so
//!   undo of an undo is a redo.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                  TransactionManager                   │
//! │                                                       │
//! │   ┌──────────────────┐        ┌───────────────────┐   │
//! │   │ TransactionGate  │        │ history           │   │
//! │   │ editor, versions │        │ Edit Edit Undo .. │   │
//! │   └──────────────────┘        └───────────────────┘   │
//! │            │                                          │
//! │            ▼                                          │
//! │   ┌──────────────────────────────────────────────┐    │
//! │   │ StoreRegistry: table and index row stores    │    │
//! │   └──────────────────────────────────────────────┘    │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! # Example Usage
//!
//! ```rust
//! use strata_common::config::StoreConfig;
//! use strata_txn::TransactionManager;
//!
//! let mut manager = TransactionManager::new(&StoreConfig::default());
//! let numbers = manager.registry_mut().create::<i64>("Numbers");
//!
//! manager.begin().unwrap();
//! let row = numbers.insert(42).unwrap();
//! let v1 = manager.commit().unwrap();
//!
//! manager.undo().unwrap();
//! assert!(!numbers.is_live(row, manager.committed_version()));
//! assert!(numbers.is_live(row, v1));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Transaction kinds and undo/redo scans
pub mod history;

/// Transaction manager
pub mod manager;

pub use history::TransactionKind;
pub use manager::{CommitListener, TransactionManager, TransactionStats};
