//! # strata-mvcc
//!
//! Multi-version row storage for Strata.
//!
//! This crate implements:
//! - The field abstraction used to read and write columns of a record
//! - The transaction gate (editor role and version counters)
//! - Versioned row stores with pre-image logs and snapshot boundaries
//! - Change enumeration over versions

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Typed column accessors
pub mod field;

/// Editor role and version counters
pub mod gate;

/// Row store registry
pub mod registry;

/// Versioned row storage
pub mod row;

pub use field::{Column, Field, FieldValue, Record};
pub use gate::TransactionGate;
pub use registry::StoreRegistry;
pub use row::{ChangeAction, RowChange, RowStore, VersionedStore};
