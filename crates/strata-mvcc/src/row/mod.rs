//! Versioned row storage.
//!
//! Every table and every index structure is backed by one or more
//! [`RowStore`]s. A row store keeps the live value of each row plus a log of
//! pre-images, and a boundary per committed version so that any committed
//! version can be read back:
//!
//! ```text
//!   rows      ┌────┬────┬────┬────┐        log   ┌──────────────┐
//!             │ r0 │ r1 │ r2 │ r3 │              │ pre-image r1 │◀─┐
//!             └────┴──┬─┴────┴────┘              ├──────────────┤  │
//!                     └── newest pre-image ─────▶│ pre-image r1 │──┘
//!                                                └──────────────┘
//!   boundaries  [v1: rows 2, log 0] [v2: rows 4, log 1] [v3: rows 4, log 2]
//! ```
//!
//! A row's state packs its newest log pointer and a deleted flag. The first
//! write to a row within a transaction pushes its pre-image; later writes in
//! the same transaction overwrite in place.

mod change;
mod entry;
mod store;

pub use change::{ChangeAction, RowChange};
pub use store::RowStore;

use strata_common::error::StoreResult;
use strata_common::types::{StoreId, Version};

/// Type-erased view of a row store, as seen by the transaction manager.
pub trait VersionedStore: Send + Sync {
    /// Store id, unique within its gate.
    fn id(&self) -> StoreId;

    /// Store name used in errors and logs.
    fn name(&self) -> &str;

    /// Publishes the open transaction's writes as `version`.
    fn commit(&self, version: Version);

    /// Discards the open transaction's writes.
    fn rollback(&self);

    /// Reverts the effect of committed `version` inside the open transaction.
    ///
    /// Returns false if `version` did not touch this store.
    fn revert(&self, version: Version) -> StoreResult<bool>;

    /// Returns true if any version in `(from, to]` wrote this store.
    fn was_changed(&self, from: Version, to: Version) -> bool;
}
