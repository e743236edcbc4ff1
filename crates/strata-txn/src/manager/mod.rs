//! Transaction manager for coordinating the single writer.
//!
//! # Transaction States
//!
//! ```text
//! ┌────────┐   begin()   ┌─────────┐   commit()   ┌───────────┐
//! │ Vacant │────────────▶│ Editing │─────────────▶│ Committed │
//! └────────┘             └─────────┘              └───────────┘
//!      ▲                      │                        │
//!      │     rollback()       │                        │
//!      └──────────────────────┘◀───────────────────────┘
//! ```
//!
//! `undo` and `redo` run a complete transaction of their own: they take
//! the editor role, revert the target version in every row store and
//! commit.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use strata_common::config::StoreConfig;
use strata_common::error::{StoreError, StoreResult};
use strata_common::types::Version;
use strata_mvcc::{StoreRegistry, TransactionGate};
use tracing::{debug, warn};

use crate::history::{redo_target, undo_target, TransactionKind};

/// Callback run on the committing thread after every commit.
pub type CommitListener = Box<dyn Fn(Version, TransactionKind) + Send + Sync>;

/// Statistics about the transaction manager.
#[derive(Debug, Default)]
pub struct TransactionStats {
    /// Total transactions started, including undo and redo.
    pub started: AtomicU64,
    /// Total edits committed, omitted ones included.
    pub committed: AtomicU64,
    /// Total transactions rolled back.
    pub rolled_back: AtomicU64,
    /// Total undos committed.
    pub undone: AtomicU64,
    /// Total redos committed.
    pub redone: AtomicU64,
    /// Total begin attempts refused because the editor role was taken.
    pub rejected: AtomicU64,
}

impl TransactionStats {
    /// Creates new stats.
    pub fn new() -> Self {
        Self::default()
    }
}

/// The transaction manager sequences all writes to a set of row stores.
pub struct TransactionManager {
    /// Row stores of every table and index.
    registry: StoreRegistry,
    /// Kind of every committed version.
    history: Mutex<Vec<TransactionKind>>,
    /// Commit callbacks.
    listeners: RwLock<Vec<CommitListener>>,
    /// Statistics.
    stats: TransactionStats,
}

impl TransactionManager {
    /// Creates a manager with no row stores.
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            registry: StoreRegistry::new(Arc::new(TransactionGate::new()), config.page_size),
            history: Mutex::new(Vec::new()),
            listeners: RwLock::new(Vec::new()),
            stats: TransactionStats::new(),
        }
    }

    /// Store registry.
    pub fn registry(&self) -> &StoreRegistry {
        &self.registry
    }

    /// Store registry, for creating row stores before the schema is shared.
    pub fn registry_mut(&mut self) -> &mut StoreRegistry {
        &mut self.registry
    }

    /// The gate shared by all row stores.
    pub fn gate(&self) -> &Arc<TransactionGate> {
        self.registry.gate()
    }

    /// Latest completed version.
    pub fn committed_version(&self) -> Version {
        self.gate().committed_version()
    }

    /// Version of the open transaction, if any.
    pub fn in_progress_version(&self) -> Option<Version> {
        self.gate().in_progress_version()
    }

    /// Statistics.
    pub fn stats(&self) -> &TransactionStats {
        &self.stats
    }

    /// Kinds of all committed versions, oldest first.
    pub fn history(&self) -> Vec<TransactionKind> {
        self.history.lock().clone()
    }

    /// Kind of a committed version.
    pub fn kind_of(&self, version: Version) -> Option<TransactionKind> {
        let index = usize::try_from(version.as_u64()).ok()?.checked_sub(1)?;
        self.history.lock().get(index).copied()
    }

    /// Registers a callback run after every commit, undo and redo.
    ///
    /// Listeners run on the committing thread once the new version is
    /// visible. They must not register further listeners.
    pub fn subscribe(&self, listener: impl Fn(Version, TransactionKind) + Send + Sync + 'static) {
        self.listeners.write().push(Box::new(listener));
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Opens a transaction owned by the calling thread.
    pub fn begin(&self) -> StoreResult<Version> {
        match self.gate().try_acquire() {
            Ok(version) => {
                self.stats.started.fetch_add(1, AtomicOrdering::Relaxed);
                debug!(%version, "transaction started");
                Ok(version)
            }
            Err(e) => {
                self.stats.rejected.fetch_add(1, AtomicOrdering::Relaxed);
                debug!("transaction start refused: editor busy");
                Err(e)
            }
        }
    }

    /// Commits the open transaction as an undoable edit.
    pub fn commit(&self) -> StoreResult<Version> {
        let version = self.publish(TransactionKind::Edit)?;
        self.stats.committed.fetch_add(1, AtomicOrdering::Relaxed);
        Ok(version)
    }

    /// Commits the open transaction without making it undoable.
    ///
    /// Versions before it can no longer be undone or redone.
    pub fn commit_omitted(&self) -> StoreResult<Version> {
        let version = self.publish(TransactionKind::Omit)?;
        self.stats.committed.fetch_add(1, AtomicOrdering::Relaxed);
        Ok(version)
    }

    /// Discards the open transaction. The committed version is unchanged.
    pub fn rollback(&self) -> StoreResult<()> {
        let version = self.gate().writable_version()?;
        for id in self.gate().touched() {
            if let Some(store) = self.registry.get(id) {
                store.rollback();
            }
        }
        self.gate().abandon();
        self.stats.rolled_back.fetch_add(1, AtomicOrdering::Relaxed);
        debug!(%version, "transaction rolled back");
        Ok(())
    }

    /// Returns true if some version can be undone.
    pub fn can_undo(&self) -> bool {
        undo_target(&self.history.lock()).is_some()
    }

    /// Returns true if some undo can be redone.
    pub fn can_redo(&self) -> bool {
        redo_target(&self.history.lock()).is_some()
    }

    /// Reverts the newest undoable version in a transaction of its own.
    pub fn undo(&self) -> StoreResult<Version> {
        let target = undo_target(&self.history.lock())
            .ok_or_else(|| StoreError::illegal_state("nothing to undo"))?;
        let version = self.revert(target, TransactionKind::Undo)?;
        self.stats.undone.fetch_add(1, AtomicOrdering::Relaxed);
        Ok(version)
    }

    /// Reverts the newest redoable undo in a transaction of its own.
    pub fn redo(&self) -> StoreResult<Version> {
        let target = redo_target(&self.history.lock())
            .ok_or_else(|| StoreError::illegal_state("nothing to redo"))?;
        let version = self.revert(target, TransactionKind::Redo)?;
        self.stats.redone.fetch_add(1, AtomicOrdering::Relaxed);
        Ok(version)
    }

    fn revert(&self, target: Version, kind: TransactionKind) -> StoreResult<Version> {
        self.begin()?;
        debug!(%target, %kind, "reverting version");
        for store in self.registry.stores() {
            if let Err(e) = store.revert(target) {
                warn!(store = store.name(), %target, error = %e, "revert failed");
                self.rollback()?;
                return Err(e);
            }
        }
        self.publish(kind)
    }

    /// Seals every touched store at the open version and publishes it.
    fn publish(&self, kind: TransactionKind) -> StoreResult<Version> {
        let gate = self.gate();
        let version = gate.writable_version()?;
        for id in gate.touched() {
            if let Some(store) = self.registry.get(id) {
                store.commit(version);
            }
        }
        self.history.lock().push(kind);
        gate.publish(version);
        debug!(%version, %kind, "transaction committed");

        for listener in self.listeners.read().iter() {
            listener(version, kind);
        }
        Ok(version)
    }
}

impl fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionManager")
            .field("committed", &self.committed_version())
            .field("in_progress", &self.in_progress_version())
            .field("stores", &self.registry.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    fn create_manager() -> TransactionManager {
        TransactionManager::new(&StoreConfig::for_testing())
    }

    #[test]
    fn test_transaction_lifecycle() {
        let manager = create_manager();
        assert_eq!(manager.committed_version(), Version::INITIAL);

        let v = manager.begin().unwrap();
        assert_eq!(manager.in_progress_version(), Some(v));
        assert_eq!(manager.commit().unwrap(), v);
        assert_eq!(manager.committed_version(), v);
        assert_eq!(manager.kind_of(v), Some(TransactionKind::Edit));
        assert_eq!(manager.stats().committed.load(AtomicOrdering::Relaxed), 1);
    }

    #[test]
    fn test_commit_without_transaction() {
        let manager = create_manager();
        assert!(manager.commit().unwrap_err().is_illegal_state());
        assert!(manager.rollback().unwrap_err().is_illegal_state());
        assert!(manager.undo().unwrap_err().is_illegal_state());
    }

    #[test]
    fn test_second_begin_changes_nothing() {
        let manager = Arc::new(create_manager());
        let v = manager.begin().unwrap();

        let other = Arc::clone(&manager);
        let result = thread::spawn(move || other.begin()).join().unwrap();
        assert!(matches!(result, Err(StoreError::EditorBusy)));
        assert!(matches!(manager.begin(), Err(StoreError::EditorBusy)));

        assert_eq!(manager.in_progress_version(), Some(v));
        assert_eq!(manager.committed_version(), Version::INITIAL);
        assert_eq!(manager.stats().rejected.load(AtomicOrdering::Relaxed), 2);
        manager.commit().unwrap();
    }

    #[test]
    fn test_rollback_keeps_version() {
        let mut manager = create_manager();
        let store = manager.registry_mut().create::<String>("Names");
        manager.begin().unwrap();
        let row = store.insert("a".into()).unwrap();
        let v1 = manager.commit().unwrap();

        manager.begin().unwrap();
        store.set_data(row, "b".into()).unwrap();
        manager.rollback().unwrap();

        assert_eq!(manager.committed_version(), v1);
        assert_eq!(store.data(row, v1).unwrap(), "a");
        assert_eq!(manager.begin().unwrap(), v1.next());
    }

    #[test]
    fn test_undo_redo() {
        let mut manager = create_manager();
        let store = manager.registry_mut().create::<i64>("Numbers");
        manager.begin().unwrap();
        let row = store.insert(1).unwrap();
        manager.commit().unwrap();
        manager.begin().unwrap();
        store.set_data(row, 2).unwrap();
        manager.commit().unwrap();

        assert!(manager.can_undo());
        assert!(!manager.can_redo());
        let v3 = manager.undo().unwrap();
        assert_eq!(store.data(row, v3).unwrap(), 1);
        let v4 = manager.undo().unwrap();
        assert!(!store.is_live(row, v4));
        assert!(!manager.can_undo());

        let v5 = manager.redo().unwrap();
        assert_eq!(store.data(row, v5).unwrap(), 1);
        let v6 = manager.redo().unwrap();
        assert_eq!(store.data(row, v6).unwrap(), 2);
        assert!(!manager.can_redo());
        assert_eq!(
            manager.history(),
            vec![
                TransactionKind::Edit,
                TransactionKind::Edit,
                TransactionKind::Undo,
                TransactionKind::Undo,
                TransactionKind::Redo,
                TransactionKind::Redo,
            ]
        );
    }

    #[test]
    fn test_new_edit_clears_redo() {
        let mut manager = create_manager();
        let store = manager.registry_mut().create::<i64>("Numbers");
        manager.begin().unwrap();
        store.insert(1).unwrap();
        manager.commit().unwrap();
        manager.undo().unwrap();
        assert!(manager.can_redo());

        manager.begin().unwrap();
        store.insert(2).unwrap();
        manager.commit().unwrap();
        assert!(!manager.can_redo());
        assert!(manager.redo().unwrap_err().is_illegal_state());
    }

    #[test]
    fn test_omitted_commit_blocks_undo() {
        let mut manager = create_manager();
        let store = manager.registry_mut().create::<i64>("Numbers");
        manager.begin().unwrap();
        store.insert(1).unwrap();
        let v1 = manager.commit_omitted().unwrap();
        assert_eq!(manager.kind_of(v1), Some(TransactionKind::Omit));
        assert!(!manager.can_undo());
    }

    #[test]
    fn test_listeners_run_on_commit() {
        let manager = create_manager();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        manager.subscribe(move |version, kind| {
            assert_eq!(kind, TransactionKind::Edit);
            counter.store(version.as_u64() as usize, AtomicOrdering::SeqCst);
        });
        manager.begin().unwrap();
        manager.commit().unwrap();
        assert_eq!(seen.load(AtomicOrdering::SeqCst), 1);
    }
}
