//! Transaction gate.
//!
//! A store has exactly one gate shared by all of its row stores. The gate
//! holds the editor role and the two version counters:
//!
//! ```text
//!            try_acquire              publish(v)
//!   vacant ───────────────▶ editing ─────────────▶ vacant
//!     ▲                        │                  committed = v
//!     └────────────────────────┘
//!              abandon
//! ```
//!
//! Readers only ever look at `committed`; the editor thread additionally
//! reads and writes at `in_progress`.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use strata_common::error::{StoreError, StoreResult};
use strata_common::types::{StoreId, Version};

static NEXT_THREAD_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_TOKEN: Cell<u64> = const { Cell::new(0) };
}

/// Returns a non-zero token identifying the calling thread.
fn current_thread_token() -> u64 {
    THREAD_TOKEN.with(|token| {
        let mut value = token.get();
        if value == 0 {
            value = NEXT_THREAD_TOKEN.fetch_add(1, Ordering::Relaxed);
            token.set(value);
        }
        value
    })
}

/// Editor role and version counters of one store.
pub struct TransactionGate {
    /// Thread token of the editor, 0 when vacant.
    editor: AtomicU64,
    /// Version of the open transaction, 0 when none.
    in_progress: AtomicU64,
    /// Latest completed version.
    committed: AtomicU64,
    /// Row stores written by the open transaction, in first-touch order.
    touched: Mutex<Vec<StoreId>>,
}

impl TransactionGate {
    /// Creates a gate at the initial version.
    pub fn new() -> Self {
        Self {
            editor: AtomicU64::new(0),
            in_progress: AtomicU64::new(0),
            committed: AtomicU64::new(Version::INITIAL.as_u64()),
            touched: Mutex::new(Vec::new()),
        }
    }

    /// Latest completed version.
    #[inline]
    pub fn committed_version(&self) -> Version {
        Version::new(self.committed.load(Ordering::Acquire))
    }

    /// Version of the open transaction, if any.
    #[inline]
    pub fn in_progress_version(&self) -> Option<Version> {
        match self.in_progress.load(Ordering::Acquire) {
            0 => None,
            v => Some(Version::new(v)),
        }
    }

    /// Returns true if `version` is the open transaction's version.
    #[inline]
    pub fn is_live(&self, version: Version) -> bool {
        self.in_progress_version() == Some(version)
    }

    /// Returns true if the calling thread holds the editor role.
    pub fn is_editor(&self) -> bool {
        self.editor.load(Ordering::Acquire) == current_thread_token()
    }

    /// Takes the editor role for the calling thread.
    ///
    /// Fails immediately with `EditorBusy` if any thread, including the
    /// caller, already holds it. On success the open transaction's version
    /// is one past the committed version.
    pub fn try_acquire(&self) -> StoreResult<Version> {
        let token = current_thread_token();
        self.editor
            .compare_exchange(0, token, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| StoreError::EditorBusy)?;
        let version = self.committed_version().next();
        self.in_progress.store(version.as_u64(), Ordering::Release);
        Ok(version)
    }

    /// Returns the open transaction's version if the caller may write.
    pub fn writable_version(&self) -> StoreResult<Version> {
        let Some(version) = self.in_progress_version() else {
            return Err(StoreError::illegal_state("no transaction in progress"));
        };
        if !self.is_editor() {
            return Err(StoreError::illegal_state(
                "transaction is owned by another thread",
            ));
        }
        Ok(version)
    }

    /// Records that a row store was written by the open transaction.
    pub fn mark_touched(&self, store: StoreId) {
        let mut touched = self.touched.lock();
        if !touched.contains(&store) {
            touched.push(store);
        }
    }

    /// Row stores written by the open transaction.
    pub fn touched(&self) -> Vec<StoreId> {
        self.touched.lock().clone()
    }

    /// Makes `version` the committed version and vacates the editor role.
    pub fn publish(&self, version: Version) {
        self.touched.lock().clear();
        self.committed.store(version.as_u64(), Ordering::Release);
        self.in_progress.store(0, Ordering::Release);
        self.editor.store(0, Ordering::Release);
    }

    /// Vacates the editor role without publishing.
    pub fn abandon(&self) {
        self.touched.lock().clear();
        self.in_progress.store(0, Ordering::Release);
        self.editor.store(0, Ordering::Release);
    }
}

impl Default for TransactionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TransactionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionGate")
            .field("committed", &self.committed_version())
            .field("in_progress", &self.in_progress_version())
            .finish()
    }
}
