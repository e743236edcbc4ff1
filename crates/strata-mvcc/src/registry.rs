//! Registry of the row stores sharing one gate.

use std::sync::Arc;

use strata_common::types::StoreId;
use tracing::debug;

use crate::field::Record;
use crate::gate::TransactionGate;
use crate::row::{RowStore, VersionedStore};

/// Allocates row stores bound to one gate and keeps an erased handle to
/// each, in creation order.
pub struct StoreRegistry {
    gate: Arc<TransactionGate>,
    page_size: usize,
    stores: Vec<Arc<dyn VersionedStore>>,
}

impl StoreRegistry {
    /// Creates an empty registry.
    pub fn new(gate: Arc<TransactionGate>, page_size: usize) -> Self {
        Self {
            gate,
            page_size,
            stores: Vec::new(),
        }
    }

    /// The shared gate.
    pub fn gate(&self) -> &Arc<TransactionGate> {
        &self.gate
    }

    /// Creates and registers a row store.
    pub fn create<T: Record>(&mut self, name: impl Into<String>) -> Arc<RowStore<T>> {
        let id = StoreId::new(self.stores.len() as u32);
        let store = Arc::new(RowStore::new(id, name, Arc::clone(&self.gate), self.page_size));
        debug!(store = %store.name(), id = id.as_usize(), "registered row store");
        self.stores.push(store.clone() as Arc<dyn VersionedStore>);
        store
    }

    /// Looks up a store by id.
    pub fn get(&self, id: StoreId) -> Option<&Arc<dyn VersionedStore>> {
        self.stores.get(id.as_usize())
    }

    /// All stores in creation order.
    pub fn stores(&self) -> &[Arc<dyn VersionedStore>] {
        &self.stores
    }

    /// Number of registered stores.
    pub fn len(&self) -> usize {
        self.stores.len()
    }

    /// Returns true if no store is registered.
    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("page_size", &self.page_size)
            .field("stores", &self.stores.len())
            .finish()
    }
}
