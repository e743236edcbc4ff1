//! B-tree node layout.

use strata_common::types::RowId;

/// Index key: field value with the owning row as tie-break.
pub type Key<V> = (V, RowId);

/// One node, stored as a row of the node store.
///
/// Leaves have no children; an internal node with `n` keys has `n + 1`.
#[derive(Clone, Default, PartialEq, Debug)]
pub(crate) struct Node<V> {
    pub keys: Vec<Key<V>>,
    pub children: Vec<RowId>,
}

impl<V> Node<V> {
    pub fn leaf(keys: Vec<Key<V>>) -> Self {
        Self {
            keys,
            children: Vec::new(),
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Root pointer and key count.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub(crate) struct TreeHeader {
    pub root: Option<RowId>,
    pub count: usize,
}
