//! Lazy in-order traversal.

use std::ops::Bound;

use strata_common::error::StoreResult;
use strata_common::types::{RowId, Version};
use strata_mvcc::{FieldValue, RowStore};

use super::node::{Key, Node};

struct Frame<V> {
    node: Node<V>,
    /// Next key to yield. Child `index` has already been visited.
    index: usize,
}

/// Row ids of a key range in ascending (value, row) order.
///
/// Each call to a select method starts an independent traversal pinned to
/// one version. Nodes are read one at a time as the traversal reaches them.
pub struct RangeIter<'a, V> {
    nodes: &'a RowStore<Node<V>>,
    version: Version,
    lower: Bound<V>,
    upper: Bound<V>,
    stack: Vec<Frame<V>>,
    /// Root still to be entered on the first call to `next`.
    root: Option<RowId>,
    done: bool,
}

impl<'a, V: FieldValue> RangeIter<'a, V> {
    pub(crate) fn new(
        nodes: &'a RowStore<Node<V>>,
        root: Option<RowId>,
        version: Version,
        lower: Bound<V>,
        upper: Bound<V>,
    ) -> Self {
        Self {
            nodes,
            version,
            lower,
            upper,
            stack: Vec::new(),
            root,
            done: false,
        }
    }

    /// Position of the first key not below the lower bound.
    fn lower_position(&self, keys: &[Key<V>]) -> usize {
        match &self.lower {
            Bound::Unbounded => 0,
            Bound::Included(min) => keys.partition_point(|(v, _)| v < min),
            Bound::Excluded(min) => keys.partition_point(|(v, _)| v <= min),
        }
    }

    fn above_upper(&self, value: &V) -> bool {
        match &self.upper {
            Bound::Unbounded => false,
            Bound::Included(max) => value > max,
            Bound::Excluded(max) => value >= max,
        }
    }

    /// Pushes the path from `id` down to its leftmost in-range leaf.
    fn descend(&mut self, mut id: RowId) -> StoreResult<()> {
        loop {
            let node = self.nodes.data(id, self.version)?;
            let index = self.lower_position(&node.keys);
            let child = (!node.is_leaf()).then(|| node.children[index]);
            self.stack.push(Frame { node, index });
            match child {
                Some(next) => id = next,
                None => return Ok(()),
            }
        }
    }

    fn advance(&mut self) -> StoreResult<Option<RowId>> {
        if let Some(root) = self.root.take() {
            self.descend(root)?;
        }
        loop {
            let Some(frame) = self.stack.last_mut() else {
                return Ok(None);
            };
            if frame.index >= frame.node.keys.len() {
                self.stack.pop();
                continue;
            }
            let (value, row) = frame.node.keys[frame.index].clone();
            frame.index += 1;
            let right = (!frame.node.is_leaf()).then(|| frame.node.children[frame.index]);
            if self.above_upper(&value) {
                self.stack.clear();
                return Ok(None);
            }
            if let Some(child) = right {
                self.descend(child)?;
            }
            return Ok(Some(row));
        }
    }
}

impl<V: FieldValue> Iterator for RangeIter<'_, V> {
    type Item = StoreResult<RowId>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
