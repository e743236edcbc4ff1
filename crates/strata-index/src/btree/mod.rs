//! Versioned B-tree range index.
//!
//! Nodes are rows of a node store and refer to their children by row id.
//! Keys are `(value, row)` pairs, so equal field values are ordered by row
//! id and the index may hold any number of rows per value.
//!
//! ```text
//!                      [ (5,r2) (9,r0) ]
//!                     /        |        \
//!        [(1,r4) (3,r1)]  [(7,r3) (7,r6)]  [(11,r5) (12,r7)]
//! ```
//!
//! Each node holds between 2 and 5 keys (the root may hold fewer). Insert
//! splits full children on the way down; delete borrows from or merges with
//! a sibling before descending into a child at minimum size. Every node
//! write goes through the node store and is versioned like any other row.

mod iter;
mod node;

use std::any::Any;
use std::ops::{Bound, RangeBounds};
use std::sync::Arc;

use strata_common::constants::{BTREE_MAX_CHILDREN, BTREE_MAX_KEYS, BTREE_MIN_DEGREE, BTREE_MIN_KEYS};
use strata_common::error::{StoreError, StoreResult};
use strata_common::types::{RowId, Version};
use strata_mvcc::{Field, Record, RowStore, StoreRegistry};
use tracing::trace;

use crate::RecordIndex;
pub use iter::RangeIter;
pub use node::Key;
use node::{Node, TreeHeader};

const HEADER_ROW: RowId = RowId::FIRST;

/// Range index over field `F` of table records `R`.
pub struct RangeIndex<R, F: Field<R>> {
    name: String,
    field: F,
    header: Arc<RowStore<TreeHeader>>,
    nodes: Arc<RowStore<Node<F::Value>>>,
    _record: std::marker::PhantomData<fn(&R)>,
}

impl<R, F> RangeIndex<R, F>
where
    R: Record,
    F: Field<R>,
{
    /// Creates an empty index and registers its stores.
    pub fn new(name: impl Into<String>, field: F, registry: &mut StoreRegistry) -> Self {
        let name = name.into();
        let header = registry.create(format!("{name}.header"));
        let nodes = registry.create(format!("{name}.nodes"));
        Self {
            name,
            field,
            header,
            nodes,
            _record: std::marker::PhantomData,
        }
    }

    /// The indexed field.
    pub fn field(&self) -> &F {
        &self.field
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Number of keys at `version`.
    pub fn len(&self, version: Version) -> StoreResult<usize> {
        Ok(self.header_at(version)?.count)
    }

    /// Returns true if the index holds no key at `version`.
    pub fn is_empty(&self, version: Version) -> StoreResult<bool> {
        Ok(self.len(version)? == 0)
    }

    /// Returns true if some row holds `value` at `version`.
    pub fn exists(&self, value: &F::Value, version: Version) -> StoreResult<bool> {
        let Some(mut id) = self.header_at(version)?.root else {
            return Ok(false);
        };
        loop {
            let node = self.nodes.data(id, version)?;
            let index = node.keys.partition_point(|(v, _)| v < value);
            if node.keys.get(index).is_some_and(|(v, _)| v == value) {
                return Ok(true);
            }
            if node.is_leaf() {
                return Ok(false);
            }
            id = node.children[index];
        }
    }

    /// Rows holding exactly `value`, in row id order.
    pub fn select(&self, value: &F::Value, version: Version) -> StoreResult<RangeIter<'_, F::Value>> {
        self.select_range((Bound::Included(value.clone()), Bound::Included(value.clone())), version)
    }

    /// Rows whose value lies in `range`, ascending by value then row id.
    pub fn select_range(
        &self,
        range: impl RangeBounds<F::Value>,
        version: Version,
    ) -> StoreResult<RangeIter<'_, F::Value>> {
        let root = self.header_at(version)?.root;
        Ok(RangeIter::new(
            &self.nodes,
            root,
            version,
            range.start_bound().cloned(),
            range.end_bound().cloned(),
        ))
    }

    /// Smallest key at `version`.
    pub fn first(&self, version: Version) -> StoreResult<Option<Key<F::Value>>> {
        match self.header_at(version)?.root {
            Some(root) => self.edge_key(root, version, false).map(Some),
            None => Ok(None),
        }
    }

    /// Largest key at `version`.
    pub fn last(&self, version: Version) -> StoreResult<Option<Key<F::Value>>> {
        match self.header_at(version)?.root {
            Some(root) => self.edge_key(root, version, true).map(Some),
            None => Ok(None),
        }
    }

    fn header_at(&self, version: Version) -> StoreResult<TreeHeader> {
        Ok(self.header.visible(HEADER_ROW, version)?.unwrap_or_default())
    }

    /// Leftmost or rightmost key of the subtree at `id`.
    fn edge_key(&self, mut id: RowId, version: Version, rightmost: bool) -> StoreResult<Key<F::Value>> {
        loop {
            let node = self.nodes.data(id, version)?;
            if node.is_leaf() {
                let key = if rightmost { node.keys.last() } else { node.keys.first() };
                return key.cloned().ok_or_else(|| self.corrupt(id));
            }
            id = if rightmost {
                node.children[node.children.len() - 1]
            } else {
                node.children[0]
            };
        }
    }

    fn corrupt(&self, node: RowId) -> StoreError {
        StoreError::illegal_state(format!("malformed node {node} in index {}", self.name))
    }

    fn duplicate(&self, key: &Key<F::Value>) -> StoreError {
        StoreError::illegal_state(format!("key {key:?} already in index {}", self.name))
    }

    fn missing(&self, key: &Key<F::Value>) -> StoreError {
        StoreError::illegal_state(format!("key {key:?} missing from index {}", self.name))
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    fn save_header(&self, header: TreeHeader) -> StoreResult<()> {
        if self.header.slot_count() == 0 {
            self.header.insert(header)?;
        } else {
            if self.header.is_deleted(HEADER_ROW, self.header.gate().writable_version()?)? {
                self.header.undelete(HEADER_ROW)?;
            }
            self.header.set_data(HEADER_ROW, header)?;
        }
        Ok(())
    }

    fn put(&self, id: RowId, node: Node<F::Value>) -> StoreResult<()> {
        self.nodes.set_data(id, node).map(|_| ())
    }

    fn insert_key(&self, key: Key<F::Value>, version: Version) -> StoreResult<()> {
        let mut header = self.header_at(version)?;
        let start = match header.root {
            None => {
                let leaf = self.nodes.insert(Node::leaf(vec![key]))?;
                header.root = Some(leaf);
                header.count = 1;
                return self.save_header(header);
            }
            Some(root) if self.nodes.data(root, version)?.keys.len() == BTREE_MAX_KEYS => {
                let grown = self.nodes.insert(Node {
                    keys: Vec::new(),
                    children: vec![root],
                })?;
                self.split_child(grown, 0, version)?;
                trace!(index = %self.name, root = %grown, "grow b-tree");
                header.root = Some(grown);
                grown
            }
            Some(root) => root,
        };
        self.insert_non_full(start, key, version)?;
        header.count += 1;
        self.save_header(header)
    }

    /// Splits full child `i` of `parent` around its median key.
    fn split_child(&self, parent_id: RowId, i: usize, version: Version) -> StoreResult<()> {
        let mut parent = self.nodes.data(parent_id, version)?;
        debug_assert!(parent.children.len() < BTREE_MAX_CHILDREN, "split into a full parent");
        let child_id = parent.children[i];
        let mut child = self.nodes.data(child_id, version)?;

        let right_keys = child.keys.split_off(BTREE_MIN_DEGREE);
        let median = child.keys.pop().ok_or_else(|| self.corrupt(child_id))?;
        let right_children = if child.is_leaf() {
            Vec::new()
        } else {
            child.children.split_off(BTREE_MIN_DEGREE)
        };
        let right_id = self.nodes.insert(Node {
            keys: right_keys,
            children: right_children,
        })?;

        parent.keys.insert(i, median);
        parent.children.insert(i + 1, right_id);
        self.put(child_id, child)?;
        self.put(parent_id, parent)
    }

    fn insert_non_full(&self, mut id: RowId, key: Key<F::Value>, version: Version) -> StoreResult<()> {
        loop {
            let mut node = self.nodes.data(id, version)?;
            let mut index = match node.keys.binary_search(&key) {
                Ok(_) => return Err(self.duplicate(&key)),
                Err(index) => index,
            };
            if node.is_leaf() {
                node.keys.insert(index, key);
                return self.put(id, node);
            }
            let child = self.nodes.data(node.children[index], version)?;
            if child.keys.len() == BTREE_MAX_KEYS {
                self.split_child(id, index, version)?;
                node = self.nodes.data(id, version)?;
                match key.cmp(&node.keys[index]) {
                    std::cmp::Ordering::Greater => index += 1,
                    std::cmp::Ordering::Equal => return Err(self.duplicate(&key)),
                    std::cmp::Ordering::Less => {}
                }
            }
            id = node.children[index];
        }
    }

    fn remove_key(&self, key: &Key<F::Value>, version: Version) -> StoreResult<()> {
        let mut header = self.header_at(version)?;
        let root = header.root.ok_or_else(|| self.missing(key))?;
        self.delete_from(root, key.clone(), version)?;

        let root_node = self.nodes.data(root, version)?;
        if root_node.keys.is_empty() {
            header.root = root_node.children.first().copied();
            self.nodes.delete(root)?;
            trace!(index = %self.name, "shrink b-tree");
        }
        header.count -= 1;
        self.save_header(header)
    }

    fn delete_from(&self, mut id: RowId, mut key: Key<F::Value>, version: Version) -> StoreResult<()> {
        loop {
            let mut node = self.nodes.data(id, version)?;
            let found = node.keys.binary_search(&key);
            if node.is_leaf() {
                let index = found.map_err(|_| self.missing(&key))?;
                node.keys.remove(index);
                return self.put(id, node);
            }
            match found {
                Ok(index) => {
                    let left = node.children[index];
                    let right = node.children[index + 1];
                    if self.nodes.data(left, version)?.keys.len() > BTREE_MIN_KEYS {
                        let predecessor = self.edge_key(left, version, true)?;
                        node.keys[index] = predecessor.clone();
                        self.put(id, node)?;
                        id = left;
                        key = predecessor;
                    } else if self.nodes.data(right, version)?.keys.len() > BTREE_MIN_KEYS {
                        let successor = self.edge_key(right, version, false)?;
                        node.keys[index] = successor.clone();
                        self.put(id, node)?;
                        id = right;
                        key = successor;
                    } else {
                        self.merge(id, index, version)?;
                        id = left;
                    }
                }
                Err(index) => {
                    let child = node.children[index];
                    id = if self.nodes.data(child, version)?.keys.len() > BTREE_MIN_KEYS {
                        child
                    } else {
                        self.fill(id, index, version)?
                    };
                }
            }
        }
    }

    /// Merges child `i + 1` and separator `i` into child `i`.
    fn merge(&self, parent_id: RowId, i: usize, version: Version) -> StoreResult<()> {
        let mut parent = self.nodes.data(parent_id, version)?;
        let left_id = parent.children[i];
        let right_id = parent.children[i + 1];
        let mut left = self.nodes.data(left_id, version)?;
        let right = self.nodes.data(right_id, version)?;

        left.keys.push(parent.keys.remove(i));
        left.keys.extend(right.keys);
        left.children.extend(right.children);
        parent.children.remove(i + 1);

        self.put(left_id, left)?;
        self.put(parent_id, parent)?;
        self.nodes.delete(right_id)
    }

    /// Brings child `i` above minimum size and returns the node to descend
    /// into, which differs from child `i` when it was merged into its left
    /// sibling.
    fn fill(&self, parent_id: RowId, i: usize, version: Version) -> StoreResult<RowId> {
        let mut parent = self.nodes.data(parent_id, version)?;
        let child_id = parent.children[i];

        if i > 0 {
            let left_id = parent.children[i - 1];
            let mut left = self.nodes.data(left_id, version)?;
            if left.keys.len() > BTREE_MIN_KEYS {
                let mut child = self.nodes.data(child_id, version)?;
                let borrowed = left.keys.pop().ok_or_else(|| self.corrupt(left_id))?;
                child.keys.insert(0, std::mem::replace(&mut parent.keys[i - 1], borrowed));
                if !left.is_leaf() {
                    let moved = left.children.pop().ok_or_else(|| self.corrupt(left_id))?;
                    child.children.insert(0, moved);
                }
                self.put(left_id, left)?;
                self.put(child_id, child)?;
                self.put(parent_id, parent)?;
                return Ok(child_id);
            }
        }

        if i + 1 < parent.children.len() {
            let right_id = parent.children[i + 1];
            let mut right = self.nodes.data(right_id, version)?;
            if right.keys.len() > BTREE_MIN_KEYS {
                let mut child = self.nodes.data(child_id, version)?;
                let borrowed = right.keys.remove(0);
                child.keys.push(std::mem::replace(&mut parent.keys[i], borrowed));
                if !right.is_leaf() {
                    child.children.push(right.children.remove(0));
                }
                self.put(right_id, right)?;
                self.put(child_id, child)?;
                self.put(parent_id, parent)?;
                return Ok(child_id);
            }
            self.merge(parent_id, i, version)?;
            return Ok(child_id);
        }

        let left_id = parent.children[i - 1];
        self.merge(parent_id, i - 1, version)?;
        Ok(left_id)
    }
}

impl<R, F> RecordIndex<R> for RangeIndex<R, F>
where
    R: Record,
    F: Field<R>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> Vec<usize> {
        self.field.columns()
    }

    fn is_unique(&self) -> bool {
        false
    }

    fn insert(&self, row: RowId, record: &R) -> StoreResult<()> {
        let version = self.nodes.gate().writable_version()?;
        self.insert_key((self.field.get(record), row), version)
    }

    fn remove(&self, row: RowId, record: &R) -> StoreResult<()> {
        let version = self.nodes.gate().writable_version()?;
        self.remove_key(&(self.field.get(record), row), version)
    }

    fn key_changed(&self, old: &R, new: &R) -> bool {
        self.field.get(old) != self.field.get(new)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    use std::collections::BTreeSet;
    use strata_common::config::StoreConfig;
    use strata_mvcc::Column;
    use strata_txn::TransactionManager;

    #[derive(Clone, Default, PartialEq, Debug)]
    struct Sample {
        value: i32,
    }

    type Index = RangeIndex<Sample, Column<Sample, i32>>;

    fn create_index() -> (TransactionManager, Index) {
        let mut manager = TransactionManager::new(&StoreConfig::for_testing());
        let field = Column::new("Value", 0, |s: &Sample| s.value, |s, v| s.value = v);
        let index = RangeIndex::new("Sample_Value", field, manager.registry_mut());
        (manager, index)
    }

    fn key(value: i32, row: u32) -> (RowId, Sample) {
        (RowId::new(row), Sample { value })
    }

    fn collect(iter: RangeIter<'_, i32>) -> Vec<RowId> {
        iter.collect::<StoreResult<Vec<_>>>().unwrap()
    }

    /// Checks key counts, ordering and uniform leaf depth.
    fn check_structure(index: &Index, version: Version) {
        fn walk(index: &Index, id: RowId, version: Version, is_root: bool, depth: usize, leaves: &mut BTreeSet<usize>) {
            let node = index.nodes.data(id, version).unwrap();
            assert!(node.keys.len() <= BTREE_MAX_KEYS);
            if !is_root {
                assert!(node.keys.len() >= BTREE_MIN_KEYS, "underfull node {id}");
            }
            assert!(node.keys.windows(2).all(|w| w[0] < w[1]));
            if node.is_leaf() {
                leaves.insert(depth);
                return;
            }
            assert_eq!(node.children.len(), node.keys.len() + 1);
            assert!(node.children.len() <= BTREE_MAX_CHILDREN);
            for child in &node.children {
                walk(index, *child, version, false, depth + 1, leaves);
            }
        }
        if let Some(root) = index.header_at(version).unwrap().root {
            let mut leaves = BTreeSet::new();
            walk(index, root, version, true, 0, &mut leaves);
            assert_eq!(leaves.len(), 1, "leaves at different depths");
        }
    }

    #[test]
    fn test_empty_index() {
        let (_manager, index) = create_index();
        let v = Version::INITIAL;
        assert!(index.is_empty(v).unwrap());
        assert!(!index.exists(&1, v).unwrap());
        assert_eq!(index.first(v).unwrap(), None);
        assert!(collect(index.select_range(.., v).unwrap()).is_empty());
    }

    #[test]
    fn test_duplicates_ordered_by_row() {
        let (manager, index) = create_index();
        manager.begin().unwrap();
        for (row, value) in [(4, 7), (1, 7), (2, 3), (9, 7), (5, 1)] {
            let (row, sample) = key(value, row);
            index.insert(row, &sample).unwrap();
        }
        let v = manager.commit().unwrap();

        let sevens = collect(index.select(&7, v).unwrap());
        assert_eq!(sevens, vec![RowId::new(1), RowId::new(4), RowId::new(9)]);
        assert_eq!(index.first(v).unwrap(), Some((1, RowId::new(5))));
        assert_eq!(index.last(v).unwrap(), Some((7, RowId::new(9))));
        assert!(index.exists(&3, v).unwrap());
        assert!(!index.exists(&4, v).unwrap());
        assert_eq!(index.len(v).unwrap(), 5);
    }

    #[test]
    fn test_range_bounds() {
        let (manager, index) = create_index();
        manager.begin().unwrap();
        for value in 0..50 {
            let (row, sample) = key(value, value as u32);
            index.insert(row, &sample).unwrap();
        }
        let v = manager.commit().unwrap();
        check_structure(&index, v);

        let rows = collect(index.select_range(10..15, v).unwrap());
        assert_eq!(rows, (10..15).map(RowId::new).collect::<Vec<_>>());
        let rows = collect(index.select_range(45.., v).unwrap());
        assert_eq!(rows.len(), 5);
        let rows = collect(index.select_range(..=2, v).unwrap());
        assert_eq!(rows.len(), 3);
        assert!(collect(index.select_range(60..70, v).unwrap()).is_empty());
    }

    #[test]
    fn test_delete_rebalances() {
        let (manager, index) = create_index();
        manager.begin().unwrap();
        for value in 0..200 {
            let (row, sample) = key(value, value as u32);
            index.insert(row, &sample).unwrap();
        }
        let v1 = manager.commit().unwrap();

        let mut order: Vec<i32> = (0..200).collect();
        order.shuffle(&mut rand::rngs::StdRng::seed_from_u64(7));
        manager.begin().unwrap();
        for value in &order[..190] {
            let (row, sample) = key(*value, *value as u32);
            index.remove(row, &sample).unwrap();
        }
        let v2 = manager.commit().unwrap();

        check_structure(&index, v2);
        let mut survivors: Vec<i32> = order[190..].to_vec();
        survivors.sort_unstable();
        let rows = collect(index.select_range(.., v2).unwrap());
        assert_eq!(rows, survivors.iter().map(|v| RowId::new(*v as u32)).collect::<Vec<_>>());
        // The version before the deletes still holds every key.
        assert_eq!(collect(index.select_range(.., v1).unwrap()).len(), 200);
        check_structure(&index, v1);
    }

    #[test]
    fn test_remove_missing_key() {
        let (manager, index) = create_index();
        manager.begin().unwrap();
        let (row, sample) = key(1, 0);
        index.insert(row, &sample).unwrap();
        let err = index.remove(RowId::new(3), &sample).unwrap_err();
        assert!(err.is_illegal_state());
        assert!(index.insert(row, &sample).unwrap_err().is_illegal_state());
    }

    #[test]
    fn test_empty_after_removing_all() {
        let (manager, index) = create_index();
        manager.begin().unwrap();
        let (row, sample) = key(1, 0);
        index.insert(row, &sample).unwrap();
        index.remove(row, &sample).unwrap();
        let v = manager.commit().unwrap();
        assert!(index.is_empty(v).unwrap());
        assert_eq!(index.first(v).unwrap(), None);

        manager.begin().unwrap();
        index.insert(row, &sample).unwrap();
        let v2 = manager.commit().unwrap();
        assert_eq!(collect(index.select(&1, v2).unwrap()), vec![row]);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Insert(i32),
        Delete(usize),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => (0..40i32).prop_map(Op::Insert),
            2 => any::<usize>().prop_map(Op::Delete),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_select_range_matches_model(
            ops in prop::collection::vec(op_strategy(), 1..150),
            min in 0..40i32,
            span in 0..40i32,
        ) {
            let (manager, index) = create_index();
            let mut model: BTreeSet<(i32, RowId)> = BTreeSet::new();
            let mut next_row = 0u32;

            manager.begin().unwrap();
            for op in ops {
                match op {
                    Op::Insert(value) => {
                        let (row, sample) = key(value, next_row);
                        next_row += 1;
                        index.insert(row, &sample).unwrap();
                        model.insert((value, row));
                    }
                    Op::Delete(pick) if !model.is_empty() => {
                        let (value, row) = *model.iter().nth(pick % model.len()).unwrap();
                        index.remove(row, &Sample { value }).unwrap();
                        model.remove(&(value, row));
                    }
                    Op::Delete(_) => {}
                }
            }
            let version = manager.commit().unwrap();
            check_structure(&index, version);

            let max = min + span;
            let expected: Vec<RowId> = model
                .iter()
                .filter(|(v, _)| (min..=max).contains(v))
                .map(|(_, row)| *row)
                .collect();
            prop_assert_eq!(collect(index.select_range(min..=max, version).unwrap()), expected);
            prop_assert_eq!(index.len(version).unwrap(), model.len());
        }
    }
}
