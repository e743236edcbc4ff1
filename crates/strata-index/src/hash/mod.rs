//! Versioned open-addressing hash index.
//!
//! Buckets live in a row store, one row per bucket, and are grouped into
//! blocks of prime size. The header row records which block is current:
//!
//! ```text
//!   header  { base: 37, size: 79, count: 41, collisions: 12 }
//!
//!   buckets  [ block of 37 (superseded) ][ block of 79 (current)     ]
//!            0                           37                         116
//! ```
//!
//! A key probes `(seed + i * step) mod size` with `step` in `[1, size)`.
//! Probing past an occupied bucket sets its collision bit, so a lookup can
//! stop at the first bucket without one. Removed entries leave a tombstone
//! that keeps the bit.
//!
//! Growing writes a fresh block of the next prime at least twice the size
//! and re-inserts every live entry; superseded blocks stay readable at the
//! versions that used them. When collision bits alone cross the load factor
//! the current block is rebuilt in place.

use std::any::Any;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use siphasher::sip::SipHasher13;
use strata_common::config::HashIndexConfig;
use strata_common::error::{StoreError, StoreResult};
use strata_common::types::{RowId, Version};
use strata_mvcc::{Field, Record, RowStore, StoreRegistry};
use tracing::{trace, warn};

use crate::RecordIndex;

const SIP_KEY_0: u64 = 0x5374_7261_7461_4b30;
const SIP_KEY_1: u64 = 0x4861_7368_4964_7831;

const HEADER_ROW: RowId = RowId::FIRST;

const EMPTY: u64 = 0;
const TOMBSTONE: u64 = 1;

/// One bucket: empty, tombstone or a row id offset by two.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
struct Bucket {
    entry: u64,
    collision: bool,
}

impl Bucket {
    fn row(self) -> Option<RowId> {
        match self.entry {
            EMPTY | TOMBSTONE => None,
            slot => RowId::from_index((slot - 2) as usize),
        }
    }

    fn is_free(self) -> bool {
        self.entry == EMPTY || self.entry == TOMBSTONE
    }
}

#[inline]
fn encode(row: RowId) -> u64 {
    u64::from(row.as_u32()) + 2
}

/// Current block and occupancy counters.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
struct Header {
    base: usize,
    size: usize,
    count: usize,
    collisions: usize,
}

/// Unique index over field `F` of table records `R`.
pub struct UniqueIndex<R, F> {
    name: String,
    field: F,
    table: Arc<RowStore<R>>,
    header: Arc<RowStore<Header>>,
    buckets: Arc<RowStore<Bucket>>,
    initial_size: usize,
    load_factor: f64,
}

impl<R, F> UniqueIndex<R, F>
where
    R: Record,
    F: Field<R>,
{
    /// Creates an empty index and registers its stores.
    pub fn new(
        name: impl Into<String>,
        field: F,
        table: Arc<RowStore<R>>,
        registry: &mut StoreRegistry,
        config: &HashIndexConfig,
    ) -> Self {
        let name = name.into();
        let header = registry.create(format!("{name}.header"));
        let buckets = registry.create(format!("{name}.buckets"));
        Self {
            name,
            field,
            table,
            header,
            buckets,
            initial_size: config.initial_size,
            load_factor: config.load_factor,
        }
    }

    /// The indexed field.
    pub fn field(&self) -> &F {
        &self.field
    }

    /// Row holding `value` at `version`.
    pub fn find(&self, value: &F::Value, version: Version) -> StoreResult<Option<RowId>> {
        let Some(header) = self.header_at(version)? else {
            return Ok(None);
        };
        let (seed, step) = self.probe(value, header.size);
        for i in 0..header.size {
            let bucket = self.buckets.data(slot(&header, seed, step, i), version)?;
            if let Some(row) = bucket.row() {
                if let Some(record) = self.table.visible(row, version)? {
                    if self.field.get(&record) == *value {
                        return Ok(Some(row));
                    }
                }
            }
            if !bucket.collision {
                return Ok(None);
            }
        }
        Ok(None)
    }

    /// Returns true if some live row holds `value` at `version`.
    pub fn exists(&self, value: &F::Value, version: Version) -> StoreResult<bool> {
        Ok(self.find(value, version)?.is_some())
    }

    /// Number of keys at `version`.
    pub fn len(&self, version: Version) -> StoreResult<usize> {
        Ok(self.header_at(version)?.map_or(0, |h| h.count))
    }

    /// Returns true if the index holds no key at `version`.
    pub fn is_empty(&self, version: Version) -> StoreResult<bool> {
        Ok(self.len(version)? == 0)
    }

    /// Bucket count of the current block at `version`.
    pub fn capacity(&self, version: Version) -> StoreResult<usize> {
        Ok(self.header_at(version)?.map_or(0, |h| h.size))
    }

    fn header_at(&self, version: Version) -> StoreResult<Option<Header>> {
        self.header.visible(HEADER_ROW, version)
    }

    fn probe(&self, value: &F::Value, size: usize) -> (usize, usize) {
        let mut hasher = SipHasher13::new_with_keys(SIP_KEY_0, SIP_KEY_1);
        value.hash(&mut hasher);
        let hash = hasher.finish();
        let seed = (hash % size as u64) as usize;
        let step = 1 + ((hash >> 32) % (size as u64 - 1)) as usize;
        (seed, step)
    }

    /// Header for writing, creating the first block on first use.
    fn writable_header(&self, version: Version) -> StoreResult<Header> {
        if let Some(header) = self.header_at(version)? {
            return Ok(header);
        }
        let base = self.allocate_block(self.initial_size)?;
        let header = Header {
            base,
            size: self.initial_size,
            count: 0,
            collisions: 0,
        };
        if self.header.slot_count() == 0 {
            self.header.insert(header)?;
        } else {
            // Emptied by rollback or undo of the transaction that created it.
            self.header.undelete(HEADER_ROW)?;
            self.header.set_data(HEADER_ROW, header)?;
        }
        Ok(header)
    }

    fn allocate_block(&self, size: usize) -> StoreResult<usize> {
        Ok(self.buckets.insert_defaults(size)?.as_usize())
    }

    fn threshold(&self, size: usize) -> usize {
        (size as f64 * self.load_factor) as usize
    }

    /// Places `row` without checking for duplicates.
    fn place(&self, header: &mut Header, row: RowId, value: &F::Value, version: Version) -> StoreResult<()> {
        let (seed, step) = self.probe(value, header.size);
        for i in 0..header.size {
            let at = slot(header, seed, step, i);
            let bucket = self.buckets.data(at, version)?;
            if bucket.is_free() {
                self.buckets.modify(at, |b| b.entry = encode(row))?;
                header.count += 1;
                return Ok(());
            }
            if !bucket.collision {
                self.buckets.modify(at, |b| b.collision = true)?;
                header.collisions += 1;
            }
        }
        Err(StoreError::illegal_state(format!("hash index {} is full", self.name)))
    }

    /// Live rows of the current block.
    fn entries(&self, header: &Header, version: Version) -> StoreResult<Vec<RowId>> {
        let mut rows = Vec::with_capacity(header.count);
        for i in 0..header.size {
            let at = block_row(header.base + i)?;
            if let Some(row) = self.buckets.data(at, version)?.row() {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    /// Writes every live entry into a fresh block of `size` buckets.
    fn grow(&self, header: &mut Header, version: Version) -> StoreResult<()> {
        let size = next_prime(header.size * 2);
        let rows = self.entries(header, version)?;
        trace!(index = %self.name, from = header.size, to = size, "grow hash index");
        *header = Header {
            base: self.allocate_block(size)?,
            size,
            count: 0,
            collisions: 0,
        };
        self.reinsert(header, &rows, version)
    }

    /// Clears tombstones and collision bits of the current block.
    fn rehash(&self, header: &mut Header, version: Version) -> StoreResult<()> {
        let rows = self.entries(header, version)?;
        trace!(index = %self.name, size = header.size, collisions = header.collisions, "rehash hash index");
        for i in 0..header.size {
            self.buckets.set_data(block_row(header.base + i)?, Bucket::default())?;
        }
        header.count = 0;
        header.collisions = 0;
        self.reinsert(header, &rows, version)
    }

    fn reinsert(&self, header: &mut Header, rows: &[RowId], version: Version) -> StoreResult<()> {
        for &row in rows {
            let value = self.table.field(row, &self.field, version)?;
            self.place(header, row, &value, version)?;
        }
        Ok(())
    }
}

/// Bucket row of probe step `i`.
fn slot(header: &Header, seed: usize, step: usize, i: usize) -> RowId {
    let offset = (seed + i * step) % header.size;
    RowId::new((header.base + offset) as u32)
}

fn block_row(index: usize) -> StoreResult<RowId> {
    RowId::from_index(index).ok_or_else(|| StoreError::internal("bucket index out of range"))
}

impl<R, F> RecordIndex<R> for UniqueIndex<R, F>
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
        true
    }

    fn insert(&self, row: RowId, record: &R) -> StoreResult<()> {
        let version = self.table.gate().writable_version()?;
        let value = self.field.get(record);
        match self.find(&value, version)? {
            Some(existing) if existing == row => return Ok(()),
            Some(_) => {
                warn!(index = %self.name, key = ?value, "unique violation");
                return Err(StoreError::UniqueViolation {
                    index: self.name.clone(),
                    key: format!("{value:?}"),
                });
            }
            None => {}
        }

        let mut header = self.writable_header(version)?;
        if header.count + 1 > self.threshold(header.size) {
            self.grow(&mut header, version)?;
        }
        self.place(&mut header, row, &value, version)?;
        if header.collisions > self.threshold(header.size) {
            self.rehash(&mut header, version)?;
        }
        self.header.set_data(HEADER_ROW, header)?;
        Ok(())
    }

    fn remove(&self, row: RowId, record: &R) -> StoreResult<()> {
        let version = self.table.gate().writable_version()?;
        let Some(mut header) = self.header_at(version)? else {
            return Err(StoreError::illegal_state(format!("key missing from index {}", self.name)));
        };
        let value = self.field.get(record);
        let (seed, step) = self.probe(&value, header.size);
        let target = encode(row);
        for i in 0..header.size {
            let at = slot(&header, seed, step, i);
            let bucket = self.buckets.data(at, version)?;
            if bucket.entry == target {
                self.buckets.modify(at, |b| b.entry = TOMBSTONE)?;
                header.count -= 1;
                self.header.set_data(HEADER_ROW, header)?;
                return Ok(());
            }
            if !bucket.collision {
                break;
            }
        }
        Err(StoreError::illegal_state(format!(
            "key {value:?} missing from index {}",
            self.name
        )))
    }

    fn key_changed(&self, old: &R, new: &R) -> bool {
        self.field.get(old) != self.field.get(new)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Smallest prime greater than or equal to `n`.
pub fn next_prime(n: usize) -> usize {
    let mut candidate = n.max(3) | 1;
    while !is_prime(candidate) {
        candidate += 2;
    }
    candidate
}

fn is_prime(n: usize) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    let mut d = 3;
    while d * d <= n {
        if n % d == 0 {
            return false;
        }
        d += 2;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_common::config::StoreConfig;
    use strata_mvcc::Column;
    use strata_txn::TransactionManager;

    #[derive(Clone, Default, PartialEq, Debug)]
    struct Person {
        id: i64,
        name: String,
    }

    fn person(id: i64) -> Person {
        Person {
            id,
            name: format!("p{id}"),
        }
    }

    fn id_field() -> Column<Person, i64> {
        Column::new("Id", 0, |p: &Person| p.id, |p, v| p.id = v)
    }

    struct Fixture {
        manager: TransactionManager,
        table: Arc<RowStore<Person>>,
        index: UniqueIndex<Person, Column<Person, i64>>,
    }

    fn create_fixture() -> Fixture {
        let config = StoreConfig::for_testing();
        let mut manager = TransactionManager::new(&config);
        let table = manager.registry_mut().create("Person");
        let index = UniqueIndex::new(
            "Person_Id",
            id_field(),
            Arc::clone(&table),
            manager.registry_mut(),
            &config.hash,
        );
        Fixture { manager, table, index }
    }

    impl Fixture {
        fn add(&self, id: i64) -> StoreResult<RowId> {
            let record = person(id);
            let row = self.table.insert(record.clone())?;
            self.index.insert(row, &record)?;
            Ok(row)
        }

        fn remove(&self, row: RowId) -> StoreResult<()> {
            let version = self.table.gate().writable_version()?;
            let record = self.table.data(row, version)?;
            self.index.remove(row, &record)?;
            self.table.delete(row)
        }
    }

    #[test]
    fn test_next_prime() {
        assert_eq!(next_prime(0), 3);
        assert_eq!(next_prime(10), 11);
        assert_eq!(next_prime(74), 79);
        assert_eq!(next_prime(79), 79);
        assert!(is_prime(37));
        assert!(!is_prime(39));
    }

    #[test]
    fn test_find_and_duplicate() {
        let f = create_fixture();
        f.manager.begin().unwrap();
        let row = f.add(10).unwrap();
        let err = f.add(10).unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { .. }));
        let v1 = f.manager.commit().unwrap();

        assert_eq!(f.index.find(&10, v1).unwrap(), Some(row));
        assert_eq!(f.index.find(&11, v1).unwrap(), None);
        assert_eq!(f.index.find(&10, Version::INITIAL).unwrap(), None);
        assert_eq!(f.index.len(v1).unwrap(), 1);
    }

    #[test]
    fn test_growth_keeps_old_versions() {
        let f = create_fixture();
        f.manager.begin().unwrap();
        for id in 0..3 {
            f.add(id).unwrap();
        }
        let v1 = f.manager.commit().unwrap();
        let small = f.index.capacity(v1).unwrap();

        f.manager.begin().unwrap();
        for id in 3..100 {
            f.add(id).unwrap();
        }
        let v2 = f.manager.commit().unwrap();

        assert!(f.index.capacity(v2).unwrap() > small);
        assert!(is_prime(f.index.capacity(v2).unwrap()));
        for id in 0..100 {
            assert!(f.index.exists(&id, v2).unwrap(), "missing {id}");
        }
        assert!(f.index.exists(&2, v1).unwrap());
        assert!(!f.index.exists(&50, v1).unwrap());
        assert_eq!(f.index.len(v1).unwrap(), 3);
    }

    #[test]
    fn test_blocks_are_allocated_contiguously() {
        let f = create_fixture();
        f.manager.begin().unwrap();
        f.add(0).unwrap();
        let v1 = f.manager.commit().unwrap();
        let first = f.index.header_at(v1).unwrap().unwrap();
        assert_eq!(first.base, 0);
        assert_eq!(f.index.buckets.live_count(v1), first.size);

        f.manager.begin().unwrap();
        for id in 1..40 {
            f.add(id).unwrap();
        }
        let v2 = f.manager.commit().unwrap();
        let last = f.index.header_at(v2).unwrap().unwrap();
        assert_eq!(last.base + last.size, f.index.buckets.slot_count());
        assert_eq!(f.index.buckets.changes(v1).unwrap().len(), first.size);
        assert!(f.index.buckets.data(block_row(last.base).unwrap(), v1).unwrap_err().is_out_of_range());
    }

    #[test]
    fn test_remove_leaves_tombstone() {
        let f = create_fixture();
        f.manager.begin().unwrap();
        let rows: Vec<_> = (0..4).map(|id| f.add(id).unwrap()).collect();
        f.manager.commit().unwrap();

        f.manager.begin().unwrap();
        f.remove(rows[1]).unwrap();
        let v2 = f.manager.commit().unwrap();

        assert!(!f.index.exists(&1, v2).unwrap());
        for id in [0, 2, 3] {
            assert!(f.index.exists(&id, v2).unwrap());
        }
        // A removed key may be inserted again.
        f.manager.begin().unwrap();
        f.add(1).unwrap();
        let v3 = f.manager.commit().unwrap();
        assert!(f.index.exists(&1, v3).unwrap());
    }

    #[test]
    fn test_churn_triggers_rehash() {
        let f = create_fixture();
        f.manager.begin().unwrap();
        for round in 0..20 {
            let rows: Vec<_> = (0..3).map(|i| f.add(round * 10 + i).unwrap()).collect();
            for row in rows {
                f.remove(row).unwrap();
            }
        }
        let kept = f.add(1000).unwrap();
        let version = f.manager.commit().unwrap();
        assert_eq!(f.index.len(version).unwrap(), 1);
        assert_eq!(f.index.find(&1000, version).unwrap(), Some(kept));
        assert!(!f.index.exists(&190, version).unwrap());
    }

    #[test]
    fn test_rollback_restores_index() {
        let f = create_fixture();
        f.manager.begin().unwrap();
        f.add(1).unwrap();
        let v1 = f.manager.commit().unwrap();

        f.manager.begin().unwrap();
        for id in 2..40 {
            f.add(id).unwrap();
        }
        f.manager.rollback().unwrap();

        f.manager.begin().unwrap();
        f.add(2).unwrap();
        let v2 = f.manager.commit().unwrap();
        assert_eq!(f.index.len(v1).unwrap(), 1);
        assert_eq!(f.index.len(v2).unwrap(), 2);
        assert!(!f.index.exists(&3, v2).unwrap());
    }

    #[test]
    fn test_write_outside_transaction() {
        let f = create_fixture();
        let err = f.index.insert(RowId::new(0), &person(1)).unwrap_err();
        assert!(err.is_illegal_state());
    }
}
