//! Benchmark utilities and helpers.

use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strata_common::config::StoreConfig;
use strata_common::error::StoreResult;
use strata_common::types::RowId;
use strata_engine::{Column, Store, StoreSnapshot, TableRef};

/// Benchmark record: a unique id, a label and a range-indexed score.
#[derive(Clone, Default, PartialEq, Debug)]
pub struct Item {
    /// Unique key.
    pub id: u64,
    /// Free text.
    pub label: String,
    /// Range-indexed value.
    pub score: i64,
}

/// `Item::id`.
pub fn item_id() -> Column<Item, u64> {
    Column::new("Id", 0, |i: &Item| i.id, |i, v| i.id = v)
}

/// `Item::label`.
pub fn item_label() -> Column<Item, String> {
    Column::new("Label", 1, |i: &Item| i.label.clone(), |i, v| i.label = v)
}

/// `Item::score`.
pub fn item_score() -> Column<Item, i64> {
    Column::new("Score", 2, |i: &Item| i.score, |i, v| i.score = v)
}

/// Generates random string data for benchmarks.
pub fn random_string(rng: &mut StdRng, len: usize) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generates `count` items with sequential ids and random scores.
pub fn generate_items(count: usize) -> Vec<Item> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..count as u64)
        .map(|i| Item {
            id: i + 1,
            label: random_string(&mut rng, 12),
            score: rng.gen_range(0..1_000_000),
        })
        .collect()
}

/// Builds a frozen store with one `Item` table.
///
/// `indexed` adds the unique index on `id` and the range index on `score`.
pub fn item_store(indexed: bool) -> StoreResult<(Arc<Store>, TableRef<Item>)> {
    let mut store = Store::new(StoreConfig::default())?;
    let items = store.create_table::<Item>("Item")?;
    if indexed {
        store.make_primary_key(items, item_id())?;
        store.create_index(items, item_score())?;
    }
    store.freeze();
    Ok((Arc::new(store), items))
}

/// Inserts `items` in one committed transaction.
pub fn load(view: &StoreSnapshot, table: TableRef<Item>, items: &[Item]) -> StoreResult<Vec<RowId>> {
    view.start_transaction()?;
    let target = view.table(table)?;
    let mut rows = Vec::with_capacity(items.len());
    for item in items {
        rows.push(target.insert(item.clone())?);
    }
    view.commit()?;
    Ok(rows)
}
