//! Row store benchmarks for Strata.
//!
//! Benchmarks for:
//! - Bulk inserts with and without indexes
//! - Point reads at the latest and at older versions
//! - Field updates in one transaction
//! - Undo and redo of a large transaction

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strata_bench::utils::{generate_items, item_label, item_store, load};

/// Benchmark bulk insert of one transaction.
fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("tables/insert");

    for size in [1000, 10_000].iter() {
        let items = generate_items(*size);
        group.throughput(Throughput::Elements(*size as u64));
        for indexed in [false, true] {
            let name = if indexed { "indexed" } else { "plain" };
            group.bench_with_input(BenchmarkId::new(name, size), &items, |b, items| {
                b.iter(|| {
                    let (store, table) = item_store(indexed).expect("store");
                    let view = store.snapshot().expect("snapshot");
                    black_box(load(&view, table, items).expect("load"))
                });
            });
        }
    }

    group.finish();
}

/// Benchmark field reads at the latest version and at a version many
/// updates in the past.
fn bench_versioned_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("tables/read");
    let (store, table) = item_store(false).expect("store");
    let view = store.snapshot().expect("snapshot");
    let rows = load(&view, table, &generate_items(10_000)).expect("load");
    let first = view.version();

    for round in 0..20 {
        view.start_transaction().expect("begin");
        let items = view.table(table).expect("table");
        for row in rows.iter().step_by(7) {
            items.set_field(*row, &item_label(), format!("r{round}")).expect("update");
        }
        view.commit().expect("commit");
    }
    let latest = view.version();

    for (name, version) in [("latest", latest), ("oldest", first)] {
        group.bench_function(name, |b| {
            let view = store.snapshot().expect("snapshot");
            view.advance_to(version).expect("advance");
            let mut rng = StdRng::seed_from_u64(7);
            b.iter(|| {
                let row = rows[rng.gen_range(0..rows.len())];
                let items = view.table(table).expect("table");
                black_box(items.get_field(row, &item_label()).expect("read"))
            });
        });
    }

    group.finish();
}

/// Benchmark undo followed by redo of one 5000-row transaction.
fn bench_undo_redo(c: &mut Criterion) {
    let mut group = c.benchmark_group("tables/undo_redo");
    let (store, table) = item_store(true).expect("store");
    let view = store.snapshot().expect("snapshot");
    load(&view, table, &generate_items(5000)).expect("load");

    group.throughput(Throughput::Elements(5000));
    group.bench_function("5000_rows", |b| {
        b.iter(|| {
            view.undo().expect("undo");
            black_box(view.redo().expect("redo"))
        });
    });

    group.finish();
}

criterion_group!(benches, bench_insert, bench_versioned_read, bench_undo_redo);
criterion_main!(benches);
