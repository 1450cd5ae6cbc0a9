//! Benchmarks for tree operations matching real index usage patterns
//!
//! - RCU performance (lock-free reads during writes)
//! - O(log n) keyed and rank lookups
//! - CAS write throughput as the tree grows
//! - Spatial query pruning on clustered rectangles

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use spantree::{BTreeMap, QTreeMap, Rect};

fn shuffled_keys(n: u64) -> Vec<u64> {
    let mut keys: Vec<u64> = (0..n).collect();
    keys.shuffle(&mut StdRng::seed_from_u64(7));
    keys
}

fn filled_map(n: u64) -> BTreeMap<u64, u64> {
    let map = BTreeMap::new();
    for k in shuffled_keys(n) {
        map.put(k, k);
    }
    map
}

/// Benchmark CAS writes at increasing tree depths
fn bench_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("put");
    for size in [100u64, 1_000, 10_000].iter() {
        let keys = shuffled_keys(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let map = BTreeMap::new();
                for &k in &keys {
                    map.put(k, k);
                }
                std::hint::black_box(map.len());
            });
        });
    }
    group.finish();
}

/// Benchmark point reads against a shared snapshot
fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");
    for size in [1_000u64, 10_000, 100_000].iter() {
        let map = filled_map(*size);
        let probes = shuffled_keys(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            let mut i = 0;
            b.iter(|| {
                let k = probes[i % probes.len()];
                i += 1;
                std::hint::black_box(map.get(&k));
            });
        });
    }
    group.finish();
}

/// Benchmark reads while a writer churns the map (RCU path)
fn bench_reads_during_writes(c: &mut Criterion) {
    let map = Arc::new(filled_map(10_000));
    let stop = Arc::new(AtomicBool::new(false));

    let writer_map = Arc::clone(&map);
    let writer_stop = Arc::clone(&stop);
    let writer = thread::spawn(move || {
        let mut round = 0u64;
        while !writer_stop.load(Ordering::Relaxed) {
            writer_map.put(round % 10_000, round);
            round += 1;
        }
    });

    c.bench_function("reads_during_writes", |b| {
        let mut i = 0u64;
        b.iter(|| {
            std::hint::black_box(map.get(&(i % 10_000)));
            i += 1;
        });
    });

    stop.store(true, Ordering::Relaxed);
    writer.join().unwrap();
}

/// Benchmark full snapshot traversal
fn bench_snapshot_scan(c: &mut Criterion) {
    let map = filled_map(10_000);
    c.bench_function("snapshot_scan", |b| {
        b.iter(|| {
            let snap = map.snapshot();
            std::hint::black_box(snap.iter().count());
        });
    });
}

/// Benchmark incremental fold maintenance against a full rescan
fn bench_reduce(c: &mut Criterion) {
    let map: BTreeMap<u64, u64, u64> = BTreeMap::default();
    for k in shuffled_keys(10_000) {
        map.put(k, k);
    }
    c.bench_function("reduce_after_single_write", |b| {
        let mut i = 0u64;
        b.iter(|| {
            map.put(i % 10_000, i);
            i += 1;
            std::hint::black_box(map.reduced(0, |acc, v| acc + v, |a, b| a + b));
        });
    });
}

/// Benchmark rectangle queries over clustered data
fn bench_spatial_query(c: &mut Criterion) {
    let map = QTreeMap::new();
    for k in 0..10_000u64 {
        let x = (k * 37) % 4096;
        let y = (k * 91) % 4096;
        map.put(k, Rect::new(x, y, x + 8, y + 8), k);
    }
    c.bench_function("spatial_query", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let x = (i * 131) % 4000;
            i += 1;
            let hits = map
                .query(Rect::new(x, x % 2048, x + 64, x % 2048 + 64))
                .count();
            std::hint::black_box(hits);
        });
    });
}

criterion_group!(
    benches,
    bench_put,
    bench_get,
    bench_reads_during_writes,
    bench_snapshot_scan,
    bench_reduce,
    bench_spatial_query
);
criterion_main!(benches);
