//! Benchmark: petek throughput against a read-write-locked std map.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::collections::HashMap as StdHashMap;
use std::sync::{Arc, RwLock};
use std::thread;

// Number of operations per benchmark
const SMALL_OPS: usize = 1_000;
const MEDIUM_OPS: usize = 10_000;
const LARGE_OPS: usize = 100_000;

// Thread counts to test
const THREAD_COUNTS: &[usize] = &[1, 2, 4, 8];

/// Benchmark: Single-threaded insert operations
fn bench_single_thread_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_thread_insert");

    for &size in &[SMALL_OPS, MEDIUM_OPS, LARGE_OPS] {
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("petek", size), &size, |b, &size| {
            b.iter(|| {
                let map = petek::HashMap::new();
                for i in 0..size {
                    map.insert(black_box(i), black_box(i * 2)).unwrap();
                }
                map
            });
        });

        group.bench_with_input(BenchmarkId::new("rwlock-std", size), &size, |b, &size| {
            b.iter(|| {
                let map = RwLock::new(StdHashMap::new());
                for i in 0..size {
                    map.write().unwrap().insert(black_box(i), black_box(i * 2));
                }
                map
            });
        });
    }

    group.finish();
}

/// Benchmark: Single-threaded get operations
fn bench_single_thread_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_thread_get");

    for &size in &[SMALL_OPS, MEDIUM_OPS, LARGE_OPS] {
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("petek", size), &size, |b, &size| {
            let map = petek::HashMap::new();
            for i in 0..size {
                map.insert(i, i * 2).unwrap();
            }
            b.iter(|| {
                let mut sum = 0;
                for i in 0..size {
                    if let Some(v) = map.get(&black_box(i)) {
                        sum += v;
                    }
                }
                sum
            });
        });

        group.bench_with_input(BenchmarkId::new("rwlock-std", size), &size, |b, &size| {
            let map = RwLock::new(StdHashMap::new());
            for i in 0..size {
                map.write().unwrap().insert(i, i * 2);
            }
            b.iter(|| {
                let mut sum = 0;
                for i in 0..size {
                    if let Some(v) = map.read().unwrap().get(&black_box(i)) {
                        sum += v;
                    }
                }
                sum
            });
        });
    }

    group.finish();
}

/// Benchmark: Concurrent insert operations
fn bench_concurrent_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_insert");
    group.sample_size(20);

    for &threads in THREAD_COUNTS {
        let ops_per_thread = MEDIUM_OPS / threads;
        let total_ops = ops_per_thread * threads;
        group.throughput(Throughput::Elements(total_ops as u64));

        group.bench_with_input(
            BenchmarkId::new("petek", threads),
            &(threads, ops_per_thread),
            |b, &(threads, ops)| {
                b.iter(|| {
                    let map = Arc::new(petek::HashMap::new());
                    let handles: Vec<_> = (0..threads)
                        .map(|t| {
                            let m = map.clone();
                            thread::spawn(move || {
                                for i in 0..ops {
                                    let key = t * ops + i;
                                    m.insert(black_box(key), black_box(key * 2)).unwrap();
                                }
                            })
                        })
                        .collect();
                    for h in handles {
                        h.join().unwrap();
                    }
                    map
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("rwlock-std", threads),
            &(threads, ops_per_thread),
            |b, &(threads, ops)| {
                b.iter(|| {
                    let map = Arc::new(RwLock::new(StdHashMap::new()));
                    let handles: Vec<_> = (0..threads)
                        .map(|t| {
                            let m = map.clone();
                            thread::spawn(move || {
                                for i in 0..ops {
                                    let key = t * ops + i;
                                    m.write().unwrap().insert(black_box(key), black_box(key * 2));
                                }
                            })
                        })
                        .collect();
                    for h in handles {
                        h.join().unwrap();
                    }
                    map
                });
            },
        );
    }

    group.finish();
}

/// Benchmark: Read-heavy concurrent workload
fn bench_concurrent_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_get");
    group.sample_size(20);

    for &threads in THREAD_COUNTS {
        let ops_per_thread = MEDIUM_OPS / threads;
        let total_ops = ops_per_thread * threads;
        group.throughput(Throughput::Elements(total_ops as u64));

        group.bench_with_input(
            BenchmarkId::new("petek", threads),
            &(threads, ops_per_thread),
            |b, &(threads, ops)| {
                let map = Arc::new(petek::HashMap::new());
                for i in 0..MEDIUM_OPS {
                    map.insert(i, i * 2).unwrap();
                }
                b.iter(|| {
                    let handles: Vec<_> = (0..threads)
                        .map(|_| {
                            let m = map.clone();
                            thread::spawn(move || {
                                let mut sum = 0;
                                for i in 0..ops {
                                    if let Some(v) = m.get(&black_box(i)) {
                                        sum += v;
                                    }
                                }
                                sum
                            })
                        })
                        .collect();
                    handles
                        .into_iter()
                        .map(|h| h.join().unwrap())
                        .sum::<usize>()
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_single_thread_insert,
    bench_single_thread_get,
    bench_concurrent_insert,
    bench_concurrent_get
);
criterion_main!(benches);
