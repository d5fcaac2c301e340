//! Benchmark for pool and scratch allocation.
//!
//! Run with: cargo bench --package tessera_core --bench allocator_benchmark

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tessera_core::{MemoryCategory, MemoryConfig, MemoryRegistry, ScratchArena, ScratchConfig};

fn benchmark_pool_round_trip(c: &mut Criterion) {
    let registry = MemoryRegistry::new(MemoryConfig::default());
    let mut group = c.benchmark_group("pool_round_trip");

    for size in [8usize, 64, 176, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let block = registry
                    .allocate(MemoryCategory::Geometry, black_box(size))
                    .unwrap();
                registry.deallocate(MemoryCategory::Geometry, black_box(block));
            });
        });
    }
    group.finish();
}

fn benchmark_pool_burst(c: &mut Criterion) {
    let registry = MemoryRegistry::new(MemoryConfig::default());
    let mut group = c.benchmark_group("pool_burst");
    group.throughput(Throughput::Elements(1000));

    group.bench_function("1000_mixed_sizes", |b| {
        let mut blocks = Vec::with_capacity(1000);
        b.iter(|| {
            for i in 0..1000usize {
                let size = (i * 37) % 300;
                blocks.push(registry.allocate(MemoryCategory::General, size).unwrap());
            }
            for block in blocks.drain(..) {
                registry.deallocate(MemoryCategory::General, block);
            }
        });
    });
    group.finish();
}

fn benchmark_scratch(c: &mut Criterion) {
    let registry = Arc::new(MemoryRegistry::new(MemoryConfig::default()));
    let arena = ScratchArena::new(registry, &ScratchConfig::default()).unwrap();

    c.bench_function("scratch_allocate_free", |b| {
        b.iter(|| {
            let block = arena.allocate(black_box(1024)).unwrap();
            arena.deallocate(block);
        });
    });

    c.bench_function("scratch_fragmented_16", |b| {
        b.iter(|| {
            let blocks: Vec<_> = (0..16).map(|i| arena.allocate(64 + i * 16).unwrap()).collect();
            for block in blocks.into_iter().rev() {
                arena.deallocate(block);
            }
        });
    });
}

criterion_group!(
    benches,
    benchmark_pool_round_trip,
    benchmark_pool_burst,
    benchmark_scratch
);
criterion_main!(benches);
