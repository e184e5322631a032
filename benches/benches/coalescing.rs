//! Benchmarks for cache coalescing and rehydration.

use std::sync::OnceLock;

use adaptive_log_fetcher::{
    MemoryStore,
    cache::{LogStore, coalesce_entries, rehydrate},
};
use adaptive_log_fetcher_benches::{cache_prefix, fragmented_entries};
use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

static RUNTIME: OnceLock<tokio::runtime::Runtime> = OnceLock::new();

fn get_runtime() -> &'static tokio::runtime::Runtime {
    RUNTIME.get_or_init(|| tokio::runtime::Runtime::new().expect("failed to create tokio runtime"))
}

fn coalescing_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("coalesce_entries");

    for count in [100u64, 1_000, 10_000] {
        let entries = fragmented_entries(count, 1_000, 50);
        let finalized = count * 1_000;
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::from_parameter(count), &entries, |b, entries| {
            b.iter_batched(
                || entries.clone(),
                |entries| coalesce_entries(entries, finalized),
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

fn rehydrate_benchmark(c: &mut Criterion) {
    let rt = get_runtime();
    let prefix = cache_prefix(1);
    let mut group = c.benchmark_group("rehydrate");

    for count in [100u64, 1_000] {
        let entries = fragmented_entries(count, 1_000, 50);
        let finalized = count * 1_000;
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::from_parameter(count), &entries, |b, entries| {
            b.iter_batched(
                || {
                    let store = MemoryStore::new();
                    rt.block_on(async {
                        for entry in entries {
                            store
                                .set(prefix.key(entry.from_block), entry.clone())
                                .await
                                .expect("memory store never fails");
                        }
                    });
                    store
                },
                |store| {
                    rt.block_on(rehydrate(&store, &prefix, finalized))
                        .expect("memory store never fails")
                },
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, coalescing_benchmark, rehydrate_benchmark);
criterion_main!(benches);
