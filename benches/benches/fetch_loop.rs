//! End-to-end benchmarks of the fetch service against mock transports.
//!
//! Measures the time from `run()` until the first complete snapshot.

use std::{sync::OnceLock, time::Duration};

use adaptive_log_fetcher::assert_snapshot;
use adaptive_log_fetcher_benches::{ChainShape, bench_builder, registry};
use anyhow::{Result, bail};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

static RUNTIME: OnceLock<tokio::runtime::Runtime> = OnceLock::new();

fn get_runtime() -> &'static tokio::runtime::Runtime {
    RUNTIME.get_or_init(|| tokio::runtime::Runtime::new().expect("failed to create tokio runtime"))
}

async fn run_fetch(shape: ChainShape, transports: usize) -> Result<()> {
    let handle = bench_builder().connect(registry(1, shape, transports)?)?.run();
    let mut stream = handle.subscribe();

    let snapshot = assert_snapshot!(stream, |s| s.is_complete(), timeout = 120);
    if snapshot.logs.len() != shape.expected_logs() {
        bail!("expected {} logs, got {}", shape.expected_logs(), snapshot.logs.len());
    }

    handle.shutdown().await?;
    Ok(())
}

fn fetch_loop_benchmark(c: &mut Criterion) {
    let rt = get_runtime();

    let mut group = c.benchmark_group("fetch_loop");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(30));

    let shapes = [
        ("unlimited", ChainShape { latest: 100_000, finalized: 99_000, log_step: 10, max_blocks: None }),
        (
            "limited_10k",
            ChainShape { latest: 100_000, finalized: 99_000, log_step: 10, max_blocks: Some(10_000) },
        ),
        (
            "limited_2k",
            ChainShape { latest: 100_000, finalized: 99_000, log_step: 10, max_blocks: Some(2_000) },
        ),
    ];

    for (name, shape) in shapes {
        for transports in [1usize, 3] {
            group.bench_with_input(
                BenchmarkId::new(name, transports),
                &(shape, transports),
                |b, &(shape, transports)| {
                    b.to_async(rt).iter(|| async move {
                        run_fetch(shape, transports).await.expect("fetch failed");
                    });
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, fetch_loop_benchmark);
criterion_main!(benches);
