//! Copy engine benchmarks.
//!
//! Measures the per-chunk overhead of the throttled copy loop against in-memory
//! streams, with and without a limiter in the path. The limited case uses a rate far
//! above what the loop can reach, so it measures bucket bookkeeping rather than pacing.
//!
//! ## Run
//! ```bash
//! cargo bench --bench bench_copy
//! cargo bench --bench bench_copy -- --save-baseline main
//! ```

use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use throttle_proxy_lib::{CopyEngine, IoLimiter, LimitRule, CHUNK_SIZE};
use tokio_util::sync::CancellationToken;

const PAYLOAD_SIZES: [usize; 3] = [CHUNK_SIZE, 64 * CHUNK_SIZE, 1024 * CHUNK_SIZE];

/// 64 GiB/s; never pauses at these payload sizes
const UNREACHABLE_RATE: u64 = 64 * 1024 * 1024 * 1024;

fn runtime() -> tokio::runtime::Runtime {
    match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => panic!("failed to build tokio runtime: {e}"),
    }
}

fn bench_copy(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("copy");

    let engines = [
        ("unlimited", CopyEngine::new(LimitRule::unlimited(), None)),
        ("limited", CopyEngine::new(LimitRule::new(UNREACHABLE_RATE, Duration::ZERO), None)),
    ];

    for size in PAYLOAD_SIZES {
        let payload = vec![0xa5u8; size];
        group.throughput(Throughput::Bytes(size as u64));

        for (name, engine) in &engines {
            group.bench_with_input(BenchmarkId::new(*name, size), &payload, |b, payload| {
                b.to_async(&rt).iter(|| async {
                    let mut src: &[u8] = payload;
                    let mut dest = tokio::io::sink();
                    let cancel = CancellationToken::new();
                    match engine.copy(&cancel, &mut dest, &mut src).await {
                        Ok(written) => written,
                        Err(e) => panic!("copy failed: {e}"),
                    }
                });
            });
        }
    }
    group.finish();
}

fn bench_admit(c: &mut Criterion) {
    let mut group = c.benchmark_group("limiter");

    let limiter = IoLimiter::new(LimitRule::new(UNREACHABLE_RATE, Duration::ZERO));
    group.bench_function("try_admit", |b| {
        b.iter(|| limiter.try_admit(std::hint::black_box(CHUNK_SIZE)));
    });

    let disabled = IoLimiter::disabled();
    group.bench_function("try_admit_disabled", |b| {
        b.iter(|| disabled.try_admit(std::hint::black_box(CHUNK_SIZE)));
    });

    group.finish();
}

criterion_group!(benches, bench_copy, bench_admit);
criterion_main!(benches);
