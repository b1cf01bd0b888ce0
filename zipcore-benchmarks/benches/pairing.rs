use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;
use tokio::runtime::Runtime;
use zipcore::testing::prelude::*;
use zipcore::{ControlledZip, ZipRules};
use zipcore_benchmarks::{random_batches, run_zip, sorted_values};
use zipcore_memory::{ImmediateScheduler, IterSource, TokioScheduler};

const ELEMENTS: u64 = 10_000;

/// Lockstep zip with every batch split at random.
fn bench_lockstep(c: &mut Criterion) {
    let mut group = c.benchmark_group("lockstep");
    group.throughput(Throughput::Elements(ELEMENTS));

    for max_batch in [1, 16, 256] {
        let left = random_batches(1, (0..ELEMENTS).collect(), max_batch);
        let right = random_batches(2, (0..ELEMENTS).collect(), max_batch);

        group.bench_with_input(
            BenchmarkId::new("max_batch", max_batch),
            &(left, right),
            |b, (left, right)| {
                b.iter(|| {
                    black_box(run_zip(
                        left.clone(),
                        right.clone(),
                        ZipRules::lockstep(),
                        Arc::new(ImmediateScheduler),
                    ))
                });
            },
        );
    }
    group.finish();
}

/// Sorted merge join at different match densities.
fn bench_sorted_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("sorted_join");

    for density in [0.1, 0.5, 0.9] {
        let left_values = sorted_values(3, ELEMENTS, density);
        let right_values = sorted_values(4, ELEMENTS, density);
        group.throughput(Throughput::Elements(
            (left_values.len() + right_values.len()) as u64,
        ));
        let left = random_batches(5, left_values, 64);
        let right = random_batches(6, right_values, 64);

        group.bench_with_input(
            BenchmarkId::new("density", density),
            &(left, right),
            |b, (left, right)| {
                b.iter(|| {
                    black_box(run_zip(
                        left.clone(),
                        right.clone(),
                        ZipRules::sorted_join(),
                        Arc::new(ImmediateScheduler),
                    ))
                });
            },
        );
    }
    group.finish();
}

/// Producers on a multi-threaded runtime, downstream acks settled inline.
fn bench_tokio_scheduler(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let left = random_batches(7, (0..ELEMENTS).collect(), 64);
    let right = random_batches(8, (0..ELEMENTS).collect(), 64);

    let mut group = c.benchmark_group("tokio_scheduler");
    group.throughput(Throughput::Elements(ELEMENTS));
    group.bench_function("lockstep", |b| {
        b.iter(|| {
            rt.block_on(async {
                let scheduler = Arc::new(TokioScheduler::current().unwrap());
                let zip = ControlledZip::<u64, u64>::builder(
                    Arc::new(IterSource::new(left.clone())),
                    Arc::new(IterSource::new(right.clone())),
                    scheduler,
                )
                .build();
                let downstream = Arc::new(RecordingObserver::<(u64, u64)>::new());
                let _subscription = zip.observe(downstream.clone()).unwrap();
                downstream.wait_for_termination().await;
                black_box(downstream.items().len())
            })
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_lockstep,
    bench_sorted_join,
    bench_tokio_scheduler
);
criterion_main!(benches);
