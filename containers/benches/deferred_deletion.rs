//! Benchmarks for the deferred deletion ring
//!
//! Simulates a frame loop which retires a batch of items every frame and rotates the ring, for a
//! few frames in flight counts and batch sizes.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use kiln_containers::prelude::DeferredDeletion;
use std::hint::black_box;

fn benchmark_deferred_deletion_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("deferred_deletion_frames");
    group.sample_size(100);
    for frames_in_flight in [1usize, 2, 3].iter() {
        for batch in [10u64, 1_000, 100_000].iter() {
            group.bench_with_input(
                BenchmarkId::new(format!("fif_{}", frames_in_flight), batch),
                batch,
                |b, &batch| {
                    b.iter(|| {
                        let mut ring: DeferredDeletion<Vec<u8>> =
                            DeferredDeletion::new(*frames_in_flight).unwrap();
                        for frame in 0..16u64 {
                            ring.extend((0..batch).map(|i| vec![(i ^ frame) as u8; 4]));
                            black_box(ring.rotate());
                        }
                        black_box(ring.flush())
                    });
                },
            );
        }
    }

    group.finish();
}

fn benchmark_deferred_deletion_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("deferred_deletion_push");
    group.sample_size(100);
    for size in [100u64, 10_000, 1_000_000].iter() {
        group.bench_with_input(BenchmarkId::new("push", size), size, |b, &size| {
            b.iter_batched(
                || DeferredDeletion::<u64>::new(2).unwrap(),
                |mut ring| {
                    for i in 0..size {
                        ring.push(black_box(i));
                    }
                    black_box(ring)
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_deferred_deletion_frames,
    benchmark_deferred_deletion_push
);
criterion_main!(benches);
