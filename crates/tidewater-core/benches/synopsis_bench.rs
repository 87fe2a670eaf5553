//! Synopsis benchmarks
//!
//! Measures window maintenance on the enqueue path and the reference
//! consistency check run on every completed window.
//!
//! Run with: cargo bench --bench synopsis_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use tidewater_core::schema::Schema;
use tidewater_core::tuple::{RelationId, Tuple, TupleRef};
use tidewater_core::value::{Value, ValueType};
use tidewater_core::window::{Synopsis, Window};

/// Create `n` stamped tuples with increasing arrival times
fn create_tuples(n: i64) -> Vec<TupleRef> {
    let schema = Schema::of(&[("price", ValueType::Int)]);
    (0..n)
        .map(|i| {
            Tuple::new(Arc::clone(&schema), vec![Value::Int(i)], i)
                .unwrap()
                .stamped(RelationId(0), 1)
        })
        .collect()
}

/// Benchmark enqueue into tumbling and sliding tuple windows
fn bench_tuple_enqueue(c: &mut Criterion) {
    let mut group = c.benchmark_group("tuple_synopsis_enqueue");
    let tuples = create_tuples(10_000);

    for (width, stride) in [(5u64, 5u64), (100, 100), (100, 10)] {
        group.throughput(Throughput::Elements(tuples.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("window", format!("{width}x{stride}")),
            &(width, stride),
            |b, &(width, stride)| {
                b.iter(|| {
                    let mut synopsis = Synopsis::new(&Window::tuples(width, stride));
                    let mut slides = 0u64;
                    for t in &tuples {
                        synopsis.enqueue(Arc::clone(t), |_| slides += 1);
                    }
                    black_box(slides)
                })
            },
        );
    }

    group.finish();
}

/// Benchmark enqueue into a time window
fn bench_time_enqueue(c: &mut Criterion) {
    let mut group = c.benchmark_group("time_synopsis_enqueue");
    let tuples = create_tuples(10_000);

    group.throughput(Throughput::Elements(tuples.len() as u64));
    group.bench_function("100x50", |b| {
        b.iter(|| {
            let mut synopsis = Synopsis::new(&Window::time(100, 50));
            let mut slides = 0u64;
            for t in &tuples {
                synopsis.enqueue(Arc::clone(t), |_| slides += 1);
            }
            black_box(slides)
        })
    });

    group.finish();
}

/// Benchmark the per-window consistency check
fn bench_consistency(c: &mut Criterion) {
    let mut group = c.benchmark_group("reference_consistency");

    for width in [5u64, 100, 1000] {
        let mut synopsis = Synopsis::new(&Window::tuples(width, width));
        for t in create_tuples(i64::try_from(width).unwrap() - 1) {
            synopsis.enqueue(t, |_| {});
        }
        group.throughput(Throughput::Elements(width));
        group.bench_with_input(BenchmarkId::from_parameter(width), &synopsis, |b, synopsis| {
            b.iter(|| black_box(synopsis.has_reference_consistency()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_tuple_enqueue, bench_time_enqueue, bench_consistency);
criterion_main!(benches);
