//! Criterion benchmarks for the native call paths.
//!
//! Compares a fixed-signature call, overload resolution that succeeds on the
//! first or last candidate, and bulk dispatch through the builder pipeline.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use strap_bench::{average_state, call_target, dynamic, mul_state, plus_state};

fn bench_fixed(c: &mut Criterion) {
    let mut state = average_state();
    c.bench_function("call/average", |b| {
        b.iter(|| call_target(&mut state, black_box(&[3.into(), 5.into()])))
    });
}

fn bench_overloads(c: &mut Criterion) {
    let mut group = c.benchmark_group("overloads");

    let mut state = plus_state();
    group.bench_function("first", |b| {
        b.iter(|| call_target(&mut state, black_box(&[1.into(), 2.into()])))
    });

    let mut state = plus_state();
    let a = dynamic(&mut state, &vec![1.0, 2.0]).expect("fixture data is writable");
    let pair = [a.clone(), a];
    group.bench_function("last", |b| b.iter(|| call_target(&mut state, black_box(&pair))));

    group.finish();
}

fn bench_bulk(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk");

    let mut state = mul_state();
    let m = dynamic(&mut state, &vec![1.0, 2.0, 3.0, 4.0]).expect("fixture data is writable");
    let v = dynamic(&mut state, &vec![1.0, 2.0]).expect("fixture data is writable");
    let square = [m, v];
    group.bench_function("mul/2x2", |b| {
        b.iter(|| call_target(&mut state, black_box(&square)))
    });

    let m = dynamic(&mut state, &vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).expect("fixture data is writable");
    let v = dynamic(&mut state, &vec![1.0, 2.0]).expect("fixture data is writable");
    let ambiguous = [m, v];
    group.bench_function("mul/3x2", |b| {
        b.iter(|| call_target(&mut state, black_box(&ambiguous)))
    });

    group.finish();
}

criterion_group!(benches, bench_fixed, bench_overloads, bench_bulk);
criterion_main!(benches);
