//! Criterion benchmarks for repeated reads of dynamic and baked data.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use strap_bench::{call_target, dynamic, sum_state};
use strap_bind::data;

fn bench_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("sum");
    for len in [16usize, 256, 4096] {
        let values: Vec<i64> = (0..len as i64).collect();

        let mut state = sum_state();
        let table = dynamic(&mut state, &values).expect("fixture data is writable");
        group.bench_with_input(BenchmarkId::new("dynamic", len), &table, |b, t| {
            b.iter(|| call_target(&mut state, black_box(std::slice::from_ref(t))))
        });

        let mut state = sum_state();
        let table = dynamic(&mut state, &values).expect("fixture data is writable");
        state.push(table);
        data::to_native(&mut state, -1).expect("plain tables can be marked");
        let marked = state.pop_value();
        state.pop(1);
        group.bench_with_input(BenchmarkId::new("baked", len), &marked, |b, m| {
            b.iter(|| call_target(&mut state, black_box(std::slice::from_ref(m))))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_reads);
criterion_main!(benches);
