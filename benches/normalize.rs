use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};

use skiff::alg::normalize::normalize;
use skiff::alg::{lit, var};

fn bench_normalize(c: &mut Criterion) {
    let quartic = ((var("x") + lit(2)) * (var("x") + lit(3))).pow(lit(2));
    c.bench_function("normalize_quartic", |b| {
        b.iter(|| normalize(black_box(&quartic)))
    });

    let mixed = (lit(2) + var("x")) * (lit(8) + var("x").pow(lit(2)))
        - (lit(3) - (var("x") * lit(4)).pow(lit(2)));
    c.bench_function("normalize_mixed", |b| {
        b.iter(|| normalize(black_box(&mixed)))
    });
}

criterion_group!(benches, bench_normalize);
criterion_main!(benches);
