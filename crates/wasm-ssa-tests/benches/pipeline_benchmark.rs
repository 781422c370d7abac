use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use wasm_ssa_tests::{diamond_function, loop_function, wide_join_function};

fn diamond_pipeline_bench(c: &mut Criterion) {
    c.bench_function("diamond merge through build+optimize+layout", |b| {
        b.iter(|| {
            let mut builder = diamond_function().unwrap();
            builder.run_passes().unwrap();
            black_box(builder.layout_blocks().unwrap());
        })
    });
}

fn loop_pipeline_bench(c: &mut Criterion) {
    c.bench_function("counting loop through build+optimize+layout", |b| {
        b.iter(|| {
            let mut builder = loop_function(black_box(64)).unwrap();
            builder.run_passes().unwrap();
            black_box(builder.layout_blocks().unwrap());
        })
    });
}

fn wide_join_pipeline_bench(c: &mut Criterion) {
    c.bench_function("wide join duplication through build+optimize+layout", |b| {
        b.iter(|| {
            let (mut builder, _dest) = wide_join_function(black_box(16)).unwrap();
            builder.run_passes().unwrap();
            black_box(builder.layout_blocks().unwrap());
        })
    });
}

criterion_group!(benches, diamond_pipeline_bench, loop_pipeline_bench, wide_join_pipeline_bench);
criterion_main!(benches);
