//! Benchmarks for graph construction and dry convergence.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use infraflow::graph::build;
use infraflow::provision::Provisioner;
use infraflow::testing::{layered, RecordingProvider};
use std::sync::Arc;

fn graph_benchmark(c: &mut Criterion) {
    c.bench_function("build_layered_20x10", |b| {
        b.iter(|| build(black_box(layered(20, 10))))
    });

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let graph = build(layered(20, 10)).unwrap();
    let provisioner = Provisioner::new(Arc::new(RecordingProvider::new()));
    let state = runtime.block_on(provisioner.apply(&graph, Default::default())).unwrap().state;

    c.bench_function("noop_apply_layered_20x10", |b| {
        b.iter(|| runtime.block_on(provisioner.apply(&graph, black_box(state.clone()))))
    });
}

criterion_group!(benches, graph_benchmark);
criterion_main!(benches);
