//! Benchmarks for invariant core operations.
//!
//! Run with: cargo bench
//!
//! Results include 95% confidence intervals via Criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use indexmap::IndexMap;
use invariant::core::hashing::{hash_value, manifest_digest};
use invariant::core::resolver::topological_sort;
use invariant::core::types::{Graph, Manifest, Vertex};
use invariant::expr::eval;
use invariant::{Param, Value};

fn bench_hash_value(c: &mut Criterion) {
    let mut group = c.benchmark_group("hash_value_list");
    for size in [16, 256, 4096] {
        let value = Value::List((0..size).map(|i| Value::int(i as i64)).collect());
        group.bench_with_input(BenchmarkId::from_parameter(size), &value, |b, value| {
            b.iter(|| {
                let hash = hash_value(black_box(value));
                black_box(hash);
            });
        });
    }
    group.finish();
}

fn bench_manifest_digest(c: &mut Criterion) {
    let mut group = c.benchmark_group("manifest_digest");
    for size in [4, 32, 256] {
        let mut manifest = Manifest::new();
        for i in 0..size {
            manifest.insert(format!("key-{i:04}"), Value::int(i as i64));
        }
        group.bench_with_input(
            BenchmarkId::from_parameter(size),
            &manifest,
            |b, manifest| {
                b.iter(|| {
                    let digest = manifest_digest(black_box(manifest));
                    black_box(digest);
                });
            },
        );
    }
    group.finish();
}

fn bench_expression_eval(c: &mut Criterion) {
    let mut env = IndexMap::new();
    env.insert("x".to_string(), Value::int(7));
    env.insert("y".to_string(), Value::int(3));

    c.bench_function("eval_arithmetic", |b| {
        b.iter(|| {
            let result = eval(black_box("min(x, y) + max(x, y) * 2"), &env).unwrap();
            black_box(result);
        });
    });

    c.bench_function("eval_decimal", |b| {
        b.iter(|| {
            let result = eval(black_box("decimal(\"1.5\") * decimal(\"2.5\")"), &env).unwrap();
            black_box(result);
        });
    });
}

fn bench_topo_sort(c: &mut Criterion) {
    // Linear chain of N vertices.
    let mut group = c.benchmark_group("topo_sort");
    for n in [10, 50, 100] {
        let mut graph = Graph::new();
        for i in 0..n {
            let deps = if i > 0 {
                vec![format!("node-{:04}", i - 1)]
            } else {
                vec![]
            };
            let mut params = IndexMap::new();
            params.insert("value".to_string(), Param::lit(i as i64));
            graph.insert(
                format!("node-{i:04}"),
                Vertex::op("identity", params, deps).unwrap(),
            );
        }
        group.bench_with_input(BenchmarkId::from_parameter(n), &graph, |b, graph| {
            b.iter(|| {
                let order = topological_sort(black_box(graph));
                black_box(order);
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_hash_value,
    bench_manifest_digest,
    bench_expression_eval,
    bench_topo_sort
);
criterion_main!(benches);
