//! Fragment dependency DAG layering cost (spec §4.4), mirroring the
//! source repo's `graph_compile.rs` shape: linear chains and fan-out
//! shapes swept across sizes.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;

use kgraph_ingest::batch::layer_fragments;
use kgraph_ingest::model::{ChangeFragment, FragmentChangeType, FragmentOperation};

fn linear_chain(n: usize) -> Vec<ChangeFragment> {
    (0..n)
        .map(|i| {
            let mut f = ChangeFragment::new(
                format!("f{i}"),
                "evt",
                FragmentChangeType::Entity,
                FragmentOperation::Add,
                json!({}),
            );
            if i > 0 {
                f = f.depends_on(format!("f{}", i - 1));
            }
            f
        })
        .collect()
}

fn fanout(width: usize) -> Vec<ChangeFragment> {
    let root = ChangeFragment::new("root", "evt", FragmentChangeType::Entity, FragmentOperation::Add, json!({}));
    let mut fragments = vec![root];
    for i in 0..width {
        fragments.push(
            ChangeFragment::new(
                format!("leaf{i}"),
                "evt",
                FragmentChangeType::Relationship,
                FragmentOperation::Add,
                json!({}),
            )
            .depends_on("root"),
        );
    }
    fragments
}

fn bench_linear(c: &mut Criterion) {
    let mut group = c.benchmark_group("dag_layer_linear");
    for size in [10, 50, 100, 200] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| layer_fragments("evt", linear_chain(size)).expect("no cycle"));
        });
    }
    group.finish();
}

fn bench_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("dag_layer_fanout");
    for width in [10, 50, 100, 200] {
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, &width| {
            b.iter(|| layer_fragments("evt", fanout(width)).expect("no cycle"));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_linear, bench_fanout);
criterion_main!(benches);
