use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use scoby::manifest::{self, DependencyGraph, ManifestSource};
use scoby::{normalize_path, resolve};
use serde_json::{Value, json};
use std::path::Path;

const SHA: &str = "24a9fcb3286fb9267443ceb3416dd4e64956641662a1154bdb78d23ec030e5b3";

/// `width` formulae per layer, each depending on every formula in the layer below
fn layered_graph(layers: usize, width: usize) -> DependencyGraph {
    let mut records = Vec::new();
    for layer in 0..layers {
        for i in 0..width {
            let deps: Vec<String> = if layer == 0 {
                Vec::new()
            } else {
                (0..width).map(|j| format!("pkg-{}-{}", layer - 1, j)).collect()
            };
            records.push(json!({
                "name": format!("pkg-{}-{}", layer, i),
                "version": "1.0",
                "url": "https://example.invalid/pkg.tar.gz",
                "sha256": SHA,
                "depends_on": deps,
            }));
        }
    }
    let source = ManifestSource::new("bench.json", Value::Array(records).to_string());
    manifest::load(&[source]).unwrap()
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");

    for (layers, width) in [(5, 4), (10, 10), (20, 25)] {
        let graph = layered_graph(layers, width);
        let targets: Vec<String> = (0..width)
            .map(|i| format!("pkg-{}-{}", layers - 1, i))
            .collect();

        group.bench_with_input(
            BenchmarkId::new("layered", graph.len()),
            &(graph, targets),
            |b, (graph, targets)| b.iter(|| resolve(black_box(graph), black_box(targets))),
        );
    }

    group.finish();
}

fn bench_load(c: &mut Criterion) {
    let records: Vec<Value> = (0..500)
        .map(|i| {
            json!({
                "name": format!("tool-{}", i),
                "version": "2.3.1",
                "url": "https://example.invalid/tool.tar.gz",
                "sha256": SHA,
                "install_steps": [["pip", "install", "--prefix", "{keg}", "."]],
                "test_steps": [{"run": ["{keg}/bin/tool", "--version"], "expect_output": "2.3.1"}],
            })
        })
        .collect();
    let contents = Value::Array(records).to_string();

    c.bench_function("load 500 formulae", |b| {
        b.iter(|| manifest::load(&[ManifestSource::new("bench.json", black_box(contents.as_str()))]))
    });
}

fn bench_normalize_path(c: &mut Criterion) {
    let test_paths = [
        Path::new("foo/bar/../baz"),
        Path::new("./foo/./bar"),
        Path::new("/opt/scoby/bin/../Cellar/dotcat/0.9.6/bin/dotcat"),
        Path::new("a/b/c/../../d"),
    ];

    c.bench_function("normalize_path", |b| {
        b.iter(|| {
            for path in &test_paths {
                let _ = normalize_path(black_box(path));
            }
        })
    });
}

criterion_group!(benches, bench_resolve, bench_load, bench_normalize_path);
criterion_main!(benches);
