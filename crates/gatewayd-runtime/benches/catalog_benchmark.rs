use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use gatewayd_runtime::catalog::{build_snapshot, compile_uri_template, BackendContribution};
use serde_json::json;

fn contribution(backend_id: &str, tool_count: usize) -> BackendContribution {
    let tools = (0..tool_count)
        .map(|i| json!({"name": format!("{backend_id}_tool_{i}"), "description": "bench tool"}))
        .collect();
    BackendContribution {
        backend_id: backend_id.to_string(),
        tools,
        resources: vec![json!({
            "uriTemplate": format!("{backend_id}://items/{{id}}"),
            "name": "items",
        })],
        prompts: vec![],
    }
}

fn snapshot_build_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("catalog_build_snapshot");

    for backend_count in [1, 10, 50].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(backend_count),
            backend_count,
            |b, &count| {
                let contributions: Vec<BackendContribution> = (0..count)
                    .map(|i| contribution(&format!("backend_{i}"), 20))
                    .collect();

                b.iter(|| {
                    let snapshot = build_snapshot(black_box(&contributions));
                    black_box(snapshot);
                });
            },
        );
    }

    group.finish();
}

fn tools_list_benchmark(c: &mut Criterion) {
    let contributions: Vec<BackendContribution> =
        (0..20).map(|i| contribution(&format!("backend_{i}"), 25)).collect();
    let snapshot = build_snapshot(&contributions);

    c.bench_function("catalog_build_snapshot/tools_list", |b| {
        b.iter(|| {
            let tools = snapshot.tools_list();
            black_box(tools);
        });
    });
}

fn uri_template_compile_benchmark(c: &mut Criterion) {
    c.bench_function("catalog_build_snapshot/compile_uri_template", |b| {
        b.iter(|| {
            let regex = compile_uri_template(black_box("backend://collections/{collection}/items/{id}"));
            black_box(regex);
        });
    });
}

fn uri_template_match_benchmark(c: &mut Criterion) {
    let contributions: Vec<BackendContribution> =
        (0..20).map(|i| contribution(&format!("backend_{i}"), 25)).collect();
    let snapshot = build_snapshot(&contributions);

    c.bench_function("catalog_build_snapshot/match_resource_uri", |b| {
        b.iter(|| {
            let entry = snapshot.match_resource_uri(black_box("backend_10://items/abc123"));
            black_box(entry);
        });
    });
}

criterion_group!(
    benches,
    snapshot_build_benchmark,
    tools_list_benchmark,
    uri_template_compile_benchmark,
    uri_template_match_benchmark
);
criterion_main!(benches);
