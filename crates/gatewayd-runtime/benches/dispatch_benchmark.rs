use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use gatewayd_runtime::backend::BackendRegistry;
use gatewayd_runtime::gateway::Gateway;
use gatewayd_runtime::jsonrpc::{Id, Request};
use gatewayd_runtime::router::Router;
use std::time::Duration;

fn gateway_with_no_backends() -> Gateway {
    let registry = BackendRegistry::new(Vec::new());
    let router = Router::new(registry, Duration::from_secs(5));
    Gateway::new(router, "bench-gateway".to_string(), "2024-11-05".to_string())
}

fn request(method: &str) -> Request {
    serde_json::from_value(serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
    }))
    .unwrap()
}

fn local_method_dispatch_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let gateway = gateway_with_no_backends();

    let mut group = c.benchmark_group("gateway_dispatch");

    for method in ["initialize", "ping", "tools/list", "resources/list", "prompts/list"] {
        group.bench_with_input(BenchmarkId::new("local_method", method), method, |b, &method| {
            b.to_async(&rt).iter(|| async {
                let response = gateway.handle(black_box(request(method))).await;
                black_box(response.unwrap());
            });
        });
    }

    group.finish();
}

fn notification_dispatch_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let gateway = gateway_with_no_backends();

    c.bench_function("gateway_dispatch/notification", |b| {
        b.to_async(&rt).iter(|| async {
            let mut req = request("notifications/initialized");
            req.id = None::<Id>;
            let response = gateway.handle(black_box(req)).await;
            black_box(response);
        });
    });
}

fn unknown_method_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let gateway = gateway_with_no_backends();

    c.bench_function("gateway_dispatch/unknown_method_not_found", |b| {
        b.to_async(&rt).iter(|| async {
            let response = gateway.handle(black_box(request("tools/call"))).await;
            black_box(response.unwrap());
        });
    });
}

criterion_group!(
    benches,
    local_method_dispatch_benchmark,
    notification_dispatch_benchmark,
    unknown_method_benchmark
);
criterion_main!(benches);
