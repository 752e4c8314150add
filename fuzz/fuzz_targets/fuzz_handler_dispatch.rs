#![no_main]

use gatewayd_runtime::backend::BackendRegistry;
use gatewayd_runtime::gateway::Gateway;
use gatewayd_runtime::jsonrpc::Request;
use gatewayd_runtime::router::Router;
use libfuzzer_sys::fuzz_target;
use std::time::Duration;

/// Parses arbitrary bytes as a JSON-RPC request and dispatches it through a
/// Gateway with no backends configured. Every unknown/forwarded method must
/// resolve to a MethodNotFound error rather than panicking or hanging, since
/// the router's tools/resources/prompts lookups are all synchronous misses
/// against an empty catalog.
fuzz_target!(|data: &[u8]| {
    let Ok(request) = serde_json::from_slice::<Request>(data) else {
        return;
    };

    let registry = BackendRegistry::new(Vec::new());
    let router = Router::new(registry, Duration::from_millis(50));
    let gateway = Gateway::new(router, "fuzz-gateway".to_string(), "2024-11-05".to_string());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("current-thread runtime");
    runtime.block_on(async {
        let _ = gateway.handle(request).await;
    });
});
