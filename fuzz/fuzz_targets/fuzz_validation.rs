#![no_main]

use arbitrary::Arbitrary;
use gatewayd_config::validate_config;
use libfuzzer_sys::fuzz_target;

/// A small Arbitrary-driven shape covering exactly the fields
/// `validate_config` inspects, so the fuzzer can reach the duplicate-id and
/// empty-string branches far more often than generating raw JSON bytes would.
#[derive(Debug, Arbitrary)]
struct FuzzBackend {
    id: String,
    command: String,
    connect_timeout_ms: u64,
    request_timeout_ms: u64,
}

#[derive(Debug, Arbitrary)]
struct FuzzOAuthClient {
    client_id: String,
    client_secret: String,
    grant_types: Vec<String>,
}

#[derive(Debug, Arbitrary)]
struct FuzzConfig {
    backends: Vec<FuzzBackend>,
    oauth_clients: Vec<FuzzOAuthClient>,
    port: u16,
    rate_limit_enabled: bool,
    max_requests: u32,
}

fuzz_target!(|fuzzed: FuzzConfig| {
    let mut config = gatewayd_config::GatewayConfig {
        gateway: gatewayd_config::GatewayMetadata {
            name: "fuzz".to_string(),
            protocol_version: "2024-11-05".to_string(),
            host: "0.0.0.0".to_string(),
            port: fuzzed.port,
        },
        auth: gatewayd_config::AuthSection {
            static_tokens: Vec::new(),
            oauth_clients: Vec::new(),
            issuer: None,
            access_token_ttl_secs: 3600,
            refresh_token_ttl_secs: 86400,
        },
        backends: Vec::new(),
        rate_limit: gatewayd_config::RateLimitConfig {
            enabled: fuzzed.rate_limit_enabled,
            window_secs: 60,
            max_requests: fuzzed.max_requests,
        },
        session: gatewayd_config::SessionConfig {
            idle_timeout_secs: 300,
            keepalive_secs: 30,
        },
    };

    for backend in fuzzed.backends {
        config.backends.push(gatewayd_config::BackendDescriptor {
            id: backend.id,
            transport: gatewayd_config::TransportKind::Stdio,
            command: backend.command,
            args: Vec::new(),
            env: Default::default(),
            enabled: true,
            connect_timeout_ms: backend.connect_timeout_ms,
            request_timeout_ms: backend.request_timeout_ms,
            max_retries: 5,
        });
    }
    for client in fuzzed.oauth_clients {
        config.auth.oauth_clients.push(gatewayd_config::OAuthClientConfig {
            client_id: client.client_id,
            client_secret: client.client_secret,
            name: None,
            grant_types: client.grant_types,
            scopes: Vec::new(),
        });
    }

    // Never panics, regardless of how adversarial the generated fields are.
    let _ = validate_config(&config);

    // A round-trip through JSON must itself never panic on any value
    // `validate_config` was willing to accept or reject.
    if let Ok(json) = serde_json::to_string(&config) {
        let _ = serde_json::from_str::<gatewayd_config::GatewayConfig>(&json);
    }
});
