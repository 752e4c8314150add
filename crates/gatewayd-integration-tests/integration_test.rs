/// Integration tests spanning gatewayd-config and gatewayd-runtime.
use gatewayd_config::{parse_config_from_str, validate_config, ConfigError};
use gatewayd_runtime::auth::{AuthCore, GrantRequest};
use gatewayd_runtime::catalog::{build_snapshot, BackendContribution};
use serde_json::json;

#[test]
fn parses_and_validates_a_full_config() {
    let json = r#"{
        "gateway": {"name": "gw", "host": "0.0.0.0", "port": 8080},
        "auth": {
            "static_tokens": ["dev-token"],
            "oauth_clients": [
                {"client_id": "c1", "client_secret": "s1", "scopes": ["tools"], "grant_types": ["client_credentials"]}
            ],
            "access_token_ttl_secs": 120
        },
        "backends": [
            {"id": "fs", "command": "fs-backend", "args": ["--root", "/tmp"], "max_retries": 3}
        ],
        "rate_limit": {"enabled": true, "window_secs": 30, "max_requests": 100},
        "session": {"idle_timeout_secs": 120, "keepalive_secs": 15}
    }"#;

    let config = parse_config_from_str(json).expect("valid config parses");
    validate_config(&config).expect("well-formed config validates");

    assert_eq!(config.backends.len(), 1);
    assert_eq!(config.auth.access_token_ttl_secs, 120);
    // Unconfigured TTL fields still get the documented default.
    assert_eq!(config.auth.refresh_token_ttl_secs, 24 * 3600);
}

#[test]
fn duplicate_backend_ids_fail_validation_not_parsing() {
    let json = r#"{
        "backends": [
            {"id": "a", "command": "one"},
            {"id": "a", "command": "two"}
        ]
    }"#;
    let config = parse_config_from_str(json).expect("parses despite later validation failure");
    assert!(matches!(
        validate_config(&config),
        Err(ConfigError::DuplicateBackendId(ref id)) if id == "a"
    ));
}

#[test]
fn catalog_merge_shadows_duplicate_tool_names_first_wins() {
    let primary = BackendContribution {
        backend_id: "primary".to_string(),
        tools: vec![json!({"name": "search", "description": "primary search"})],
        resources: vec![],
        prompts: vec![],
    };
    let secondary = BackendContribution {
        backend_id: "secondary".to_string(),
        tools: vec![json!({"name": "search", "description": "secondary search"})],
        resources: vec![],
        prompts: vec![],
    };

    let snapshot = build_snapshot(&[primary, secondary]);

    let entry = snapshot.tools.get("search").expect("tool present");
    assert_eq!(entry.backend_id, "primary");
    assert_eq!(snapshot.shadows.len(), 1);
    assert_eq!(snapshot.shadows[0].shadowed_backend_id, "secondary");
}

#[test]
fn oauth_client_credentials_token_authorizes_a_subsequent_validate() {
    let json = r#"{
        "auth": {"oauth_clients": [
            {"client_id": "c1", "client_secret": "s1", "scopes": ["tools"], "grant_types": ["client_credentials"]}
        ]}
    }"#;
    let config = parse_config_from_str(json).unwrap();
    let core = AuthCore::from_config(&config.auth);

    let token = core
        .grant(
            GrantRequest {
                grant_type: "client_credentials".to_string(),
                client_id: Some("c1".to_string()),
                client_secret: Some("s1".to_string()),
                username: None,
                password: None,
                refresh_token: None,
                scope: None,
            },
            None,
        )
        .expect("grant succeeds");

    let access = core.tokens.validate(&token.access_token);
    assert!(access.is_some());
    assert_eq!(access.unwrap().client_id, "c1");
}
