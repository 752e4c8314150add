use crate::{ConfigError, GatewayConfig, Result};
use std::path::Path;

pub fn parse_config(path: &Path) -> Result<GatewayConfig> {
    let content =
        std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;

    parse_config_from_str(&content)
}

pub fn parse_config_from_str(json: &str) -> Result<GatewayConfig> {
    serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::*;

    #[test]
    fn test_parse_config_minimal() {
        let json = r#"{
            "gateway": {"name": "gw", "host": "127.0.0.1", "port": 9000},
            "backends": [
                {"id": "echo", "command": "echo-backend"}
            ]
        }"#;
        let config = parse_config_from_str(json).expect("valid config");
        assert_eq!(config.gateway.name, "gw");
        assert_eq!(config.gateway.port, 9000);
        assert_eq!(config.backends.len(), 1);
        assert_eq!(config.backends[0].id, "echo");
        assert!(config.backends[0].enabled);
        assert_eq!(config.backends[0].transport, TransportKind::Stdio);
    }

    #[test]
    fn test_parse_config_invalid_json() {
        let json = "{ not json ";
        let result = parse_config_from_str(json);
        assert!(matches!(result.unwrap_err(), ConfigError::ParseError(_)));
    }

    #[test]
    fn test_parse_config_from_file_not_found() {
        let result = parse_config(Path::new("/nonexistent/gatewayd.json"));
        assert!(matches!(result.unwrap_err(), ConfigError::IoError(_, _)));
    }

    #[test]
    fn test_parse_config_rejects_unknown_fields() {
        let json = r#"{"gateway": {"name": "gw"}, "bogus_field": true}"#;
        assert!(parse_config_from_str(json).is_err());
    }

    #[test]
    fn test_parse_config_full() {
        let json = r#"{
            "gateway": {"name": "gw", "host": "0.0.0.0", "port": 8080},
            "auth": {
                "static_tokens": ["dev-token"],
                "oauth_clients": [
                    {"client_id": "c1", "client_secret": "s1", "scopes": ["tools"]}
                ]
            },
            "backends": [
                {"id": "fs", "command": "fs-backend", "args": ["--root", "/tmp"], "max_retries": 3}
            ],
            "rate_limit": {"enabled": true, "window_secs": 30, "max_requests": 100},
            "session": {"idle_timeout_secs": 120, "keepalive_secs": 15}
        }"#;
        let config = parse_config_from_str(json).expect("valid config");
        assert_eq!(config.auth.static_tokens, vec!["dev-token".to_string()]);
        assert_eq!(config.auth.oauth_clients[0].client_id, "c1");
        assert_eq!(config.backends[0].max_retries, 3);
        assert_eq!(config.rate_limit.max_requests, 100);
        assert_eq!(config.session.idle_timeout_secs, 120);
    }
}
