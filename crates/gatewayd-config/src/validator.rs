use crate::{ConfigError, GatewayConfig, Result};
use std::collections::HashSet;

/// Schema validation at startup (spec §6): any violation aborts startup.
pub fn validate_config(config: &GatewayConfig) -> Result<()> {
    let mut backend_ids = HashSet::new();
    for backend in &config.backends {
        if backend.id.is_empty() {
            return Err(ConfigError::ValidationError(
                "backend id must not be empty".to_string(),
            ));
        }
        if !backend_ids.insert(backend.id.as_str()) {
            return Err(ConfigError::DuplicateBackendId(backend.id.clone()));
        }
        if backend.command.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "backend {}: command must not be empty",
                backend.id
            )));
        }
        if backend.connect_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(format!(
                "backend {}: connect_timeout_ms must be > 0",
                backend.id
            )));
        }
        if backend.request_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(format!(
                "backend {}: request_timeout_ms must be > 0",
                backend.id
            )));
        }
    }

    let mut client_ids = HashSet::new();
    for client in &config.auth.oauth_clients {
        if client.client_id.is_empty() || client.client_secret.is_empty() {
            return Err(ConfigError::ValidationError(
                "oauth client must have non-empty client_id and client_secret".to_string(),
            ));
        }
        if !client_ids.insert(client.client_id.as_str()) {
            return Err(ConfigError::DuplicateClientId(client.client_id.clone()));
        }
        for grant in &client.grant_types {
            if !matches!(
                grant.as_str(),
                "client_credentials" | "password" | "refresh_token"
            ) {
                return Err(ConfigError::ValidationError(format!(
                    "oauth client {}: unknown grant type {}",
                    client.client_id, grant
                )));
            }
        }
    }

    if config.gateway.port == 0 {
        return Err(ConfigError::ValidationError(
            "gateway.port must be non-zero".to_string(),
        ));
    }

    if config.rate_limit.enabled && config.rate_limit.max_requests == 0 {
        return Err(ConfigError::ValidationError(
            "rate_limit.max_requests must be > 0 when enabled".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_config_from_str;

    #[test]
    fn test_validate_rejects_duplicate_backend_ids() {
        let json = r#"{
            "backends": [
                {"id": "a", "command": "x"},
                {"id": "a", "command": "y"}
            ]
        }"#;
        let config = parse_config_from_str(json).unwrap();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::DuplicateBackendId(_))
        ));
    }

    #[test]
    fn test_validate_rejects_empty_command() {
        let json = r#"{"backends": [{"id": "a", "command": ""}]}"#;
        let config = parse_config_from_str(json).unwrap();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_accepts_well_formed_config() {
        let json = r#"{
            "gateway": {"name": "gw", "port": 8080},
            "backends": [{"id": "a", "command": "echo"}]
        }"#;
        let config = parse_config_from_str(json).unwrap();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicate_client_ids() {
        let json = r#"{
            "auth": {"oauth_clients": [
                {"client_id": "c", "client_secret": "s1"},
                {"client_id": "c", "client_secret": "s2"}
            ]}
        }"#;
        let config = parse_config_from_str(json).unwrap();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::DuplicateClientId(_))
        ));
    }
}
