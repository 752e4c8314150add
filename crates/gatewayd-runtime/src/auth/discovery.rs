//! `.well-known/openid-configuration` document (spec §4.6 "Discovery").

use super::oauth::ClientRegistry;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub token_endpoint: String,
    pub revocation_endpoint: String,
    /// Named for client discoverability only; no route serves it. The
    /// interactive authorization-code flow it implies is unspecified
    /// here — the endpoint shape is advertised, the flow is not (see
    /// DESIGN.md Open Questions).
    pub authorization_endpoint: String,
    pub grant_types_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<&'static str>,
    pub response_types_supported: Vec<&'static str>,
}

/// `issuer` falls back to the request's own base URL when unconfigured
/// (spec §4.6 "Issuer resolution").
pub fn build_discovery_document(
    issuer: &str,
    clients: &ClientRegistry,
) -> DiscoveryDocument {
    DiscoveryDocument {
        issuer: issuer.to_string(),
        token_endpoint: format!("{issuer}/oauth/token"),
        revocation_endpoint: format!("{issuer}/oauth/revoke"),
        authorization_endpoint: format!("{issuer}/oauth/authorize"),
        grant_types_supported: clients.all_grant_types(),
        scopes_supported: clients.all_scopes(),
        token_endpoint_auth_methods_supported: vec!["client_secret_post", "client_secret_basic"],
        response_types_supported: vec!["token"],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatewayd_config::OAuthClientConfig;

    #[test]
    fn document_lists_union_of_client_scopes_and_grants() {
        let clients = ClientRegistry::new(vec![
            OAuthClientConfig {
                client_id: "a".to_string(),
                client_secret: "s".to_string(),
                name: None,
                scopes: vec!["tools".to_string()],
                grant_types: vec!["client_credentials".to_string()],
            },
            OAuthClientConfig {
                client_id: "b".to_string(),
                client_secret: "s".to_string(),
                name: None,
                scopes: vec!["resources".to_string()],
                grant_types: vec!["password".to_string(), "refresh_token".to_string()],
            },
        ]);
        let doc = build_discovery_document("https://gw.example", &clients);
        assert_eq!(doc.scopes_supported, vec!["resources", "tools"]);
        assert_eq!(
            doc.grant_types_supported,
            vec!["client_credentials", "password", "refresh_token"]
        );
        assert_eq!(doc.token_endpoint, "https://gw.example/oauth/token");
    }
}
