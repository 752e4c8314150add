//! OAuth2 grant processing (spec §4.6): `client_credentials`, `password`,
//! and `refresh_token` grants over a configured client registry.

use super::token::TokenStore;
use crate::error::Error;
use dashmap::DashMap;
use gatewayd_config::OAuthClientConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The `password` grant's credential check, injected rather than hardcoded
/// (spec §9 open question: "the `password` grant in the source accepts any
/// password; this is intentional test scaffolding"). A production deployment
/// swaps in a verifier backed by a real user store without touching grant
/// processing.
pub trait PasswordVerifier: Send + Sync {
    fn verify(&self, client_id: &str, username: &str, password: &str) -> bool;
}

/// Default verifier shipped with the gateway: accepts any non-empty
/// password. Never described as secure; documented test scaffolding only.
pub struct AnyPasswordVerifier;

impl PasswordVerifier for AnyPasswordVerifier {
    fn verify(&self, _client_id: &str, _username: &str, password: &str) -> bool {
        !password.is_empty()
    }
}

pub struct ClientRegistry {
    clients: DashMap<String, OAuthClientConfig>,
}

impl ClientRegistry {
    pub fn new(configured: Vec<OAuthClientConfig>) -> Self {
        let clients = DashMap::new();
        for client in configured {
            clients.insert(client.client_id.clone(), client);
        }
        Self { clients }
    }

    pub fn get(&self, client_id: &str) -> Option<OAuthClientConfig> {
        self.clients.get(client_id).map(|c| c.clone())
    }

    /// Registers or replaces a client at runtime (spec §3 "OAuth client
    /// config": "mutable via an admin endpoint at runtime").
    pub fn upsert(&self, client: OAuthClientConfig) {
        self.clients.insert(client.client_id.clone(), client);
    }

    /// Removes a client; the caller is responsible for revoking its tokens
    /// (spec §3 "removal revokes all tokens owned by that client").
    pub fn remove(&self, client_id: &str) -> bool {
        self.clients.remove(client_id).is_some()
    }

    fn authenticate(&self, client_id: &str, client_secret: &str) -> Result<OAuthClientConfig, Error> {
        let client = self.get(client_id).ok_or(Error::InvalidClient)?;
        if client.client_secret != client_secret {
            return Err(Error::InvalidClient);
        }
        Ok(client)
    }

    pub fn all_scopes(&self) -> Vec<String> {
        let mut scopes: Vec<String> = self
            .clients
            .iter()
            .flat_map(|c| c.scopes.clone())
            .collect();
        scopes.sort();
        scopes.dedup();
        scopes
    }

    pub fn all_grant_types(&self) -> Vec<String> {
        let mut grants: Vec<String> = self
            .clients
            .iter()
            .flat_map(|c| c.grant_types.clone())
            .collect();
        grants.sort();
        grants.dedup();
        grants
    }
}

#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    pub grant_type: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub scope: String,
}

pub struct AuthCore {
    pub tokens: Arc<TokenStore>,
    pub clients: ClientRegistry,
    pub static_tokens: Vec<String>,
    password_verifier: Arc<dyn PasswordVerifier>,
}

impl AuthCore {
    pub fn new(clients: Vec<OAuthClientConfig>, static_tokens: Vec<String>) -> Self {
        Self::with_password_verifier(clients, static_tokens, Arc::new(AnyPasswordVerifier))
    }

    pub fn with_password_verifier(
        clients: Vec<OAuthClientConfig>,
        static_tokens: Vec<String>,
        password_verifier: Arc<dyn PasswordVerifier>,
    ) -> Self {
        Self {
            tokens: Arc::new(TokenStore::new()),
            clients: ClientRegistry::new(clients),
            static_tokens,
            password_verifier,
        }
    }

    /// Builds from a config document's auth section, honoring its configured
    /// access/refresh TTLs (spec §3.1 "accessTokenTtlSecs"/"refreshTokenTtlSecs").
    /// Uses the default `AnyPasswordVerifier` scaffolding; embedders that need
    /// a real user store should call [`AuthCore::from_config_with_password_verifier`]
    /// instead (see [`GatewayServer::new_with_password_verifier`](crate::GatewayServer::new_with_password_verifier)).
    pub fn from_config(auth: &gatewayd_config::AuthSection) -> Self {
        Self::from_config_with_password_verifier(auth, Arc::new(AnyPasswordVerifier))
    }

    /// Builds from a config document's auth section with an explicit
    /// `PasswordVerifier`, the delegation point spec §9's Open Question
    /// calls for ("a production implementation must delegate to a user
    /// store; the spec leaves the delegation point abstract").
    pub fn from_config_with_password_verifier(
        auth: &gatewayd_config::AuthSection,
        password_verifier: Arc<dyn PasswordVerifier>,
    ) -> Self {
        Self {
            tokens: Arc::new(TokenStore::with_ttls(
                std::time::Duration::from_secs(auth.access_token_ttl_secs),
                std::time::Duration::from_secs(auth.refresh_token_ttl_secs),
            )),
            clients: ClientRegistry::new(auth.oauth_clients.clone()),
            static_tokens: auth.static_tokens.clone(),
            password_verifier,
        }
    }

    /// Sweeps expired access/refresh tokens every 60s (spec §4.6 "TTL cleanup").
    pub fn spawn_sweeper(self: &Arc<Self>) {
        let tokens = self.tokens.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                ticker.tick().await;
                tokens.sweep();
            }
        });
    }

    /// Processes a grant request, honoring HTTP Basic client credentials
    /// when the body omits them (spec §4.6 "Client authentication").
    pub fn grant(
        &self,
        mut req: GrantRequest,
        basic_auth: Option<(String, String)>,
    ) -> Result<TokenResponse, Error> {
        if req.client_id.is_none() {
            if let Some((id, secret)) = basic_auth {
                req.client_id = Some(id);
                req.client_secret = Some(secret);
            }
        }

        match req.grant_type.as_str() {
            "client_credentials" => self.client_credentials(req),
            "password" => self.password(req),
            "refresh_token" => self.refresh(req),
            other => Err(Error::InvalidRequest(format!("unsupported grant_type: {other}"))),
        }
    }

    fn client_credentials(&self, req: GrantRequest) -> Result<TokenResponse, Error> {
        let client_id = req.client_id.ok_or(Error::InvalidClient)?;
        let client_secret = req.client_secret.unwrap_or_default();
        let client = self.clients.authenticate(&client_id, &client_secret)?;
        self.ensure_grant_allowed(&client, "client_credentials")?;

        let scopes = resolve_scopes(&client, req.scope.as_deref());
        let access = self.tokens.issue(&client_id, scopes.clone(), None, false);
        Ok(TokenResponse {
            access_token: access.token,
            token_type: "Bearer",
            expires_in: access.expires_at.saturating_sub(now()),
            refresh_token: None,
            scope: scopes.join(" "),
        })
    }

    /// Delegates resource-owner credential checking to the configured
    /// `PasswordVerifier` (see DESIGN.md Open Questions).
    fn password(&self, req: GrantRequest) -> Result<TokenResponse, Error> {
        let client_id = req.client_id.ok_or(Error::InvalidClient)?;
        let client_secret = req.client_secret.unwrap_or_default();
        let client = self.clients.authenticate(&client_id, &client_secret)?;
        self.ensure_grant_allowed(&client, "password")?;
        let username = req.username.ok_or_else(|| {
            Error::InvalidRequest("password grant requires username".to_string())
        })?;
        let password = req.password.ok_or_else(|| {
            Error::InvalidRequest("password grant requires password".to_string())
        })?;
        if !self.password_verifier.verify(&client_id, &username, &password) {
            return Err(Error::InvalidGrant);
        }

        let scopes = resolve_scopes(&client, req.scope.as_deref());
        let access = self
            .tokens
            .issue(&client_id, scopes.clone(), Some(username), true);
        Ok(TokenResponse {
            access_token: access.token,
            token_type: "Bearer",
            expires_in: access.expires_at.saturating_sub(now()),
            refresh_token: access.refresh_token,
            scope: scopes.join(" "),
        })
    }

    fn refresh(&self, req: GrantRequest) -> Result<TokenResponse, Error> {
        let client_id = req.client_id.ok_or(Error::InvalidClient)?;
        let client_secret = req.client_secret.unwrap_or_default();
        let client = self.clients.authenticate(&client_id, &client_secret)?;
        self.ensure_grant_allowed(&client, "refresh_token")?;
        let presented = req
            .refresh_token
            .ok_or_else(|| Error::InvalidRequest("missing refresh_token".to_string()))?;

        let (access, refresh) = self
            .tokens
            .rotate_refresh(&presented, &client_id)
            .ok_or(Error::InvalidGrant)?;
        Ok(TokenResponse {
            access_token: access.token,
            token_type: "Bearer",
            expires_in: access.expires_at.saturating_sub(now()),
            refresh_token: Some(refresh.token),
            scope: access.scopes.join(" "),
        })
    }

    fn ensure_grant_allowed(&self, client: &OAuthClientConfig, grant: &str) -> Result<(), Error> {
        if client.grant_types.iter().any(|g| g == grant) {
            Ok(())
        } else {
            Err(Error::UnauthorizedClient)
        }
    }

    pub fn revoke(&self, token: &str) {
        self.tokens.revoke(token);
    }

    /// Registers or updates a client at runtime.
    pub fn upsert_client(&self, client: OAuthClientConfig) {
        self.clients.upsert(client);
    }

    /// Removes a client and revokes every token it was issued
    /// (spec §3 "OAuth client config").
    pub fn remove_client(&self, client_id: &str) -> bool {
        let removed = self.clients.remove(client_id);
        if removed {
            self.tokens.revoke_all_for_client(client_id);
        }
        removed
    }
}

fn resolve_scopes(client: &OAuthClientConfig, requested: Option<&str>) -> Vec<String> {
    match requested {
        None => client.scopes.clone(),
        Some(raw) => {
            let requested: Vec<String> = raw.split_whitespace().map(str::to_string).collect();
            requested
                .into_iter()
                .filter(|s| client.scopes.contains(s))
                .collect()
        }
    }
}

fn now() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
