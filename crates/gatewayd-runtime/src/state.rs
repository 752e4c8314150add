//! Shared application state handed to every axum route via `State`.

use crate::auth::AuthCore;
use crate::backend::BackendRegistry;
use crate::gateway::Gateway;
use crate::ratelimit::RateLimiter;
use crate::router::Router;
use crate::session::SessionManager;
use crate::telemetry::MetricsCollector;
use gatewayd_config::GatewayConfig;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub registry: Arc<BackendRegistry>,
    pub sessions: Arc<SessionManager>,
    pub auth: Arc<AuthCore>,
    pub rate_limiter: Arc<RateLimiter>,
    pub metrics: Arc<MetricsCollector>,
    /// Explicit `issuer` override from config, if set. When absent, the
    /// discovery handler derives the issuer from each incoming request's own
    /// base URL instead (spec §4.6 "the `issuer` defaults to the request's
    /// base URL unless configured") — a value baked in once at startup would
    /// be wrong for any gateway sitting behind a reverse proxy whose public
    /// scheme/host differs from the process's bind address.
    pub configured_issuer: Option<String>,
}

impl AppState {
    pub fn new(
        config: &GatewayConfig,
        registry: Arc<BackendRegistry>,
        sessions: Arc<SessionManager>,
        auth: Arc<AuthCore>,
    ) -> Self {
        let router = Router::new(registry.clone(), std::time::Duration::from_millis(30_000));
        let gateway = Arc::new(Gateway::new(
            router,
            config.gateway.name.clone(),
            config.gateway.protocol_version.clone(),
        ));

        Self {
            gateway,
            registry,
            sessions,
            auth,
            rate_limiter: Arc::new(RateLimiter::new(config.rate_limit.clone())),
            metrics: Arc::new(MetricsCollector::new()),
            configured_issuer: config.auth.issuer.clone(),
        }
    }
}
