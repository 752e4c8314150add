//! HTTP edge (spec §6): route wiring, request parsing, and JSON-RPC/HTTP
//! error shaping for the External Interfaces surface. Owns the `init(config)
//! -> run -> stop` lifecycle of the gateway singleton (spec §9).

use crate::auth::{require_bearer, Identity};
use crate::error::Error;
use crate::jsonrpc;
use crate::ratelimit::enforce_rate_limit;
use crate::session::SseEvent;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Form, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt as _;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

const ICON_SVG: &str = include_str!("../assets/icon.svg");

/// The gateway process singleton. Construction wires every subsystem
/// together but starts nothing; `run` starts backend supervision, the
/// notification fan-out, the token sweeper, and the HTTP listener.
/// `stop` is idempotent (spec §9 "Global state").
pub struct GatewayServer {
    pub state: AppState,
    host: String,
    port: u16,
    shutdown: Arc<Notify>,
    stopped: AtomicBool,
}

impl GatewayServer {
    pub fn new(config: &gatewayd_config::GatewayConfig) -> Arc<Self> {
        Self::new_with_password_verifier(config, Arc::new(crate::auth::AnyPasswordVerifier))
    }

    /// Same as [`new`](Self::new), but with an explicit `password` grant
    /// credential checker in place of the default `AnyPasswordVerifier`
    /// scaffolding — the delegation point to a real user store that spec §9's
    /// Open Question leaves abstract rather than config-driven.
    pub fn new_with_password_verifier(
        config: &gatewayd_config::GatewayConfig,
        password_verifier: Arc<dyn crate::auth::PasswordVerifier>,
    ) -> Arc<Self> {
        let registry = crate::backend::BackendRegistry::new(config.backends.clone());
        let sessions = crate::session::SessionManager::new(
            Duration::from_secs(config.session.idle_timeout_secs),
            Duration::from_secs(config.session.keepalive_secs),
        );
        let auth = Arc::new(crate::auth::AuthCore::from_config_with_password_verifier(
            &config.auth,
            password_verifier,
        ));
        let state = AppState::new(config, registry, sessions, auth);

        Arc::new(Self {
            state,
            host: config.gateway.host.clone(),
            port: config.gateway.port,
            shutdown: Arc::new(Notify::new()),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Starts every background task (backend supervision, health checks,
    /// token sweeper, idle-session sweeper, notification fan-out) and then
    /// blocks serving HTTP until `stop` is called or the listener is dropped.
    pub async fn run(self: &Arc<Self>) -> crate::Result<()> {
        self.state.registry.start();
        self.state
            .registry
            .spawn_health_check(Duration::from_secs(30));
        self.state.auth.spawn_sweeper();
        self.state.sessions.spawn_idle_sweeper();
        self.spawn_notification_fanout();

        let app = self.router();
        let addr = format!("{}:{}", self.host, self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(Error::Io)?;
        tracing::info!(%addr, "gatewayd listening");

        let shutdown = self.shutdown.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.notified().await })
            .await
            .map_err(Error::Io)?;

        Ok(())
    }

    /// Cancels all outbound waiters, sends SIGTERM to every backend child
    /// (escalating to SIGKILL after a grace period), and stops accepting new
    /// HTTP connections. Calling this more than once is a no-op
    /// (spec §9 "idempotent stop").
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.notify_waiters();
        self.state.registry.shutdown(Duration::from_secs(10)).await;
    }

    /// Forwards backend-initiated notifications to every open SSE session
    /// (spec §4.5 "Fan-out"). Must not block the backend reader that
    /// originated the notification — this task only drains a channel.
    fn spawn_notification_fanout(self: &Arc<Self>) {
        let mut notifications = self.state.registry.subscribe_notifications();
        let sessions = self.state.sessions.clone();
        tokio::spawn(async move {
            loop {
                match notifications.recv().await {
                    Ok(note) => sessions.broadcast(json!({
                        "jsonrpc": "2.0",
                        "method": note.method,
                        "params": note.params,
                    })),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}

fn build_router(state: AppState) -> Router {
    let auth_layer = axum::middleware::from_fn_with_state(state.auth.clone(), require_bearer);
    let rate_limit_layer =
        axum::middleware::from_fn_with_state(state.rate_limiter.clone(), enforce_rate_limit);

    let protected = Router::new()
        .route("/sse", get(sse_handler).post(stateless_rpc_handler))
        .route("/rpc", post(stateless_rpc_handler))
        .route("/message", post(message_handler))
        .route("/admin/health", get(admin_health))
        .route("/admin/status", get(admin_status))
        .route("/admin/metrics", get(admin_metrics))
        .route("/admin/backends/{id}/restart", post(admin_restart_backend))
        .route("/oauth/validate", post(oauth_validate))
        // auth runs before the rate limiter so the limiter keys off the
        // resolved client identity, not an anonymous bucket.
        .layer(ServiceBuilder::new().layer(auth_layer).layer(rate_limit_layer));

    let public = Router::new()
        .route("/oauth/token", post(oauth_token))
        .route("/oauth/revoke", post(oauth_revoke))
        .route(
            "/.well-known/openid-configuration",
            get(discovery_document),
        )
        .route("/icon.svg", get(icon))
        .route("/icon", get(icon));

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// --- SSE / JSON-RPC routes ---------------------------------------------------

async fn sse_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> impl IntoResponse {
    let (_session, rx) = state.sessions.create(identity.client_id, "/message");
    let stream =
        UnboundedReceiverStream::new(rx).map(|event| Ok::<Event, Infallible>(to_sse_event(event)));

    let mut response = Sse::new(stream).into_response();
    // Reverse proxies must not buffer this response (spec §9 "SSE through
    // reverse proxies").
    response
        .headers_mut()
        .insert("X-Accel-Buffering", "no".parse().unwrap());
    response
        .headers_mut()
        .insert(axum::http::header::CACHE_CONTROL, "no-cache".parse().unwrap());
    response
}

fn to_sse_event(event: SseEvent) -> Event {
    match event {
        SseEvent::Endpoint { session_id, endpoint } => Event::default()
            .event("endpoint")
            .data(json!({"sessionId": session_id, "endpoint": endpoint}).to_string()),
        SseEvent::Message(value) => Event::default().event("message").data(value.to_string()),
        SseEvent::Ping => Event::default().comment("ping"),
    }
}

async fn stateless_rpc_handler(State(state): State<AppState>, body: Bytes) -> Response {
    dispatch_rpc_body(&state, &body).await
}

async fn message_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(session_id) = headers
        .get("X-Session-Id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "missing X-Session-Id header"})),
        )
            .into_response();
    };

    let Some(session) = state.sessions.get(&session_id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "unknown session"})),
        )
            .into_response();
    };
    session.note_activity();

    let request: jsonrpc::Request = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(jsonrpc::parse_error_response()),
            )
                .into_response();
        }
    };

    // The HTTP response and the correlated SSE `message` event both carry
    // the same JSON-RPC response, dispatched exactly once (spec §4.5
    // "the POST response and the SSE message event carry the same payload").
    let method = request.method.clone();
    let start = std::time::Instant::now();
    let outcome = state.gateway.handle(request).await;
    if let Some(response) = &outcome {
        state
            .metrics
            .record_request(&method, start.elapsed(), response.error.is_none());
    }
    match outcome {
        Some(response) => {
            session.send(SseEvent::Message(
                serde_json::to_value(&response).unwrap_or(Value::Null),
            ));
            Json(response).into_response()
        }
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// Parses and dispatches one JSON-RPC request/notification, shaping the
/// HTTP response per spec §4.4/§7. Shared by `/rpc` and `/sse` (POST).
/// Every dispatch is recorded into the metrics collector (spec §4.7
/// "Request metrics").
async fn dispatch_rpc_body(state: &AppState, body: &[u8]) -> Response {
    match serde_json::from_slice::<jsonrpc::Request>(body) {
        Ok(request) => {
            let method = request.method.clone();
            let start = std::time::Instant::now();
            let outcome = state.gateway.handle(request).await;
            if let Some(response) = &outcome {
                state
                    .metrics
                    .record_request(&method, start.elapsed(), response.error.is_none());
            }
            match outcome {
                Some(response) => Json(response).into_response(),
                None => StatusCode::ACCEPTED.into_response(),
            }
        }
        Err(_) => (
            StatusCode::BAD_REQUEST,
            Json(jsonrpc::parse_error_response()),
        )
            .into_response(),
    }
}

// --- Admin routes -------------------------------------------------------------

async fn admin_health(State(state): State<AppState>) -> impl IntoResponse {
    let status = if state.registry.health().is_healthy() {
        "healthy"
    } else {
        "degraded"
    };
    Json(json!({"status": status}))
}

async fn admin_status(State(state): State<AppState>) -> impl IntoResponse {
    let backends = state.registry.admin_status_with_counts().await;
    Json(json!({"backends": backends}))
}

#[derive(Debug, Deserialize)]
struct MetricsQuery {
    #[serde(default)]
    format: Option<String>,
}

async fn admin_metrics(State(state): State<AppState>, Query(q): Query<MetricsQuery>) -> Response {
    if q.format.as_deref() == Some("json") {
        Json(state.metrics.export_json()).into_response()
    } else {
        state.metrics.export_prometheus().into_response()
    }
}

async fn admin_restart_backend(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if state.registry.request_restart(&id) {
        Json(json!({"restarted": true, "backendId": id})).into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({"restarted": false, "error": "unknown backend"})),
        )
            .into_response()
    }
}

// --- OAuth routes --------------------------------------------------------------

async fn oauth_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(req): Form<crate::auth::GrantRequest>,
) -> Response {
    let basic_auth = parse_basic_auth(&headers);
    match state.auth.grant(req, basic_auth) {
        Ok(token) => Json(token).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct RevokeRequest {
    token: String,
}

async fn oauth_revoke(State(state): State<AppState>, Form(req): Form<RevokeRequest>) -> Response {
    // Revoking an unknown token is idempotent and always reports success
    // (spec §4.6 "Tokens").
    state.auth.revoke(&req.token);
    Json(json!({"revoked": true})).into_response()
}

#[derive(Debug, Deserialize)]
struct IntrospectRequest {
    token: String,
}

async fn oauth_validate(
    State(state): State<AppState>,
    Form(req): Form<IntrospectRequest>,
) -> impl IntoResponse {
    match state.auth.tokens.introspect(&req.token) {
        Some(access) => Json(json!({
            "active": true,
            "client_id": access.client_id,
            "scope": access.scopes.join(" "),
            "expires_at": access.expires_at,
        })),
        None => Json(json!({"active": false})),
    }
}

async fn discovery_document(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let issuer = request_issuer(&state.configured_issuer, &headers);
    Json(crate::auth::build_discovery_document(&issuer, &state.auth.clients))
}

/// Resolves the OAuth `issuer` for one request: the configured override if
/// present, otherwise the request's own base URL as seen by the client —
/// honoring `X-Forwarded-Proto`/`X-Forwarded-Host` so a gateway behind a
/// TLS-terminating reverse proxy advertises the proxy's public address
/// rather than its own bind host/port (spec §4.6 "Discovery", §9 "SSE
/// through reverse proxies" makes the same proxy-awareness point for SSE).
fn request_issuer(configured: &Option<String>, headers: &HeaderMap) -> String {
    if let Some(issuer) = configured {
        return issuer.clone();
    }
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let host = headers
        .get("x-forwarded-host")
        .or_else(|| headers.get(axum::http::header::HOST))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("{scheme}://{host}")
}

async fn icon() -> impl IntoResponse {
    (
        [(axum::http::header::CONTENT_TYPE, "image/svg+xml")],
        ICON_SVG,
    )
}

fn parse_basic_auth(headers: &HeaderMap) -> Option<(String, String)> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    let encoded = header.strip_prefix("Basic ")?;
    let decoded =
        base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (id, secret) = decoded.split_once(':')?;
    Some((id.to_string(), secret.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_auth_header() {
        let mut headers = HeaderMap::new();
        let encoded = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, "c1:s1");
        headers.insert(
            axum::http::header::AUTHORIZATION,
            format!("Basic {encoded}").parse().unwrap(),
        );
        assert_eq!(
            parse_basic_auth(&headers),
            Some(("c1".to_string(), "s1".to_string()))
        );
    }

    #[test]
    fn missing_auth_header_yields_none() {
        let headers = HeaderMap::new();
        assert_eq!(parse_basic_auth(&headers), None);
    }

    #[test]
    fn malformed_basic_auth_yields_none() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            "Bearer not-basic".parse().unwrap(),
        );
        assert_eq!(parse_basic_auth(&headers), None);
    }

    #[test]
    fn configured_issuer_overrides_request_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::HOST, "127.0.0.1:8080".parse().unwrap());
        let configured = Some("https://gateway.example.com".to_string());
        assert_eq!(request_issuer(&configured, &headers), "https://gateway.example.com");
    }

    #[test]
    fn issuer_falls_back_to_forwarded_proxy_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::HOST, "0.0.0.0:8080".parse().unwrap());
        headers.insert("x-forwarded-proto", "https".parse().unwrap());
        headers.insert("x-forwarded-host", "gateway.example.com".parse().unwrap());
        assert_eq!(
            request_issuer(&None, &headers),
            "https://gateway.example.com"
        );
    }

    #[test]
    fn issuer_falls_back_to_host_header_without_forwarding() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::HOST, "localhost:8080".parse().unwrap());
        assert_eq!(request_issuer(&None, &headers), "http://localhost:8080");
    }
}
