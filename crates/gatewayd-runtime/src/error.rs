use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Gateway error taxonomy (spec §7). Variants carry enough context to shape
/// both JSON-RPC error objects and HTTP status codes without leaking
/// internals across the boundary.
#[derive(Debug, Error)]
pub enum Error {
    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("backend {backend_id} unavailable")]
    BackendUnavailable { backend_id: String },

    #[error("request to {backend_id} timed out")]
    RequestTimeout { backend_id: String },

    #[error("backend {backend_id} protocol error: {detail}")]
    BackendProtocolError { backend_id: String, detail: String },

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("rate limited")]
    RateLimited { retry_after_secs: u64 },

    #[error("invalid_client")]
    InvalidClient,

    #[error("unauthorized_client")]
    UnauthorizedClient,

    #[error("invalid_grant")]
    InvalidGrant,

    #[error("invalid_request: {0}")]
    InvalidRequest(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// `data.kind` carried on JSON-RPC internal-error responses (spec §4.4).
impl Error {
    pub fn kind(&self) -> &'static str {
        match self {
            Error::BackendUnavailable { .. } => "backend_unavailable",
            Error::RequestTimeout { .. } => "timeout",
            Error::BackendProtocolError { .. } => "backend_protocol_error",
            Error::MethodNotFound(_) => "method_not_found",
            Error::InvalidParams(_) => "invalid_params",
            _ => "internal_error",
        }
    }

    pub fn backend_id(&self) -> Option<&str> {
        match self {
            Error::BackendUnavailable { backend_id }
            | Error::RequestTimeout { backend_id }
            | Error::BackendProtocolError { backend_id, .. } => Some(backend_id),
            _ => None,
        }
    }

    /// JSON-RPC 2.0 error code (spec §4.4).
    pub fn jsonrpc_code(&self) -> i64 {
        match self {
            Error::MethodNotFound(_) => -32601,
            Error::InvalidParams(_) => -32602,
            Error::InvalidRequest(_) => -32600,
            Error::Serialization(_) => -32700,
            _ => -32603,
        }
    }
}

/// Shapes an `Error` as the HTTP response for non-JSON-RPC routes (auth,
/// admin). JSON-RPC routes shape errors via `jsonrpc::Error::from` instead.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::InvalidClient | Error::UnauthorizedClient | Error::InvalidGrant => {
                StatusCode::BAD_REQUEST
            }
            Error::InvalidRequest(_) | Error::InvalidParams(_) => StatusCode::BAD_REQUEST,
            Error::MethodNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let error_code = match &self {
            Error::InvalidClient => "invalid_client",
            Error::UnauthorizedClient => "unauthorized_client",
            Error::InvalidGrant => "invalid_grant",
            _ => "error",
        };

        let mut response = (status, json!({"error": error_code, "error_description": self.to_string()}).to_string()).into_response();
        if let Error::RateLimited { retry_after_secs } = &self {
            response
                .headers_mut()
                .insert("Retry-After", (*retry_after_secs).into());
        }
        response
            .headers_mut()
            .insert("Content-Type", "application/json".parse().unwrap());
        response
    }
}
