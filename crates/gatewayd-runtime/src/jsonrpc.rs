//! JSON-RPC 2.0 wire types shared by the backend stdio framing, the
//! gateway dispatch core, and the HTTP edge (spec §4.4, §6).

use crate::error::Error;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// An inbound or outbound JSON-RPC id. Absent on notifications.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum Id {
    Number(i64),
    String(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub id: Option<Id>,
}

fn default_version() -> String {
    JSONRPC_VERSION.to_string()
}

impl Request {
    /// A request without an `id` is a notification: process side effects,
    /// emit no response (spec §4.4 "JSON-RPC id policy").
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Option<Id>,
}

impl Response {
    pub fn success(id: Option<Id>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Option<Id>, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn parse_error() -> Self {
        Self {
            code: -32700,
            message: "parse error".to_string(),
            data: None,
        }
    }

    pub fn invalid_request(detail: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: "invalid request".to_string(),
            data: Some(Value::String(detail.into())),
        }
    }
}

impl From<&Error> for RpcError {
    fn from(err: &Error) -> Self {
        let data = match (err.kind(), err.backend_id()) {
            ("internal_error", None) => None,
            (kind, backend_id) => Some(serde_json::json!({
                "kind": kind,
                "backendId": backend_id,
                "detail": err.to_string(),
            })),
        };
        Self {
            code: err.jsonrpc_code(),
            message: err.to_string(),
            data,
        }
    }
}

impl From<Error> for RpcError {
    fn from(err: Error) -> Self {
        RpcError::from(&err)
    }
}

/// Shapes a raw parse failure (invalid JSON on the wire) as a JSON-RPC
/// response with no id, since the id itself may be unparseable
/// (spec §7 "-32700 parse error").
pub fn parse_error_response() -> Response {
    Response::error(None, RpcError::parse_error())
}

/// A single line of stdio traffic to/from a backend: either a request the
/// gateway is forwarding, or a message (response/notification) the backend
/// sent. Backends never originate JSON-RPC requests in this protocol, but
/// the wire format is symmetric so we parse generically and branch on
/// whether `id`/`method` are present (spec §4.1 "Request/response correlation").
#[derive(Debug, Clone, Deserialize)]
pub struct InboundLine {
    #[serde(default)]
    pub id: Option<Id>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

impl InboundLine {
    /// A backend-initiated notification or request carries a `method`.
    pub fn is_server_message(&self) -> bool {
        self.method.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboundRequest {
    pub jsonrpc: String,
    pub id: Id,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl OutboundRequest {
    pub fn new(id: i64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Id::Number(id),
            method: method.into(),
            params,
        }
    }
}
