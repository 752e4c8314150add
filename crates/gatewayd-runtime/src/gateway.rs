//! Gateway Core (spec §4.4): the JSON-RPC dispatch entry point. Implements
//! the MCP handshake locally and forwards namespaced methods to the Router.

use crate::backend::CallOutcome;
use crate::jsonrpc::{Request, Response, RpcError};
use crate::router::Router;
use serde_json::{json, Value};
use std::time::Duration;

pub struct Gateway {
    router: Router,
    server_name: String,
    protocol_version: String,
}

impl Gateway {
    pub fn new(router: Router, server_name: String, protocol_version: String) -> Self {
        Self {
            router,
            server_name,
            protocol_version,
        }
    }

    /// Dispatches one JSON-RPC request. Returns `None` for notifications
    /// (spec §4.4 "JSON-RPC id policy": "incoming id is echoed verbatim. A
    /// request without an id is a notification and receives no response").
    pub async fn handle(&self, request: Request) -> Option<Response> {
        let id = request.id.clone();
        let is_notification = request.is_notification();

        let result = self.dispatch(&request).await;

        if is_notification {
            if let Err(e) = result {
                tracing::warn!(method = %request.method, error = %e, "notification handling failed");
            }
            return None;
        }

        Some(match result {
            Ok(value) => Response::success(id, value),
            Err(e) => Response::error(id, e),
        })
    }

    async fn dispatch(&self, request: &Request) -> Result<Value, RpcError> {
        match request.method.as_str() {
            "initialize" => Ok(self.initialize().await),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({"tools": self.router.tools_list()})),
            "resources/list" | "resources/templates/list" => {
                Ok(json!({"resources": self.router.resources_list()}))
            }
            "prompts/list" => Ok(json!({"prompts": self.router.prompts_list()})),
            method if method.starts_with("notifications/") => {
                // Side-effectful notifications have no local state to mutate today;
                // acknowledging is enough to keep the dispatch loop uniform.
                Ok(json!({}))
            }
            method => self.forward(method, request.params.clone()).await,
        }
    }

    async fn forward(&self, method: &str, params: Option<Value>) -> Result<Value, RpcError> {
        match self.router.dispatch(method, params, None).await {
            Ok(CallOutcome::Success(value)) => Ok(value),
            Ok(CallOutcome::BackendError(err)) => Err(err),
            Err(e) => Err(RpcError::from(e)),
        }
    }

    /// The gateway's own capabilities are the union of every connected
    /// backend's reported capabilities (spec §4.4 "initialize"), not a
    /// fixed literal — a backend that never advertises
    /// `resources.subscribe`, for instance, must not cause the gateway to
    /// claim it.
    async fn initialize(&self) -> Value {
        json!({
            "protocolVersion": self.protocol_version,
            "serverInfo": {
                "name": self.server_name,
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": self.router.capabilities().await,
        })
    }
}

/// Intersects the Router's configured deadline with a caller-provided
/// per-call deadline, used by the `/message` and `/rpc` HTTP routes.
pub fn effective_deadline(configured: Duration, requested: Option<Duration>) -> Duration {
    match requested {
        Some(d) => d.min(configured),
        None => configured,
    }
}
