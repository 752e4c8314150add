//! Aggregator / Router (spec §4.3): resolves `tools/call`, `resources/read`,
//! `resources/subscribe`, and `prompts/get` to the owning backend.

use crate::backend::{BackendRegistry, CallOutcome};
use crate::error::Error;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub struct Router {
    registry: Arc<BackendRegistry>,
    default_deadline: Duration,
}

#[derive(Debug, serde::Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, serde::Deserialize)]
struct UriParams {
    uri: String,
}

#[derive(Debug, serde::Deserialize)]
struct PromptGetParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

impl Router {
    pub fn new(registry: Arc<BackendRegistry>, default_deadline: Duration) -> Self {
        Self {
            registry,
            default_deadline,
        }
    }

    pub fn tools_list(&self) -> Vec<Value> {
        self.registry.snapshot().tools_list()
    }

    pub fn resources_list(&self) -> Vec<Value> {
        self.registry.snapshot().resources_list()
    }

    pub fn prompts_list(&self) -> Vec<Value> {
        self.registry.snapshot().prompts_list()
    }

    /// The union of every `Ready` backend's reported `initialize`
    /// capabilities (spec §4.4), read fresh on every call rather than cached
    /// so a backend that joins or drops is reflected immediately.
    pub async fn capabilities(&self) -> Value {
        self.registry.union_capabilities().await
    }

    /// Enforces a Router-level deadline independent of the adapter's own;
    /// the effective deadline is the minimum (spec §4.3 "Timeouts"). The
    /// per-call timeout passed here, when present, is intersected with the
    /// Router's configured default.
    pub async fn dispatch(
        &self,
        method: &str,
        params: Option<Value>,
        per_call_deadline: Option<Duration>,
    ) -> Result<CallOutcome, Error> {
        let deadline = match per_call_deadline {
            Some(d) => d.min(self.default_deadline),
            None => self.default_deadline,
        };

        match method {
            "tools/call" => {
                let params: ToolCallParams = parse_params(params)?;
                let snapshot = self.registry.snapshot();
                let entry = snapshot
                    .tools
                    .get(&params.name)
                    .ok_or_else(|| Error::MethodNotFound(params.name.clone()))?;
                let adapter = self
                    .registry
                    .adapter(&entry.backend_id)
                    .ok_or_else(|| Error::BackendUnavailable {
                        backend_id: entry.backend_id.clone(),
                    })?;
                adapter
                    .call(
                        "tools/call",
                        Some(serde_json::json!({"name": params.name, "arguments": params.arguments})),
                        deadline,
                    )
                    .await
            }
            "resources/read" | "resources/subscribe" => {
                let params: UriParams = parse_params(params.clone())?;
                let snapshot = self.registry.snapshot();
                let entry = snapshot
                    .match_resource_uri(&params.uri)
                    .ok_or_else(|| Error::MethodNotFound(params.uri.clone()))?;
                let adapter = self
                    .registry
                    .adapter(&entry.backend_id)
                    .ok_or_else(|| Error::BackendUnavailable {
                        backend_id: entry.backend_id.clone(),
                    })?;
                adapter
                    .call(method, Some(serde_json::json!({"uri": params.uri})), deadline)
                    .await
            }
            "prompts/get" => {
                let params: PromptGetParams = parse_params(params)?;
                let snapshot = self.registry.snapshot();
                let entry = snapshot
                    .prompts
                    .get(&params.name)
                    .ok_or_else(|| Error::MethodNotFound(params.name.clone()))?;
                let adapter = self
                    .registry
                    .adapter(&entry.backend_id)
                    .ok_or_else(|| Error::BackendUnavailable {
                        backend_id: entry.backend_id.clone(),
                    })?;
                adapter
                    .call(
                        "prompts/get",
                        Some(serde_json::json!({"name": params.name, "arguments": params.arguments})),
                        deadline,
                    )
                    .await
            }
            other => Err(Error::MethodNotFound(other.to_string())),
        }
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> Result<T, Error> {
    let value = params.ok_or_else(|| Error::InvalidParams("missing params".to_string()))?;
    serde_json::from_value(value).map_err(|e| Error::InvalidParams(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatewayd_config::BackendDescriptor;

    fn descriptor(id: &str) -> BackendDescriptor {
        BackendDescriptor {
            id: id.to_string(),
            transport: gatewayd_config::TransportKind::Stdio,
            command: "true".to_string(),
            args: vec![],
            env: Default::default(),
            enabled: true,
            connect_timeout_ms: 1000,
            request_timeout_ms: 1000,
            max_retries: 1,
        }
    }

    #[tokio::test]
    async fn tools_call_on_unknown_name_returns_method_not_found() {
        let registry = BackendRegistry::new(vec![descriptor("a")]);
        let router = Router::new(registry, Duration::from_secs(1));
        let result = router
            .dispatch(
                "tools/call",
                Some(serde_json::json!({"name": "nope", "arguments": {}})),
                None,
            )
            .await;
        assert!(matches!(result, Err(Error::MethodNotFound(_))));
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let registry = BackendRegistry::new(vec![descriptor("a")]);
        let router = Router::new(registry, Duration::from_secs(1));
        let result = router.dispatch("notifications/bogus", None, None).await;
        assert!(matches!(result, Err(Error::MethodNotFound(_))));
    }
}
