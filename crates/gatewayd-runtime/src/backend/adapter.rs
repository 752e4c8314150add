use crate::error::Error;
use crate::jsonrpc::{Id, InboundLine, OutboundRequest, RpcError};
use crate::telemetry::{HealthCheck, HealthStatus};
use gatewayd_config::BackendDescriptor;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex, Notify, RwLock};

/// Longest stdio line the framing will accept before treating it as a
/// protocol error and restarting the backend (spec §4.1 "Framing").
const MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

/// spec §3 "Backend runtime record" lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Starting,
    Ready,
    Degraded,
    Stopping,
    Terminated,
}

/// A server-initiated message from a backend, forwarded to the Session
/// Manager for fan-out (spec §4.1 "Request/response correlation").
#[derive(Debug, Clone)]
pub struct BackendNotification {
    pub backend_id: String,
    pub method: String,
    pub params: Option<Value>,
}

/// The backend's response to a forwarded call: passed back to the client
/// verbatim, success or backend-declared error alike (spec §4.3 "Dispatch").
#[derive(Debug, Clone)]
pub enum CallOutcome {
    Success(Value),
    BackendError(RpcError),
}

#[derive(Debug, Clone, Default)]
pub struct BackendCatalogs {
    pub protocol_version: Option<String>,
    pub capabilities: Value,
    pub tools: Vec<Value>,
    pub resources: Vec<Value>,
    pub prompts: Vec<Value>,
}

type PendingTable = Arc<Mutex<FxHashMap<i64, oneshot::Sender<CallOutcome>>>>;

/// The live child process connection. Replaced wholesale on every restart;
/// dropping it aborts its background tasks.
struct Conn {
    child: Child,
    stdin_tx: mpsc::UnboundedSender<String>,
    pending: PendingTable,
    next_id: AtomicI64,
    reader_task: tokio::task::JoinHandle<()>,
    stderr_task: tokio::task::JoinHandle<()>,
    writer_task: tokio::task::JoinHandle<()>,
}

impl Drop for Conn {
    fn drop(&mut self) {
        self.reader_task.abort();
        self.stderr_task.abort();
        self.writer_task.abort();
    }
}

/// One instance per configured backend; owns the child process and its
/// stdio framing (spec §4.1).
pub struct BackendAdapter {
    pub descriptor: BackendDescriptor,
    state_tx: watch::Sender<LifecycleState>,
    state_rx: watch::Receiver<LifecycleState>,
    conn: RwLock<Option<Conn>>,
    catalogs: RwLock<BackendCatalogs>,
    notifications_tx: broadcast::Sender<BackendNotification>,
    died: Arc<Notify>,
    last_start_epoch_secs: AtomicU64,
    health: Arc<HealthCheck>,
}

impl BackendAdapter {
    pub fn new(
        descriptor: BackendDescriptor,
        notifications_tx: broadcast::Sender<BackendNotification>,
        health: Arc<HealthCheck>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(LifecycleState::Idle);
        Self {
            descriptor,
            state_tx,
            state_rx,
            conn: RwLock::new(None),
            catalogs: RwLock::new(BackendCatalogs::default()),
            notifications_tx,
            died: Arc::new(Notify::new()),
            last_start_epoch_secs: AtomicU64::new(0),
            health,
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state_rx.borrow()
    }

    /// Unix timestamp of the most recent spawn attempt, or 0 if the backend
    /// has never been started (spec §3 "last-start timestamp").
    pub fn last_start_epoch_secs(&self) -> u64 {
        self.last_start_epoch_secs.load(Ordering::Relaxed)
    }

    /// Flips the lifecycle state and, atomically with it, the component
    /// health entry the Registry's rollup reads (spec §4.7 "each Backend
    /// Adapter registers a component health entry"). `Ready` is the only
    /// state considered healthy; permanently-degraded is a registry-level
    /// concept layered on top via a direct `Unhealthy` registration.
    fn set_state(&self, state: LifecycleState) {
        let _ = self.state_tx.send(state);
        let health_status = match state {
            LifecycleState::Ready => HealthStatus::Healthy,
            _ => HealthStatus::Degraded,
        };
        self.health
            .register_component(self.descriptor.id.clone(), health_status);
    }

    pub async fn catalogs(&self) -> BackendCatalogs {
        self.catalogs.read().await.clone()
    }

    /// Resolves once the connection has transitioned away from `Ready`
    /// (child exit, protocol error, or explicit stop). Used by the
    /// Registry's supervisor loop to know when to restart.
    pub async fn wait_degraded(&self) {
        self.died.notified().await;
    }

    /// Spawn the child, perform the MCP handshake, and populate catalogs.
    /// Invariant (a) of spec §3: at most one child per backend at any instant.
    pub async fn connect(&self) -> Result<(), Error> {
        self.set_state(LifecycleState::Starting);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.last_start_epoch_secs.store(now, Ordering::Relaxed);

        let mut command = Command::new(&self.descriptor.command);
        command
            .args(&self.descriptor.args)
            .envs(&self.descriptor.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| Error::BackendProtocolError {
            backend_id: self.descriptor.id.clone(),
            detail: format!("spawn failed: {e}"),
        })?;

        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        let pending: PendingTable = Arc::new(Mutex::new(FxHashMap::default()));

        let (stdin_tx, mut stdin_rx) = mpsc::unbounded_channel::<String>();
        let writer_task = tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(line) = stdin_rx.recv().await {
                if stdin.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if stdin.write_all(b"\n").await.is_err() {
                    break;
                }
                if stdin.flush().await.is_err() {
                    break;
                }
            }
        });

        let backend_id = self.descriptor.id.clone();
        let stderr_task = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => tracing::warn!(backend = %backend_id, "{}", line.trim_end()),
                }
            }
        });

        let reader_pending = pending.clone();
        let reader_notifications = self.notifications_tx.clone();
        let reader_backend_id = self.descriptor.id.clone();
        let reader_died = self.died.clone();
        let reader_task = tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match read_framed_line(&mut reader, &mut buf, MAX_LINE_BYTES).await {
                    Ok(None) => break,
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<InboundLine>(&line) {
                            Ok(parsed) => {
                                if parsed.is_server_message() {
                                    let _ = reader_notifications.send(BackendNotification {
                                        backend_id: reader_backend_id.clone(),
                                        method: parsed.method.clone().unwrap_or_default(),
                                        params: parsed.params.clone(),
                                    });
                                } else if let Some(id) = parsed.id {
                                    complete_waiter(&reader_pending, &id, parsed).await;
                                } else {
                                    tracing::warn!(
                                        backend = %reader_backend_id,
                                        "discarding line with neither id nor method"
                                    );
                                }
                            }
                            Err(e) => {
                                tracing::warn!(
                                    backend = %reader_backend_id,
                                    "malformed JSON from backend: {e}"
                                );
                                break;
                            }
                        }
                    }
                    Err(_) => break,
                }
            }
            drain_pending(&reader_pending, "backend unavailable").await;
            reader_died.notify_waiters();
        });

        *self.conn.write().await = Some(Conn {
            child,
            stdin_tx,
            pending,
            next_id: AtomicI64::new(0),
            reader_task,
            stderr_task,
            writer_task,
        });

        let connect_timeout = Duration::from_millis(self.descriptor.connect_timeout_ms);
        let init_result = tokio::time::timeout(
            connect_timeout,
            self.call_internal(
                "initialize",
                Some(serde_json::json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": {"name": "gatewayd", "version": env!("CARGO_PKG_VERSION")},
                })),
            ),
        )
        .await;

        let init_value = match init_result {
            Ok(Ok(CallOutcome::Success(v))) => v,
            Ok(Ok(CallOutcome::BackendError(e))) => {
                self.degrade().await;
                return Err(Error::BackendProtocolError {
                    backend_id: self.descriptor.id.clone(),
                    detail: format!("initialize rejected: {}", e.message),
                });
            }
            Ok(Err(e)) => {
                self.degrade().await;
                return Err(e);
            }
            Err(_) => {
                self.degrade().await;
                return Err(Error::RequestTimeout {
                    backend_id: self.descriptor.id.clone(),
                });
            }
        };

        let protocol_version = init_value
            .get("protocolVersion")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let capabilities = init_value.get("capabilities").cloned().unwrap_or(Value::Null);

        let request_timeout = Duration::from_millis(self.descriptor.request_timeout_ms);
        let (tools, resources, prompts) = tokio::join!(
            self.list_one("tools/list", "tools", request_timeout),
            self.list_one("resources/list", "resources", request_timeout),
            self.list_one("prompts/list", "prompts", request_timeout),
        );

        *self.catalogs.write().await = BackendCatalogs {
            protocol_version,
            capabilities,
            tools: tools.unwrap_or_default(),
            resources: resources.unwrap_or_default(),
            prompts: prompts.unwrap_or_default(),
        };

        self.set_state(LifecycleState::Ready);
        Ok(())
    }

    async fn list_one(&self, method: &str, field: &str, deadline: Duration) -> Option<Vec<Value>> {
        match tokio::time::timeout(deadline, self.call_internal(method, None)).await {
            Ok(Ok(CallOutcome::Success(v))) => v
                .get(field)
                .and_then(|arr| arr.as_array())
                .cloned(),
            _ => None,
        }
    }

    async fn degrade(&self) {
        self.set_state(LifecycleState::Degraded);
        if let Some(conn) = self.conn.write().await.as_ref() {
            drain_pending(&conn.pending, "backend unavailable").await;
        }
        self.died.notify_waiters();
    }

    /// Forward a call to this backend, enforcing the per-call deadline
    /// (spec §4.1 "Per-call deadline elapses").
    pub async fn call(&self, method: &str, params: Option<Value>, deadline: Duration) -> Result<CallOutcome, Error> {
        if self.state() != LifecycleState::Ready {
            return Err(Error::BackendUnavailable {
                backend_id: self.descriptor.id.clone(),
            });
        }
        match tokio::time::timeout(deadline, self.call_internal(method, params)).await {
            Ok(result) => result,
            Err(_) => Err(Error::RequestTimeout {
                backend_id: self.descriptor.id.clone(),
            }),
        }
    }

    async fn call_internal(&self, method: &str, params: Option<Value>) -> Result<CallOutcome, Error> {
        let guard = self.conn.read().await;
        let conn = guard.as_ref().ok_or_else(|| Error::BackendUnavailable {
            backend_id: self.descriptor.id.clone(),
        })?;

        let id = conn.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        conn.pending.lock().await.insert(id, tx);

        let request = OutboundRequest::new(id, method, params);
        let line = serde_json::to_string(&request).map_err(|e| Error::BackendProtocolError {
            backend_id: self.descriptor.id.clone(),
            detail: e.to_string(),
        })?;

        if conn.stdin_tx.send(line).is_err() {
            conn.pending.lock().await.remove(&id);
            return Err(Error::BackendUnavailable {
                backend_id: self.descriptor.id.clone(),
            });
        }
        drop(guard);

        rx.await.map_err(|_| Error::BackendUnavailable {
            backend_id: self.descriptor.id.clone(),
        })
    }

    /// Sends SIGTERM, escalating to SIGKILL after a grace period
    /// (spec §5 "Cancellation").
    pub async fn stop(&self, grace: Duration) {
        self.set_state(LifecycleState::Stopping);
        let mut guard = self.conn.write().await;
        if let Some(conn) = guard.as_mut() {
            drain_pending(&conn.pending, "shutting down").await;
            send_sigterm(&conn.child);
            let _ = tokio::time::timeout(grace, conn.child.wait()).await;
            let _ = conn.child.start_kill();
        }
        *guard = None;
        self.set_state(LifecycleState::Terminated);
    }
}

#[cfg(unix)]
fn send_sigterm(child: &Child) {
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn send_sigterm(_child: &Child) {}

async fn complete_waiter(pending: &PendingTable, id: &Id, parsed: InboundLine) {
    let Id::Number(n) = id else {
        tracing::warn!("backend returned non-numeric id, discarding");
        return;
    };
    let mut table = pending.lock().await;
    if let Some(waiter) = table.remove(n) {
        let outcome = match parsed.error {
            Some(err) => CallOutcome::BackendError(err),
            None => CallOutcome::Success(parsed.result.unwrap_or(Value::Null)),
        };
        let _ = waiter.send(outcome);
    } else {
        tracing::warn!(id = %n, "discarding unmatched response");
    }
}

async fn drain_pending(pending: &PendingTable, reason: &str) {
    let mut table = pending.lock().await;
    for (_, waiter) in table.drain() {
        let _ = waiter.send(CallOutcome::BackendError(RpcError {
            code: -32603,
            message: reason.to_string(),
            data: None,
        }));
    }
}

/// Reads one newline-delimited line, capping total bytes read before a
/// newline is found (spec §4.1 "Lines longer than an implementation limit").
async fn read_framed_line<R: AsyncBufReadExt + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max_bytes: usize,
) -> std::io::Result<Option<String>> {
    let n = reader.read_until(b'\n', buf).await?;
    if n == 0 {
        return Ok(None);
    }
    if buf.len() > max_bytes {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "line exceeds maximum frame size",
        ));
    }
    while buf.last() == Some(&b'\n') || buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}
