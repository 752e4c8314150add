use super::adapter::{BackendAdapter, BackendNotification, LifecycleState};
use crate::backoff::BackoffPolicy;
use crate::catalog::{build_snapshot, merge_capabilities, BackendContribution, CatalogSnapshot};
use crate::telemetry::{HealthCheck, HealthStatus};
use gatewayd_config::BackendDescriptor;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

/// Not part of tokio; a tiny swap-on-publish cell for the catalog snapshot
/// (spec §3 "Snapshot": "Snapshots are immutable once published").
mod arc_swap_shim {
    use std::sync::Arc;
    use std::sync::RwLock as StdRwLock;

    pub struct ArcSwap<T>(StdRwLock<Arc<T>>);

    impl<T> ArcSwap<T> {
        pub fn new(value: Arc<T>) -> Self {
            Self(StdRwLock::new(value))
        }

        pub fn load(&self) -> Arc<T> {
            self.0.read().expect("catalog lock poisoned").clone()
        }

        pub fn store(&self, value: Arc<T>) {
            *self.0.write().expect("catalog lock poisoned") = value;
        }
    }
}
use arc_swap_shim::ArcSwap as CatalogCell;

pub struct BackendEntry {
    pub descriptor: BackendDescriptor,
    pub adapter: Arc<BackendAdapter>,
    pub consecutive_failures: AtomicU32,
    pub permanently_degraded: std::sync::atomic::AtomicBool,
    pub restart_requested: Arc<Notify>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminBackendStatus {
    pub id: String,
    pub enabled: bool,
    pub state: String,
    pub tool_count: usize,
    pub resource_count: usize,
    pub prompt_count: usize,
    pub shadowed_count: usize,
    pub consecutive_failures: u32,
    pub permanently_degraded: bool,
    pub last_start_epoch_secs: u64,
}

fn state_label(state: LifecycleState) -> &'static str {
    match state {
        LifecycleState::Idle => "idle",
        LifecycleState::Starting => "starting",
        LifecycleState::Ready => "ready",
        LifecycleState::Degraded => "degraded",
        LifecycleState::Stopping => "stopping",
        LifecycleState::Terminated => "terminated",
    }
}

/// Supervises the set of adapters, enforces health and restart policy, and
/// publishes the aggregate catalog snapshot the Router reads (spec §4.2).
pub struct BackendRegistry {
    entries: Vec<Arc<BackendEntry>>,
    by_id: HashMap<String, usize>,
    snapshot: CatalogCell<CatalogSnapshot>,
    notifications_tx: broadcast::Sender<BackendNotification>,
    backoff: BackoffPolicy,
    shutting_down: std::sync::atomic::AtomicBool,
    health: Arc<HealthCheck>,
}

impl BackendRegistry {
    pub fn new(descriptors: Vec<BackendDescriptor>) -> Arc<Self> {
        let (notifications_tx, _rx) = broadcast::channel(1024);
        let mut entries = Vec::with_capacity(descriptors.len());
        let mut by_id = HashMap::new();
        let health = Arc::new(HealthCheck::new());
        health.register_component("gateway", HealthStatus::Healthy);

        for descriptor in descriptors {
            let adapter = Arc::new(BackendAdapter::new(
                descriptor.clone(),
                notifications_tx.clone(),
                health.clone(),
            ));
            by_id.insert(descriptor.id.clone(), entries.len());
            if descriptor.enabled {
                health.register_component(descriptor.id.clone(), HealthStatus::Degraded);
            }
            entries.push(Arc::new(BackendEntry {
                descriptor,
                adapter,
                consecutive_failures: AtomicU32::new(0),
                permanently_degraded: std::sync::atomic::AtomicBool::new(false),
                restart_requested: Arc::new(Notify::new()),
            }));
        }

        Arc::new(Self {
            entries,
            by_id,
            snapshot: CatalogCell::new(Arc::new(CatalogSnapshot::default())),
            notifications_tx,
            backoff: BackoffPolicy::default(),
            shutting_down: std::sync::atomic::AtomicBool::new(false),
            health,
        })
    }

    /// Worst-of health rollup across every registered component, updated on
    /// each backend lifecycle transition (spec §4.7 "Health rollup").
    pub fn health(&self) -> Arc<HealthCheck> {
        self.health.clone()
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<BackendNotification> {
        self.notifications_tx.subscribe()
    }

    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.snapshot.load()
    }

    pub fn adapter(&self, backend_id: &str) -> Option<Arc<BackendAdapter>> {
        self.by_id
            .get(backend_id)
            .map(|&idx| self.entries[idx].adapter.clone())
    }

    /// Starts a supervisor task per enabled descriptor (spec §4.2 "Startup").
    /// Disabled descriptors are recorded but never started.
    pub fn start(self: &Arc<Self>) {
        for entry in &self.entries {
            if !entry.descriptor.enabled {
                continue;
            }
            let registry = self.clone();
            let entry = entry.clone();
            tokio::spawn(async move {
                registry.supervise(entry).await;
            });
        }
    }

    async fn supervise(self: Arc<Self>, entry: Arc<BackendEntry>) {
        loop {
            if self.shutting_down.load(Ordering::SeqCst) {
                return;
            }

            match entry.adapter.connect().await {
                Ok(()) => {
                    // The adapter's own state transition to `Ready` already
                    // registered a `Healthy` component entry atomically.
                    entry.consecutive_failures.store(0, Ordering::SeqCst);
                    self.publish_snapshot().await;
                    tracing::info!(backend = %entry.descriptor.id, "backend ready");

                    entry.adapter.wait_degraded().await;
                    tracing::warn!(backend = %entry.descriptor.id, "backend degraded");
                }
                Err(e) => {
                    tracing::warn!(backend = %entry.descriptor.id, error = %e, "backend connect failed");
                }
            }

            if self.shutting_down.load(Ordering::SeqCst) {
                return;
            }

            let failures = entry.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
            self.publish_snapshot().await;

            if failures >= entry.descriptor.max_retries {
                entry
                    .permanently_degraded
                    .store(true, Ordering::SeqCst);
                self.health
                    .register_component(entry.descriptor.id.clone(), HealthStatus::Unhealthy);
                tracing::error!(
                    backend = %entry.descriptor.id,
                    failures,
                    "backend left permanently degraded after max retries"
                );
                self.publish_snapshot().await;
                // Still wait on a manual restart request so an admin can recover it.
                entry.restart_requested.notified().await;
                entry.permanently_degraded.store(false, Ordering::SeqCst);
                entry.consecutive_failures.store(0, Ordering::SeqCst);
                self.health
                    .register_component(entry.descriptor.id.clone(), HealthStatus::Degraded);
                continue;
            }

            let backoff = self.backoff.duration_for(failures - 1);
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = entry.restart_requested.notified() => {}
            }
        }
    }

    /// Admin-triggered manual restart (spec §4.2 "Manual restart is exposed
    /// through an admin operation").
    pub fn request_restart(&self, backend_id: &str) -> bool {
        match self.by_id.get(backend_id) {
            Some(&idx) => {
                self.entries[idx].restart_requested.notify_waiters();
                true
            }
            None => false,
        }
    }

    /// Rebuilds and atomically swaps the snapshot (spec §4.2 "Catalog publication").
    pub async fn publish_snapshot(&self) {
        let mut contributions = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            if entry.adapter.state() != LifecycleState::Ready {
                continue;
            }
            let catalogs = entry.adapter.catalogs().await;
            contributions.push(BackendContribution {
                backend_id: entry.descriptor.id.clone(),
                tools: catalogs.tools,
                resources: catalogs.resources,
                prompts: catalogs.prompts,
            });
        }
        self.snapshot.store(build_snapshot(&contributions));
    }

    /// Unions the `initialize` capabilities reported by every `Ready`
    /// backend (spec §4.4 "the union of backend capabilities"), used to
    /// build the gateway's own `initialize` response.
    pub async fn union_capabilities(&self) -> serde_json::Value {
        let mut merged = serde_json::Value::Null;
        for entry in &self.entries {
            if entry.adapter.state() != LifecycleState::Ready {
                continue;
            }
            let catalogs = entry.adapter.catalogs().await;
            merge_capabilities(&mut merged, &catalogs.capabilities);
        }
        if merged.is_null() {
            merged = serde_json::json!({});
        }
        merged
    }

    /// Periodic health check: three missed pings demote Ready -> Degraded
    /// (spec §4.2 "Health check").
    pub fn spawn_health_check(self: &Arc<Self>, interval: Duration) {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut misses: HashMap<String, u32> = HashMap::new();
            loop {
                ticker.tick().await;
                if registry.shutting_down.load(Ordering::SeqCst) {
                    return;
                }
                for entry in &registry.entries {
                    if entry.adapter.state() != LifecycleState::Ready {
                        continue;
                    }
                    let ok = entry
                        .adapter
                        .call("ping", None, Duration::from_secs(5))
                        .await
                        .is_ok();
                    let count = misses.entry(entry.descriptor.id.clone()).or_insert(0);
                    if ok {
                        *count = 0;
                    } else {
                        *count += 1;
                        if *count >= 3 {
                            tracing::warn!(backend = %entry.descriptor.id, "missed 3 health pings, demoting");
                            entry.restart_requested.notify_waiters();
                            *count = 0;
                        }
                    }
                }
            }
        });
    }

    pub fn admin_status(&self) -> Vec<AdminBackendStatus> {
        // Catalog counts come from the live per-backend record, not the
        // merged snapshot, so shadowed counts are still visible per backend.
        self.entries
            .iter()
            .map(|entry| {
                let state = entry.adapter.state();
                AdminBackendStatus {
                    id: entry.descriptor.id.clone(),
                    enabled: entry.descriptor.enabled,
                    state: state_label(state).to_string(),
                    tool_count: 0,
                    resource_count: 0,
                    prompt_count: 0,
                    shadowed_count: self.shadow_count_for(&entry.descriptor.id),
                    consecutive_failures: entry.consecutive_failures.load(Ordering::SeqCst),
                    permanently_degraded: entry.permanently_degraded.load(Ordering::SeqCst),
                    last_start_epoch_secs: entry.adapter.last_start_epoch_secs(),
                }
            })
            .collect()
    }

    pub async fn admin_status_with_counts(&self) -> Vec<AdminBackendStatus> {
        let mut statuses = self.admin_status();
        for (status, entry) in statuses.iter_mut().zip(self.entries.iter()) {
            let catalogs = entry.adapter.catalogs().await;
            status.tool_count = catalogs.tools.len();
            status.resource_count = catalogs.resources.len();
            status.prompt_count = catalogs.prompts.len();
        }
        statuses
    }

    pub fn shadow_count_for(&self, backend_id: &str) -> usize {
        self.snapshot
            .load()
            .shadows
            .iter()
            .filter(|s| s.shadowed_backend_id == backend_id)
            .count()
    }

    pub fn is_healthy(&self) -> bool {
        self.entries
            .iter()
            .filter(|e| e.descriptor.enabled)
            .all(|e| !e.permanently_degraded.load(Ordering::SeqCst))
    }

    /// Cancels all waiters with `ShuttingDown` and sends SIGTERM to every
    /// child, escalating to SIGKILL after a grace period (spec §5).
    pub async fn shutdown(&self, grace: Duration) {
        self.shutting_down.store(true, Ordering::SeqCst);
        for entry in &self.entries {
            entry.restart_requested.notify_waiters();
        }
        let stops = self
            .entries
            .iter()
            .map(|entry| entry.adapter.stop(grace));
        futures::future::join_all(stops).await;
    }
}
