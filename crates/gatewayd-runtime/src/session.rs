//! Session Manager (spec §4.5): per-client SSE session state, the dual
//! endpoint (event stream + request submission) handshake, fan-out of
//! server-initiated messages, and liveness.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub enum SseEvent {
    Endpoint { session_id: String, endpoint: String },
    Message(Value),
    Ping,
}

pub struct Session {
    pub id: String,
    pub owner: String,
    pub created_at: u64,
    last_activity: AtomicU64,
    open: AtomicBool,
    tx: mpsc::UnboundedSender<SseEvent>,
}

impl Session {
    fn touch(&self) {
        self.last_activity.store(now(), Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Session writes are serialized per session: every caller pushes onto
    /// the same mpsc queue feeding the one SSE writer task for this session
    /// (spec §4.5 "Concurrency").
    pub fn send(&self, event: SseEvent) -> bool {
        if self.tx.send(event).is_ok() {
            self.touch();
            true
        } else {
            self.open.store(false, Ordering::SeqCst);
            false
        }
    }

    pub fn note_activity(&self) {
        self.touch();
    }

    fn idle_for(&self) -> Duration {
        let last = self.last_activity.load(Ordering::SeqCst);
        Duration::from_secs(now().saturating_sub(last))
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn random_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub struct SessionManager {
    sessions: DashMap<String, Arc<Session>>,
    idle_timeout: Duration,
    keepalive: Duration,
}

impl SessionManager {
    pub fn new(idle_timeout: Duration, keepalive: Duration) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            idle_timeout,
            keepalive,
        })
    }

    /// Creates a session and returns it plus the receiving half of its SSE
    /// queue. The caller owns turning that receiver into an HTTP body stream.
    pub fn create(
        self: &Arc<Self>,
        owner: String,
        message_endpoint: &str,
    ) -> (Arc<Session>, mpsc::UnboundedReceiver<SseEvent>) {
        let id = random_session_id();
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(Session {
            id: id.clone(),
            owner,
            created_at: now(),
            last_activity: AtomicU64::new(now()),
            open: AtomicBool::new(true),
            tx,
        });

        session.send(SseEvent::Endpoint {
            session_id: id.clone(),
            endpoint: message_endpoint.to_string(),
        });

        self.sessions.insert(id, session.clone());
        self.spawn_keepalive(session.clone());
        (session, rx)
    }

    fn spawn_keepalive(self: &Arc<Self>, session: Arc<Session>) {
        let interval = self.keepalive;
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                if !session.is_open() || !session.send(SseEvent::Ping) {
                    manager.sessions.remove(&session.id);
                    return;
                }
            }
        });
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(session_id).map(|s| s.clone())
    }

    pub fn remove(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Broadcasts a server-initiated message to every open session
    /// (spec §4.5 "Fan-out").
    pub fn broadcast(&self, message: Value) {
        let mut dead = Vec::new();
        for entry in self.sessions.iter() {
            if !entry.value().send(SseEvent::Message(message.clone())) {
                dead.push(entry.key().clone());
            }
        }
        for id in dead {
            self.sessions.remove(&id);
        }
    }

    /// Closes sessions idle beyond the configured timeout
    /// (spec §4.5 "Liveness").
    pub fn spawn_idle_sweeper(self: &Arc<Self>) {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(10));
            loop {
                ticker.tick().await;
                let idle_timeout = manager.idle_timeout;
                let expired: Vec<String> = manager
                    .sessions
                    .iter()
                    .filter(|entry| !entry.value().is_open() || entry.value().idle_for() > idle_timeout)
                    .map(|entry| entry.key().clone())
                    .collect();
                for id in expired {
                    manager.sessions.remove(&id);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_emits_endpoint_event_first() {
        let manager = SessionManager::new(Duration::from_secs(300), Duration::from_secs(30));
        let (_session, mut rx) = manager.create("client-1".to_string(), "/message");
        match rx.recv().await.unwrap() {
            SseEvent::Endpoint { .. } => {}
            other => panic!("expected endpoint event first, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_all_open_sessions() {
        let manager = SessionManager::new(Duration::from_secs(300), Duration::from_secs(30));
        let (_s1, mut rx1) = manager.create("a".to_string(), "/message");
        let (_s2, mut rx2) = manager.create("b".to_string(), "/message");
        rx1.recv().await.unwrap();
        rx2.recv().await.unwrap();

        manager.broadcast(serde_json::json!({"hello": "world"}));

        assert!(matches!(rx1.recv().await.unwrap(), SseEvent::Message(_)));
        assert!(matches!(rx2.recv().await.unwrap(), SseEvent::Message(_)));
    }

    #[tokio::test]
    async fn dropping_receiver_marks_session_closed_on_next_send() {
        let manager = SessionManager::new(Duration::from_secs(300), Duration::from_secs(30));
        let (session, rx) = manager.create("a".to_string(), "/message");
        drop(rx);
        assert!(!session.send(SseEvent::Ping));
        assert!(!session.is_open());
    }
}
