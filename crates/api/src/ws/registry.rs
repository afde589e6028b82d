use std::collections::{HashMap, HashSet};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::Message;
use prospect_core::error::CoreError;
use prospect_core::types::{ConnectionId, SessionId, Timestamp};
use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// Metadata for a single WebSocket connection.
pub struct WsConnection {
    /// User the connection was opened for (`"anonymous"` without a token).
    pub user_id: String,
    /// Session this connection currently observes, if any.
    pub session_id: Option<SessionId>,
    /// Channel sender for outbound messages to this connection.
    pub sender: WsSender,
    /// When this connection was established.
    pub connected_at: Timestamp,
    /// Wall-clock time of the last inbound frame or pong.
    pub last_activity_at: Timestamp,
    /// Monotonic twin of `last_activity_at`, used for inactivity sweeps.
    last_seen: Instant,
}

/// Connections plus the inverse session index. Both live behind the same
/// lock so every mutation updates them together.
#[derive(Default)]
struct RegistryInner {
    connections: HashMap<ConnectionId, WsConnection>,
    sessions: HashMap<SessionId, HashSet<ConnectionId>>,
}

impl RegistryInner {
    /// Drop `conn_id` from a session's member set, removing the set once empty.
    fn detach(&mut self, conn_id: &str, session_id: &str) -> bool {
        let Some(members) = self.sessions.get_mut(session_id) else {
            return false;
        };
        let removed = members.remove(conn_id);
        if members.is_empty() {
            self.sessions.remove(session_id);
        }
        removed
    }

    fn remove_connection(&mut self, conn_id: &str) -> Option<WsConnection> {
        let conn = self.connections.remove(conn_id)?;
        if let Some(session_id) = &conn.session_id {
            self.detach(conn_id, session_id);
        }
        Some(conn)
    }
}

/// Tracks every live WebSocket connection and the session each one observes.
///
/// A connection belongs to at most one session. Thread-safe via a single
/// interior `RwLock`; designed to be wrapped in `Arc` and shared between
/// socket handlers, the heartbeat task and the workflow engine.
pub struct ConnectionRegistry {
    inner: RwLock<RegistryInner>,
}

impl ConnectionRegistry {
    /// Create a new, empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Register a new connection under a fresh id.
    ///
    /// Returns the id and the receiver half of the outbound channel; the
    /// caller forwards everything it yields to the WebSocket sink and must
    /// call [`unregister`](Self::unregister) when the socket goes away.
    pub async fn register(
        &self,
        user_id: impl Into<String>,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<Message>) {
        let conn_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        let now = chrono::Utc::now();
        let conn = WsConnection {
            user_id: user_id.into(),
            session_id: None,
            sender: tx,
            connected_at: now,
            last_activity_at: now,
            last_seen: Instant::now(),
        };
        self.inner
            .write()
            .await
            .connections
            .insert(conn_id.clone(), conn);
        (conn_id, rx)
    }

    /// Subscribe a connection to a session, leaving its previous one.
    ///
    /// Returns the session the connection was in before, or
    /// [`CoreError::NotFound`] when the connection has already gone away
    /// (eviction can race with a late join).
    pub async fn join(
        &self,
        conn_id: &str,
        session_id: &str,
    ) -> Result<Option<SessionId>, CoreError> {
        let mut inner = self.inner.write().await;
        let previous = match inner.connections.get_mut(conn_id) {
            Some(conn) => conn.session_id.replace(session_id.to_string()),
            None => {
                return Err(CoreError::NotFound {
                    entity: "connection",
                    id: conn_id.to_string(),
                })
            }
        };
        if let Some(previous) = &previous {
            if previous != session_id {
                inner.detach(conn_id, previous);
            }
        }
        inner
            .sessions
            .entry(session_id.to_string())
            .or_default()
            .insert(conn_id.to_string());
        Ok(previous)
    }

    /// Unsubscribe a connection from a session. Idempotent.
    ///
    /// Returns `true` if the connection was a member.
    pub async fn leave(&self, conn_id: &str, session_id: &str) -> bool {
        let mut inner = self.inner.write().await;
        let removed = inner.detach(conn_id, session_id);
        if let Some(conn) = inner.connections.get_mut(conn_id) {
            if conn.session_id.as_deref() == Some(session_id) {
                conn.session_id = None;
            }
        }
        removed
    }

    /// Remove a connection and its session membership. Idempotent.
    pub async fn unregister(&self, conn_id: &str) -> bool {
        self.inner
            .write()
            .await
            .remove_connection(conn_id)
            .is_some()
    }

    /// Record inbound activity on a connection.
    pub async fn touch(&self, conn_id: &str) -> bool {
        let mut inner = self.inner.write().await;
        match inner.connections.get_mut(conn_id) {
            Some(conn) => {
                conn.last_activity_at = chrono::Utc::now();
                conn.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Snapshot of the connections subscribed to a session.
    pub async fn members_of(&self, session_id: &str) -> HashSet<ConnectionId> {
        self.inner
            .read()
            .await
            .sessions
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Session a connection currently observes.
    pub async fn session_of(&self, conn_id: &str) -> Option<SessionId> {
        self.inner
            .read()
            .await
            .connections
            .get(conn_id)
            .and_then(|c| c.session_id.clone())
    }

    pub async fn contains(&self, conn_id: &str) -> bool {
        self.inner.read().await.connections.contains_key(conn_id)
    }

    /// Senders of every member of a session, cloned out of the lock so the
    /// caller can send without holding it.
    pub(crate) async fn senders_of(&self, session_id: &str) -> Vec<(ConnectionId, WsSender)> {
        let inner = self.inner.read().await;
        let Some(members) = inner.sessions.get(session_id) else {
            return Vec::new();
        };
        members
            .iter()
            .filter_map(|id| {
                inner
                    .connections
                    .get(id)
                    .map(|c| (id.clone(), c.sender.clone()))
            })
            .collect()
    }

    pub(crate) async fn sender_of(&self, conn_id: &str) -> Option<WsSender> {
        self.inner
            .read()
            .await
            .connections
            .get(conn_id)
            .map(|c| c.sender.clone())
    }

    /// Close a connection and remove it from the registry.
    ///
    /// The Close frame is best effort; the writer task may already be gone.
    pub async fn evict(&self, conn_id: &str) -> bool {
        match self.inner.write().await.remove_connection(conn_id) {
            Some(conn) => {
                let _ = conn.sender.send(Message::Close(None));
                tracing::debug!(conn_id, "Evicted WebSocket connection");
                true
            }
            None => false,
        }
    }

    /// Evict every connection with no activity for longer than `threshold`.
    ///
    /// Staleness is checked and the connections removed under one write
    /// lock, so a connection touched concurrently is never evicted.
    pub async fn evict_inactive(&self, threshold: Duration) -> Vec<ConnectionId> {
        let now = Instant::now();
        let mut inner = self.inner.write().await;
        let stale: Vec<ConnectionId> = inner
            .connections
            .iter()
            .filter(|(_, c)| now.saturating_duration_since(c.last_seen) > threshold)
            .map(|(id, _)| id.clone())
            .collect();
        for conn_id in &stale {
            if let Some(conn) = inner.remove_connection(conn_id) {
                let _ = conn.sender.send(Message::Close(None));
            }
        }
        stale
    }

    /// Send a Ping frame to every connected client.
    ///
    /// Connections whose channel is already closed are evicted immediately
    /// and their ids returned.
    pub async fn ping_all(&self) -> Vec<ConnectionId> {
        let failed: Vec<ConnectionId> = {
            let inner = self.inner.read().await;
            inner
                .connections
                .iter()
                .filter(|(_, c)| c.sender.send(Message::Ping(Bytes::new())).is_err())
                .map(|(id, _)| id.clone())
                .collect()
        };
        for conn_id in &failed {
            self.evict(conn_id).await;
        }
        failed
    }

    /// Return the current number of active connections.
    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }

    /// Number of sessions with at least one subscriber.
    pub async fn session_count(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    /// Send a Close frame to every connection, then clear both indexes.
    ///
    /// Used during graceful shutdown to notify all clients before the
    /// server stops accepting new connections.
    pub async fn shutdown_all(&self) {
        let mut inner = self.inner.write().await;
        let count = inner.connections.len();
        for conn in inner.connections.values() {
            let _ = conn.sender.send(Message::Close(None));
        }
        inner.connections.clear();
        inner.sessions.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
