//! Session fan-out.
//!
//! The router never keeps history: a message reaches whoever is a member of
//! the session at the moment it is sent. Late joiners catch up through
//! `get-search-status`.

use std::sync::Arc;

use axum::extract::ws::Message;
use prospect_core::protocol::ServerMessage;

use super::registry::ConnectionRegistry;

/// Delivers server messages to one connection or to a whole session.
///
/// Cheap to clone; shares the registry it routes through.
#[derive(Clone)]
pub struct BroadcastRouter {
    registry: Arc<ConnectionRegistry>,
}

impl BroadcastRouter {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Send `message` to every connection joined to `session_id`.
    ///
    /// The message is serialized once. Members whose channel is closed, or
    /// whose send fails, are evicted. Returns how many members the message
    /// was handed to; an empty session yields 0 without complaint.
    pub async fn broadcast_to_session(&self, session_id: &str, message: &ServerMessage) -> usize {
        let members = self.registry.senders_of(session_id).await;
        if members.is_empty() {
            tracing::debug!(
                session_id,
                msg_type = message.message_type(),
                "No connections to broadcast to"
            );
            return 0;
        }

        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(session_id, error = %e, "Failed to serialize broadcast");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (conn_id, sender) in &members {
            if sender.is_closed() || sender.send(Message::Text(text.clone().into())).is_err() {
                dead.push(conn_id.clone());
            } else {
                delivered += 1;
            }
        }

        for conn_id in &dead {
            tracing::debug!(
                conn_id = %conn_id,
                session_id,
                "Dropping dead connection during broadcast"
            );
            self.registry.evict(conn_id).await;
        }

        if delivered == 0 {
            tracing::warn!(
                session_id,
                members = members.len(),
                msg_type = message.message_type(),
                "Broadcast reached no connections"
            );
        } else {
            tracing::debug!(
                session_id,
                delivered,
                msg_type = message.message_type(),
                "Broadcast delivered"
            );
        }
        delivered
    }

    /// Send `message` to a single connection.
    ///
    /// Returns `false` if the connection is unknown or its channel is closed;
    /// a closed connection is evicted.
    pub async fn send_to_one(&self, conn_id: &str, message: &ServerMessage) -> bool {
        let Some(sender) = self.registry.sender_of(conn_id).await else {
            return false;
        };

        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(conn_id, error = %e, "Failed to serialize message");
                return false;
            }
        };

        if sender.is_closed() || sender.send(Message::Text(text.into())).is_err() {
            tracing::debug!(conn_id, "Dropping dead connection on direct send");
            self.registry.evict(conn_id).await;
            return false;
        }
        true
    }
}
