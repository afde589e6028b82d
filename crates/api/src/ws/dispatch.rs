//! Inbound message dispatch.
//!
//! Every failure here is answered with an `error` message to the sender
//! only. Per-message errors never close or evict the connection.

use prospect_core::error::CoreError;
use prospect_core::protocol::{
    decode_client_message, require_session_id, ClientMessage, SearchRequest, ServerMessage,
};

use crate::state::AppState;

/// Who sent a message: the connection id and the token presented at upgrade.
#[derive(Debug, Clone, Copy)]
pub struct Sender<'a> {
    pub conn_id: &'a str,
    pub upgrade_token: Option<&'a str>,
}

/// Decode and handle one inbound text frame.
pub async fn handle_text(state: &AppState, sender: Sender<'_>, text: &str) {
    let inbound = match decode_client_message(text) {
        Ok(inbound) => inbound,
        Err(e) => {
            tracing::debug!(conn_id = sender.conn_id, error = %e, "Rejected inbound frame");
            reply(state, sender.conn_id, &ServerMessage::error(&e, None)).await;
            return;
        }
    };

    if let Err(e) = dispatch(state, sender, &inbound.type_name, inbound.message).await {
        tracing::debug!(
            conn_id = sender.conn_id,
            msg_type = %inbound.type_name,
            error = %e,
            "Inbound message failed"
        );
        reply(
            state,
            sender.conn_id,
            &ServerMessage::error(&e, inbound.session_hint),
        )
        .await;
    }
}

async fn reply(state: &AppState, conn_id: &str, message: &ServerMessage) {
    if !state.router.send_to_one(conn_id, message).await {
        tracing::debug!(
            conn_id,
            msg_type = message.message_type(),
            "Reply not delivered"
        );
    }
}

/// Handle one decoded message.
pub async fn dispatch(
    state: &AppState,
    sender: Sender<'_>,
    type_name: &str,
    message: ClientMessage,
) -> Result<(), CoreError> {
    let conn_id = sender.conn_id;
    match message {
        ClientMessage::JoinSession { session_id, token } => {
            let session_id = require_session_id(session_id)?;
            let token = token.as_deref().or(sender.upgrade_token);
            state
                .session_access
                .validate_session_access(conn_id, &session_id, token)
                .await?;

            let previous = state.registry.join(conn_id, &session_id).await?;
            tracing::info!(
                conn_id,
                session_id = %session_id,
                previous = ?previous,
                "Connection joined session"
            );

            let now = chrono::Utc::now();
            reply(
                state,
                conn_id,
                &ServerMessage::SessionJoined {
                    session_id: session_id.clone(),
                    timestamp: now,
                },
            )
            .await;
            reply(
                state,
                conn_id,
                &ServerMessage::Connected {
                    session_id,
                    connection_id: conn_id.to_string(),
                    timestamp: now,
                },
            )
            .await;
        }

        ClientMessage::LeaveSession { session_id } => {
            let session_id = require_session_id(session_id)?;
            let was_member = state.registry.leave(conn_id, &session_id).await;
            tracing::info!(
                conn_id,
                session_id = %session_id,
                was_member,
                "Connection left session"
            );
        }

        ClientMessage::StartSearch {
            session_id,
            query,
            icp_model_id,
        } => {
            let request = SearchRequest::from_parts(session_id, query, icp_model_id)?;
            state
                .engine
                .start(&request.session_id, &request.query)
                .await?;

            reply(
                state,
                conn_id,
                &ServerMessage::SearchStarted {
                    session_id: request.session_id.clone(),
                    query: request.query.clone(),
                    icp_model_id: request.icp_model_id.clone(),
                    timestamp: chrono::Utc::now(),
                },
            )
            .await;

            match &state.search_job {
                Some(job) => {
                    state
                        .jobs
                        .spawn(state.engine.clone(), job.clone(), request)
                        .await;
                }
                None => {
                    tracing::debug!(session_id = %request.session_id, "No search job installed");
                }
            }
        }

        ClientMessage::GetSearchStatus { session_id } => {
            let session_id = require_session_id(session_id)?;
            let status = state.engine.get_status(&session_id).await?;
            reply(
                state,
                conn_id,
                &ServerMessage::SearchStatus {
                    session_id,
                    data: status,
                    timestamp: chrono::Utc::now(),
                },
            )
            .await;
        }

        ClientMessage::Ping => {
            reply(state, conn_id, &ServerMessage::pong()).await;
        }

        ClientMessage::Unknown => {
            tracing::warn!(conn_id, msg_type = %type_name, "Unknown message type");
            return Err(CoreError::UnsupportedMessage(type_name.to_string()));
        }
    }
    Ok(())
}
