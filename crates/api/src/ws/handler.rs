use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::error::AppResult;
use crate::state::AppState;
use crate::ws::dispatch::{self, Sender};

/// Query parameters accepted on the upgrade request.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Optional JWT identifying the user behind the connection.
    pub token: Option<String>,
}

/// HTTP handler that upgrades the connection to WebSocket.
///
/// An invalid `?token=` is rejected with 401 before the upgrade. After the
/// upgrade the connection is registered with the [`ConnectionRegistry`] and
/// served by a sender task and a receiver task.
///
/// [`ConnectionRegistry`]: crate::ws::ConnectionRegistry
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let user_id = state.session_access.identify(query.token.as_deref())?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user_id, query.token)))
}

/// Manage a single WebSocket connection after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Registers the connection with the registry.
///   2. Spawns a sender task that forwards messages from the registry channel.
///   3. Spawns a receiver task that records activity and dispatches frames.
///   4. When either task ends, stops the other and unregisters.
async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    user_id: String,
    upgrade_token: Option<String>,
) {
    let (conn_id, mut rx) = state.registry.register(user_id.clone()).await;
    tracing::info!(conn_id = %conn_id, user_id = %user_id, "WebSocket connected");

    let (mut sink, mut stream) = socket.split();

    // Sender task: forward channel messages to the WebSocket sink.
    let sender_conn_id = conn_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    // Receiver task: every inbound frame counts as activity.
    let recv_state = state.clone();
    let recv_conn_id = conn_id.clone();
    let mut recv_task = tokio::spawn(async move {
        let sender = Sender {
            conn_id: &recv_conn_id,
            upgrade_token: upgrade_token.as_deref(),
        };
        while let Some(result) = stream.next().await {
            match result {
                Ok(Message::Close(_)) => break,
                Ok(Message::Text(text)) => {
                    recv_state.registry.touch(&recv_conn_id).await;
                    dispatch::handle_text(&recv_state, sender, text.as_str()).await;
                }
                Ok(Message::Pong(_)) => {
                    recv_state.registry.touch(&recv_conn_id).await;
                    tracing::trace!(conn_id = %recv_conn_id, "Pong received");
                }
                Ok(_) => {
                    recv_state.registry.touch(&recv_conn_id).await;
                }
                Err(e) => {
                    tracing::debug!(conn_id = %recv_conn_id, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.registry.unregister(&conn_id).await;
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}
