pub mod health;
pub mod sessions;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /ws                                  WebSocket (optional ?token=)
/// /sessions/{session_id}/status        GET workflow status snapshot
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/sessions/{session_id}/status", get(sessions::get_status))
}
