use axum::extract::{Path, State};
use axum::Json;
use prospect_core::protocol::require_session_id;
use prospect_core::workflow::WorkflowStatus;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/sessions/{session_id}/status -- the session's current
/// snapshot, or the idle default if no job has touched it.
pub async fn get_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> AppResult<Json<DataResponse<WorkflowStatus>>> {
    let session_id = require_session_id(Some(session_id))?;
    let status = state.engine.get_status(&session_id).await?;
    Ok(Json(DataResponse { data: status }))
}
