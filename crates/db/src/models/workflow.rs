//! Row models for the `workflow_statuses` and `workflow_substeps` tables.

use prospect_core::store::StoreError;
use prospect_core::types::Timestamp;
use prospect_core::workflow::{step_order_key, SubStep, WorkflowStatus};
use sqlx::FromRow;

/// A row from the `workflow_statuses` table.
#[derive(Debug, Clone, FromRow)]
pub struct WorkflowStatusRow {
    pub session_id: String,
    pub stage: String,
    pub message: String,
    pub progress: i16,
    pub current_step: i32,
    pub total_steps: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A row from the `workflow_substeps` table.
#[derive(Debug, Clone, FromRow)]
pub struct WorkflowSubstepRow {
    pub session_id: String,
    pub step_id: String,
    pub name: String,
    pub description: String,
    pub status: String,
    pub category: String,
    pub priority: String,
    pub tools: serde_json::Value,
    pub message: Option<String>,
    pub progress: Option<i16>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

fn to_percent(value: i16) -> u8 {
    value.clamp(0, 100) as u8
}

fn to_count(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

impl TryFrom<WorkflowSubstepRow> for SubStep {
    type Error = StoreError;

    fn try_from(row: WorkflowSubstepRow) -> Result<Self, Self::Error> {
        Ok(SubStep {
            status: row.status.parse().map_err(StoreError::InvalidData)?,
            priority: row.priority.parse().map_err(StoreError::InvalidData)?,
            tools: serde_json::from_value(row.tools)?,
            id: row.step_id,
            name: row.name,
            description: row.description,
            category: row.category,
            message: row.message,
            progress: row.progress.map(to_percent),
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

/// Rebuild a snapshot from its status row and substep rows.
///
/// Substeps written before any status row exist under an `idle` snapshot.
/// Returns `None` when there is nothing stored for the session.
pub fn assemble_status(
    session_id: &str,
    status: Option<WorkflowStatusRow>,
    substeps: Vec<WorkflowSubstepRow>,
) -> Result<Option<WorkflowStatus>, StoreError> {
    if status.is_none() && substeps.is_empty() {
        return Ok(None);
    }

    let mut snapshot = match status {
        Some(row) => WorkflowStatus {
            session_id: row.session_id,
            stage: row.stage.parse().map_err(StoreError::InvalidData)?,
            message: row.message,
            progress: to_percent(row.progress),
            current_step: to_count(row.current_step),
            total_steps: to_count(row.total_steps),
            substeps: Vec::new(),
            updated_at: row.updated_at,
        },
        None => WorkflowStatus::idle(session_id),
    };

    let mut steps = substeps
        .into_iter()
        .map(SubStep::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    steps.sort_by_key(|s| step_order_key(&s.id));
    snapshot.substeps = steps;

    Ok(Some(snapshot))
}
