//! Repository for the `workflow_statuses` and `workflow_substeps` tables.

use prospect_core::workflow::{SubStep, WorkflowStatus};
use sqlx::{PgPool, Postgres, Transaction};

use crate::models::workflow::{WorkflowStatusRow, WorkflowSubstepRow};

/// Column list for `workflow_statuses` queries.
const STATUS_COLUMNS: &str = "\
    session_id, stage, message, progress, current_step, total_steps, \
    created_at, updated_at";

/// Column list for `workflow_substeps` queries.
const SUBSTEP_COLUMNS: &str = "\
    session_id, step_id, name, description, status, category, priority, \
    tools, message, progress, started_at, completed_at, updated_at";

const UPSERT_SUBSTEP: &str = "\
    INSERT INTO workflow_substeps \
        (session_id, step_id, name, description, status, category, priority, \
         tools, message, progress, started_at, completed_at, updated_at) \
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW()) \
    ON CONFLICT (session_id, step_id) DO UPDATE SET \
        name = EXCLUDED.name, \
        description = EXCLUDED.description, \
        status = EXCLUDED.status, \
        category = EXCLUDED.category, \
        priority = EXCLUDED.priority, \
        tools = EXCLUDED.tools, \
        message = EXCLUDED.message, \
        progress = EXCLUDED.progress, \
        started_at = EXCLUDED.started_at, \
        completed_at = EXCLUDED.completed_at, \
        updated_at = NOW()";

/// Provides snapshot persistence for workflow progress.
pub struct WorkflowStatusRepo;

impl WorkflowStatusRepo {
    /// Replace the whole snapshot for a session.
    ///
    /// The status row is upserted and the session's substeps are replaced
    /// in a single transaction, so a reader never sees a half-written plan.
    pub async fn upsert_status(pool: &PgPool, status: &WorkflowStatus) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query(
            "INSERT INTO workflow_statuses \
                 (session_id, stage, message, progress, current_step, total_steps, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (session_id) DO UPDATE SET \
                 stage = EXCLUDED.stage, \
                 message = EXCLUDED.message, \
                 progress = EXCLUDED.progress, \
                 current_step = EXCLUDED.current_step, \
                 total_steps = EXCLUDED.total_steps, \
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(&status.session_id)
        .bind(status.stage.as_str())
        .bind(&status.message)
        .bind(i16::from(status.progress))
        .bind(i32::try_from(status.current_step).unwrap_or(i32::MAX))
        .bind(i32::try_from(status.total_steps).unwrap_or(i32::MAX))
        .bind(status.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM workflow_substeps WHERE session_id = $1")
            .bind(&status.session_id)
            .execute(&mut *tx)
            .await?;

        for substep in &status.substeps {
            Self::upsert_substep_in(&mut tx, &status.session_id, substep).await?;
        }

        tx.commit().await
    }

    /// Insert or update a single substep.
    pub async fn upsert_substep(
        pool: &PgPool,
        session_id: &str,
        substep: &SubStep,
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;
        Self::upsert_substep_in(&mut tx, session_id, substep).await?;
        sqlx::query(
            "UPDATE workflow_statuses SET updated_at = NOW() WHERE session_id = $1",
        )
        .bind(session_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await
    }

    async fn upsert_substep_in(
        tx: &mut Transaction<'_, Postgres>,
        session_id: &str,
        substep: &SubStep,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(UPSERT_SUBSTEP)
            .bind(session_id)
            .bind(&substep.id)
            .bind(&substep.name)
            .bind(&substep.description)
            .bind(substep.status.as_str())
            .bind(&substep.category)
            .bind(substep.priority.as_str())
            .bind(serde_json::Value::from(substep.tools.clone()))
            .bind(&substep.message)
            .bind(substep.progress.map(i16::from))
            .bind(substep.started_at)
            .bind(substep.completed_at)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Find the status row for a session.
    pub async fn find_status(
        pool: &PgPool,
        session_id: &str,
    ) -> Result<Option<WorkflowStatusRow>, sqlx::Error> {
        let query = format!(
            "SELECT {STATUS_COLUMNS} FROM workflow_statuses WHERE session_id = $1"
        );
        sqlx::query_as::<_, WorkflowStatusRow>(&query)
            .bind(session_id)
            .fetch_optional(pool)
            .await
    }

    /// List every substep row stored for a session.
    pub async fn list_substeps(
        pool: &PgPool,
        session_id: &str,
    ) -> Result<Vec<WorkflowSubstepRow>, sqlx::Error> {
        let query = format!(
            "SELECT {SUBSTEP_COLUMNS} FROM workflow_substeps WHERE session_id = $1 ORDER BY step_id"
        );
        sqlx::query_as::<_, WorkflowSubstepRow>(&query)
            .bind(session_id)
            .fetch_all(pool)
            .await
    }
}
