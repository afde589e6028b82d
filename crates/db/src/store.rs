//! [`StatusStore`] backed by PostgreSQL.

use async_trait::async_trait;
use prospect_core::store::{StatusStore, StoreError, StoreResult};
use prospect_core::workflow::{SubStep, WorkflowStatus};

use crate::models::workflow::assemble_status;
use crate::repositories::WorkflowStatusRepo;
use crate::DbPool;

fn database_error(err: sqlx::Error) -> StoreError {
    tracing::error!(error = %err, "Workflow status query failed");
    StoreError::Database(err.to_string())
}

/// Persists workflow snapshots through [`WorkflowStatusRepo`].
#[derive(Clone)]
pub struct PgStatusStore {
    pool: DbPool,
}

impl PgStatusStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatusStore for PgStatusStore {
    async fn save_status(&self, session_id: &str, status: &WorkflowStatus) -> StoreResult<()> {
        tracing::trace!(session_id, stage = %status.stage, "Saving workflow status");
        WorkflowStatusRepo::upsert_status(&self.pool, status)
            .await
            .map_err(database_error)
    }

    async fn save_substep(&self, session_id: &str, substep: &SubStep) -> StoreResult<()> {
        tracing::trace!(session_id, step_id = %substep.id, "Saving workflow substep");
        WorkflowStatusRepo::upsert_substep(&self.pool, session_id, substep)
            .await
            .map_err(database_error)
    }

    async fn load_status(&self, session_id: &str) -> StoreResult<Option<WorkflowStatus>> {
        let status = WorkflowStatusRepo::find_status(&self.pool, session_id)
            .await
            .map_err(database_error)?;
        let substeps = WorkflowStatusRepo::list_substeps(&self.pool, session_id)
            .await
            .map_err(database_error)?;
        assemble_status(session_id, status, substeps)
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
