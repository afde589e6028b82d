//! Per-session workflow status: mutate, persist, then broadcast.
//!
//! Each session's snapshot sits behind its own `tokio::sync::Mutex`, held
//! from the transition check until the broadcast has been handed to every
//! member. Updates to one session therefore reach observers in call order,
//! and the store is never behind what an observer has seen.

use std::collections::HashMap;
use std::sync::Arc;

use prospect_core::plan::{default_substeps, phase_of};
use prospect_core::protocol::ServerMessage;
use prospect_core::store::StatusStore;
use prospect_core::types::SessionId;
use prospect_core::workflow::{
    StatusUpdate, SubStepUpdate, WorkflowStage, WorkflowStatus, MAX_PROGRESS,
};
use tokio::sync::Mutex;

use super::{EngineError, UpdateOutcome};
use crate::ws::BroadcastRouter;

/// A session's snapshot. `None` until first loaded from the store.
type Slot = Arc<Mutex<Option<WorkflowStatus>>>;

pub struct WorkflowEngine {
    store: Arc<dyn StatusStore>,
    router: BroadcastRouter,
    slots: Mutex<HashMap<SessionId, Slot>>,
}

impl WorkflowEngine {
    pub fn new(store: Arc<dyn StatusStore>, router: BroadcastRouter) -> Self {
        Self {
            store,
            router,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn store_backend(&self) -> &'static str {
        self.store.backend()
    }

    async fn slot(&self, session_id: &str) -> Slot {
        let mut slots = self.slots.lock().await;
        Arc::clone(slots.entry(session_id.to_string()).or_default())
    }

    /// Snapshot held in `slot`, loading it from the store on first use.
    async fn current(
        &self,
        slot: &Option<WorkflowStatus>,
        session_id: &str,
    ) -> Result<WorkflowStatus, EngineError> {
        match slot {
            Some(status) => Ok(status.clone()),
            None => self.load_or_idle(session_id).await,
        }
    }

    async fn load_or_idle(&self, session_id: &str) -> Result<WorkflowStatus, EngineError> {
        let stored = self.store.load_status(session_id).await?;
        Ok(stored.unwrap_or_else(|| WorkflowStatus::idle(session_id)))
    }

    /// Persist a whole snapshot, logging on failure.
    async fn persist(&self, status: &WorkflowStatus) -> Result<(), EngineError> {
        self.store
            .save_status(&status.session_id, status)
            .await
            .map_err(|e| {
                tracing::error!(
                    session_id = %status.session_id,
                    error = %e,
                    "Failed to persist workflow status"
                );
                EngineError::from(e)
            })
    }

    /// Begin a new job for a session.
    ///
    /// Overwrites whatever snapshot the session had, including a terminal
    /// one, with stage `searching`, progress 10 and the default plan.
    pub async fn start(&self, session_id: &str, query: &str) -> Result<UpdateOutcome, EngineError> {
        let slot = self.slot(session_id).await;
        let mut guard = slot.lock().await;

        let status = WorkflowStatus::started(session_id, query, default_substeps());
        self.persist(&status).await?;
        *guard = Some(status.clone());

        let delivered = self
            .router
            .broadcast_to_session(session_id, &ServerMessage::workflow_status(status))
            .await;
        tracing::info!(session_id, query, delivered, "Search started");
        Ok(UpdateOutcome::Applied { delivered })
    }

    /// Merge a partial status update, persist it and broadcast the snapshot.
    pub async fn update_status(
        &self,
        session_id: &str,
        update: &StatusUpdate,
    ) -> Result<UpdateOutcome, EngineError> {
        let slot = self.slot(session_id).await;
        let mut guard = slot.lock().await;

        let mut status = self.current(&guard, session_id).await?;
        if let Err(reason) = status.apply(update, chrono::Utc::now()) {
            tracing::warn!(session_id, error = %reason, "Dropping workflow status update");
            return Ok(UpdateOutcome::Ignored { reason });
        }

        self.persist(&status).await?;
        *guard = Some(status.clone());

        let stage = status.stage;
        let progress = status.progress;
        let delivered = self
            .router
            .broadcast_to_session(session_id, &ServerMessage::workflow_status(status))
            .await;
        tracing::debug!(session_id, %stage, progress, delivered, "Workflow status updated");
        Ok(UpdateOutcome::Applied { delivered })
    }

    /// Apply a partial update to one substep, creating it if unknown.
    ///
    /// Backwards or post-terminal status changes are dropped. The broadcast
    /// carries only the fields in `update`.
    pub async fn update_substep(
        &self,
        session_id: &str,
        step_id: &str,
        update: &SubStepUpdate,
    ) -> Result<UpdateOutcome, EngineError> {
        let slot = self.slot(session_id).await;
        let mut guard = slot.lock().await;

        let now = chrono::Utc::now();
        let mut status = self.current(&guard, session_id).await?;
        let substep = status.substep_mut_or_insert(step_id);
        if let Err(reason) = substep.apply(update, now) {
            tracing::warn!(session_id, step_id, error = %reason, "Dropping substep update");
            return Ok(UpdateOutcome::Ignored { reason });
        }
        let substep = substep.clone();
        status.updated_at = now;

        self.store
            .save_substep(session_id, &substep)
            .await
            .map_err(|e| {
                tracing::error!(session_id, step_id, error = %e, "Failed to persist substep");
                EngineError::from(e)
            })?;
        *guard = Some(status);

        let delivered = self
            .router
            .broadcast_to_session(
                session_id,
                &ServerMessage::workflow_substep(session_id, step_id, update.clone()),
            )
            .await;
        tracing::debug!(
            session_id,
            step_id,
            phase = phase_of(step_id).map(|p| p.name).unwrap_or("unplanned"),
            status = %substep.status,
            delivered,
            "Substep updated"
        );
        Ok(UpdateOutcome::Applied { delivered })
    }

    /// Current snapshot, or the idle default for a session nothing touched.
    ///
    /// Reading does not register the session.
    pub async fn get_status(&self, session_id: &str) -> Result<WorkflowStatus, EngineError> {
        let slot = self.slots.lock().await.get(session_id).cloned();
        match slot {
            Some(slot) => {
                let guard = slot.lock().await;
                self.current(&guard, session_id).await
            }
            None => self.load_or_idle(session_id).await,
        }
    }

    /// Move every listed substep that has not finished to `error`.
    ///
    /// Unknown ids are created so the failure stays visible. Persists and
    /// broadcasts one `workflow-status` per call, even when nothing changed.
    pub async fn mark_all_substeps_error(
        &self,
        session_id: &str,
        step_ids: &[String],
        message: &str,
    ) -> Result<UpdateOutcome, EngineError> {
        let slot = self.slot(session_id).await;
        let mut guard = slot.lock().await;

        let mut status = self.current(&guard, session_id).await?;
        let changed = status.fail_substeps(step_ids, message, chrono::Utc::now());

        self.persist(&status).await?;
        *guard = Some(status.clone());

        let delivered = self
            .router
            .broadcast_to_session(session_id, &ServerMessage::workflow_status(status))
            .await;
        tracing::info!(session_id, changed, delivered, "Marked substeps as failed");
        Ok(UpdateOutcome::Applied { delivered })
    }

    /// Change the stage with a message. `complete` also sets progress to 100.
    pub async fn set_stage(
        &self,
        session_id: &str,
        stage: WorkflowStage,
        message: &str,
    ) -> Result<UpdateOutcome, EngineError> {
        let mut update = StatusUpdate::stage(stage).with_message(message);
        if stage == WorkflowStage::Complete {
            update = update.with_progress(MAX_PROGRESS);
        }
        self.update_status(session_id, &update).await
    }

    /// Finish the job: stage `complete`, then `search-complete` with `summary`.
    ///
    /// `search-complete` is only sent if the stage change was applied.
    pub async fn complete(
        &self,
        session_id: &str,
        summary: serde_json::Value,
    ) -> Result<UpdateOutcome, EngineError> {
        let outcome = self
            .set_stage(session_id, WorkflowStage::Complete, "Search complete")
            .await?;
        if outcome.is_applied() {
            let message = ServerMessage::SearchComplete {
                session_id: session_id.to_string(),
                data: summary,
                timestamp: chrono::Utc::now(),
            };
            self.router.broadcast_to_session(session_id, &message).await;
        }
        Ok(outcome)
    }

    /// Failure path for a job: every open substep and the stage go to
    /// `error`, then `search-error` is broadcast. Never retries.
    pub async fn fail(&self, session_id: &str, error: &str) -> Result<UpdateOutcome, EngineError> {
        let open = self.get_status(session_id).await?.open_substep_ids();
        if !open.is_empty() {
            self.mark_all_substeps_error(session_id, &open, error)
                .await?;
        }
        let outcome = self
            .set_stage(session_id, WorkflowStage::Error, error)
            .await?;

        let message = ServerMessage::SearchError {
            session_id: session_id.to_string(),
            error: error.to_string(),
            timestamp: chrono::Utc::now(),
        };
        self.router.broadcast_to_session(session_id, &message).await;
        Ok(outcome)
    }
}
