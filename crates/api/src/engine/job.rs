//! Supervision of the background search job.
//!
//! The job itself (querying providers, scoring, ...) lives outside this
//! crate and reports progress through [`WorkflowEngine`]. The supervisor
//! only decides what observers see when the job ends: a summary on success,
//! or every open substep and the stage moved to `error` on failure.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use prospect_core::protocol::SearchRequest;
use prospect_core::types::SessionId;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::WorkflowEngine;

/// Result a successful job hands back; `summary` becomes the
/// `search-complete` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub summary: serde_json::Value,
}

/// A prospecting job run for one `start-search` request.
#[async_trait]
pub trait SearchJob: Send + Sync {
    /// Run the job, reporting progress through `engine`.
    async fn run(
        &self,
        engine: Arc<WorkflowEngine>,
        request: SearchRequest,
    ) -> anyhow::Result<SearchOutcome>;
}

/// Run `job` to completion and record how it ended.
///
/// On failure the session is moved to `error` with the job's message and a
/// `search-error` is broadcast; the job's error is then returned unchanged.
/// The job is never retried.
pub async fn run_search_job(
    engine: Arc<WorkflowEngine>,
    job: Arc<dyn SearchJob>,
    request: SearchRequest,
) -> anyhow::Result<SearchOutcome> {
    let session_id = request.session_id.clone();

    match job.run(Arc::clone(&engine), request).await {
        Ok(outcome) => {
            engine.complete(&session_id, outcome.summary.clone()).await?;
            tracing::info!(session_id = %session_id, "Search job completed");
            Ok(outcome)
        }
        Err(err) => {
            let message = format!("{err:#}");
            if let Err(e) = engine.fail(&session_id, &message).await {
                tracing::error!(
                    session_id = %session_id,
                    error = %e,
                    "Failed to record search failure"
                );
            }
            Err(err)
        }
    }
}

/// Spawn [`run_search_job`] on the runtime, logging a failed job.
pub fn spawn_search_job(
    engine: Arc<WorkflowEngine>,
    job: Arc<dyn SearchJob>,
    request: SearchRequest,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let session_id = request.session_id.clone();
        if let Err(e) = run_search_job(engine, job, request).await {
            tracing::warn!(session_id = %session_id, error = %e, "Search job failed");
        }
    })
}

/// Handles of spawned search jobs, at most one tracked per session.
///
/// The engine never cancels a job. A second `start-search` for a session
/// whose job is still running starts another job alongside it; the earlier
/// one keeps reporting into the same session.
#[derive(Default)]
pub struct RunningJobs {
    handles: Mutex<HashMap<SessionId, JoinHandle<()>>>,
}

impl RunningJobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `job` for `request` and track it under its session.
    ///
    /// Returns `true` when a job for the same session was still running.
    pub async fn spawn(
        &self,
        engine: Arc<WorkflowEngine>,
        job: Arc<dyn SearchJob>,
        request: SearchRequest,
    ) -> bool {
        let session_id = request.session_id.clone();
        let mut handles = self.handles.lock().await;
        handles.retain(|_, handle| !handle.is_finished());

        let overlapping = handles.contains_key(&session_id);
        if overlapping {
            tracing::warn!(
                session_id = %session_id,
                "Search job already running for session, starting another"
            );
        }
        handles.insert(session_id, spawn_search_job(engine, job, request));
        overlapping
    }

    /// Number of tracked jobs that have not finished yet.
    pub async fn running_count(&self) -> usize {
        let mut handles = self.handles.lock().await;
        handles.retain(|_, handle| !handle.is_finished());
        handles.len()
    }
}

#[cfg(test)]
mod tests {
    use prospect_core::store::{MemoryStatusStore, StatusStore};
    use prospect_core::workflow::{SubStepStatus, SubStepUpdate, WorkflowStage};

    use super::*;
    use crate::ws::{BroadcastRouter, ConnectionRegistry};

    /// Completes the first substep, then succeeds or fails.
    struct ScriptedJob {
        fail_with: Option<&'static str>,
    }

    #[async_trait]
    impl SearchJob for ScriptedJob {
        async fn run(
            &self,
            engine: Arc<WorkflowEngine>,
            request: SearchRequest,
        ) -> anyhow::Result<SearchOutcome> {
            engine
                .update_substep(
                    &request.session_id,
                    "1.1",
                    &SubStepUpdate::status(SubStepStatus::Completed),
                )
                .await?;
            match self.fail_with {
                Some(msg) => Err(anyhow::anyhow!(msg)),
                None => Ok(SearchOutcome {
                    summary: serde_json::json!({ "prospects": 4 }),
                }),
            }
        }
    }

    /// Never finishes.
    struct StuckJob;

    #[async_trait]
    impl SearchJob for StuckJob {
        async fn run(
            &self,
            _engine: Arc<WorkflowEngine>,
            _request: SearchRequest,
        ) -> anyhow::Result<SearchOutcome> {
            std::future::pending::<anyhow::Result<SearchOutcome>>().await
        }
    }

    async fn started_engine() -> (Arc<WorkflowEngine>, SearchRequest) {
        let registry = Arc::new(ConnectionRegistry::new());
        let engine = Arc::new(WorkflowEngine::new(
            Arc::new(MemoryStatusStore::new()) as Arc<dyn StatusStore>,
            BroadcastRouter::new(registry),
        ));
        let request =
            SearchRequest::from_parts(Some("s1".into()), Some("fintech".into()), None).unwrap();
        engine.start("s1", &request.query).await.unwrap();
        (engine, request)
    }

    #[tokio::test]
    async fn successful_job_completes_session() {
        let (engine, request) = started_engine().await;
        let outcome = run_search_job(
            Arc::clone(&engine),
            Arc::new(ScriptedJob { fail_with: None }),
            request,
        )
        .await
        .unwrap();
        assert_eq!(outcome.summary["prospects"], 4);

        let status = engine.get_status("s1").await.unwrap();
        assert_eq!(status.stage, WorkflowStage::Complete);
        assert_eq!(status.progress, 100);
    }

    #[tokio::test]
    async fn failed_job_marks_error_and_returns_original_error() {
        let (engine, request) = started_engine().await;
        let err = run_search_job(
            Arc::clone(&engine),
            Arc::new(ScriptedJob {
                fail_with: Some("provider quota exceeded"),
            }),
            request,
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "provider quota exceeded");

        let status = engine.get_status("s1").await.unwrap();
        assert_eq!(status.stage, WorkflowStage::Error);
        assert_eq!(status.message, "provider quota exceeded");
        assert_eq!(
            status.substep("1.1").unwrap().status,
            SubStepStatus::Completed
        );
        assert!(status
            .substeps
            .iter()
            .filter(|s| s.id != "1.1")
            .all(|s| s.status == SubStepStatus::Error));
    }

    #[tokio::test]
    async fn second_job_for_running_session_is_flagged() {
        let (engine, request) = started_engine().await;
        let jobs = RunningJobs::new();

        let first = jobs
            .spawn(Arc::clone(&engine), Arc::new(StuckJob), request.clone())
            .await;
        let second = jobs
            .spawn(Arc::clone(&engine), Arc::new(StuckJob), request)
            .await;

        assert!(!first);
        assert!(second);
        assert_eq!(jobs.running_count().await, 1);
    }

    #[tokio::test]
    async fn finished_job_is_not_flagged() {
        let (engine, request) = started_engine().await;
        let jobs = RunningJobs::new();

        jobs.spawn(
            Arc::clone(&engine),
            Arc::new(ScriptedJob { fail_with: None }),
            request.clone(),
        )
        .await;
        for _ in 0..100 {
            if jobs.running_count().await == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(jobs.running_count().await, 0);

        let overlapping = jobs
            .spawn(Arc::clone(&engine), Arc::new(StuckJob), request)
            .await;
        assert!(!overlapping);
    }
}
