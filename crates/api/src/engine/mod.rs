//! Workflow status engine and the job supervisor that drives it.

pub mod job;
pub mod workflow;

use prospect_core::error::CoreError;
use prospect_core::store::StoreError;
use prospect_core::workflow::TransitionError;

pub use job::{run_search_job, spawn_search_job, RunningJobs, SearchJob, SearchOutcome};
pub use workflow::WorkflowEngine;

/// Failure of an engine operation. Nothing was broadcast when one is returned.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Failed to persist workflow status: {0}")]
    Store(#[from] StoreError),
}

impl From<EngineError> for CoreError {
    fn from(err: EngineError) -> Self {
        CoreError::Internal(err.to_string())
    }
}

/// What happened to an accepted update call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The change was persisted and broadcast to `delivered` connections.
    Applied { delivered: usize },
    /// The change would break the state machine and was dropped.
    Ignored { reason: TransitionError },
}

impl UpdateOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}
