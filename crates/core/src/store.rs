//! Persistence seam for workflow status snapshots.
//!
//! The engine writes every mutation through a [`StatusStore`] before it
//! broadcasts, so the store is always at least as new as anything an
//! observer has been told. [`MemoryStatusStore`] keeps snapshots in process;
//! the Postgres implementation lives in `prospect-db`.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::types::SessionId;
use crate::workflow::{SubStep, WorkflowStatus};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid stored value: {0}")]
    InvalidData(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable sink for status snapshots.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Persist a whole snapshot, replacing any previous one for the session.
    async fn save_status(&self, session_id: &str, status: &WorkflowStatus) -> StoreResult<()>;

    /// Persist a single substep of the session's snapshot.
    async fn save_substep(&self, session_id: &str, substep: &SubStep) -> StoreResult<()>;

    /// Load the last persisted snapshot, if any.
    async fn load_status(&self, session_id: &str) -> StoreResult<Option<WorkflowStatus>>;

    /// Short backend name for health output and logs.
    fn backend(&self) -> &'static str;
}

/// In-process store used when no database is configured, and in tests.
#[derive(Default)]
pub struct MemoryStatusStore {
    snapshots: RwLock<HashMap<SessionId, WorkflowStatus>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.snapshots.read().await.is_empty()
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn save_status(&self, session_id: &str, status: &WorkflowStatus) -> StoreResult<()> {
        self.snapshots
            .write()
            .await
            .insert(session_id.to_string(), status.clone());
        Ok(())
    }

    async fn save_substep(&self, session_id: &str, substep: &SubStep) -> StoreResult<()> {
        let mut snapshots = self.snapshots.write().await;
        let status = snapshots
            .entry(session_id.to_string())
            .or_insert_with(|| WorkflowStatus::idle(session_id));
        status.upsert_substep(substep.clone());
        status.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn load_status(&self, session_id: &str) -> StoreResult<Option<WorkflowStatus>> {
        Ok(self.snapshots.read().await.get(session_id).cloned())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::SubStepStatus;

    #[tokio::test]
    async fn save_then_load_round_trips_snapshot() {
        let store = MemoryStatusStore::new();
        let status = WorkflowStatus::started("s1", "saas", crate::plan::default_substeps());
        store.save_status("s1", &status).await.unwrap();

        let loaded = store.load_status("s1").await.unwrap().unwrap();
        assert_eq!(loaded, status);
        assert!(store.load_status("s2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_substep_replaces_matching_step() {
        let store = MemoryStatusStore::new();
        let status = WorkflowStatus::started("s1", "saas", crate::plan::default_substeps());
        store.save_status("s1", &status).await.unwrap();

        let mut step = status.substep("1.2").unwrap().clone();
        step.status = SubStepStatus::InProgress;
        store.save_substep("s1", &step).await.unwrap();

        let loaded = store.load_status("s1").await.unwrap().unwrap();
        assert_eq!(loaded.substeps.len(), status.substeps.len());
        assert_eq!(
            loaded.substep("1.2").unwrap().status,
            SubStepStatus::InProgress
        );
    }

    #[tokio::test]
    async fn save_substep_without_snapshot_creates_idle_one() {
        let store = MemoryStatusStore::new();
        store
            .save_substep("s9", &SubStep::placeholder("2.1"))
            .await
            .unwrap();

        let loaded = store.load_status("s9").await.unwrap().unwrap();
        assert_eq!(loaded.substeps.len(), 1);
        assert_eq!(store.len().await, 1);
    }
}
