use std::sync::Arc;

use prospect_core::store::StatusStore;

use crate::auth::SessionAccess;
use crate::config::ServerConfig;
use crate::engine::{RunningJobs, SearchJob, WorkflowEngine};
use crate::ws::{BroadcastRouter, ConnectionRegistry};

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Live WebSocket connections and their session membership.
    pub registry: Arc<ConnectionRegistry>,
    /// Session fan-out over `registry`.
    pub router: BroadcastRouter,
    /// Per-session workflow status.
    pub engine: Arc<WorkflowEngine>,
    /// Access check consulted on `join-session`.
    pub session_access: Arc<dyn SessionAccess>,
    /// Job spawned by `start-search`, if one is installed.
    pub search_job: Option<Arc<dyn SearchJob>>,
    /// Jobs spawned by `start-search`, tracked per session.
    pub jobs: Arc<RunningJobs>,
    /// Database pool when status is persisted to Postgres.
    pub pool: Option<prospect_db::DbPool>,
}

impl AppState {
    /// Wire a fresh registry, router and engine around `store`.
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn StatusStore>,
        session_access: Arc<dyn SessionAccess>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = BroadcastRouter::new(Arc::clone(&registry));
        let engine = Arc::new(WorkflowEngine::new(store, router.clone()));
        Self {
            config: Arc::new(config),
            registry,
            router,
            engine,
            session_access,
            search_job: None,
            jobs: Arc::new(RunningJobs::new()),
            pool: None,
        }
    }

    pub fn with_pool(mut self, pool: prospect_db::DbPool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn with_search_job(mut self, job: Arc<dyn SearchJob>) -> Self {
        self.search_job = Some(job);
        self
    }
}
