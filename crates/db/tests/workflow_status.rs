//! Database round-trip tests for workflow snapshots.
//!
//! Need a reachable PostgreSQL via `DATABASE_URL`; run with
//! `cargo test -p prospect-db -- --ignored`.

use prospect_core::plan::default_substeps;
use prospect_core::store::StatusStore;
use prospect_core::workflow::{SubStepStatus, SubStepUpdate, WorkflowStage, WorkflowStatus};
use prospect_db::PgStatusStore;
use sqlx::PgPool;

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_save_and_load_full_snapshot(pool: PgPool) {
    prospect_db::health_check(&pool).await.unwrap();
    let store = PgStatusStore::new(pool);

    let status = WorkflowStatus::started("s1", "fintech", default_substeps());
    store.save_status("s1", &status).await.unwrap();

    let loaded = store.load_status("s1").await.unwrap().unwrap();
    assert_eq!(loaded.stage, WorkflowStage::Searching);
    assert_eq!(loaded.progress, 10);
    assert_eq!(loaded.substeps.len(), status.substeps.len());
    assert_eq!(loaded.substeps[0].id, "1.1");
    assert_eq!(loaded.substeps[0].tools, status.substeps[0].tools);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_save_substep_updates_single_row(pool: PgPool) {
    let store = PgStatusStore::new(pool);
    let mut status = WorkflowStatus::started("s1", "fintech", default_substeps());
    store.save_status("s1", &status).await.unwrap();

    let step = status.substep_mut_or_insert("2.1");
    step.apply(
        &SubStepUpdate::status(SubStepStatus::InProgress).with_progress(30),
        chrono::Utc::now(),
    )
    .unwrap();
    let step = step.clone();
    store.save_substep("s1", &step).await.unwrap();

    let loaded = store.load_status("s1").await.unwrap().unwrap();
    let stored = loaded.substep("2.1").unwrap();
    assert_eq!(stored.status, SubStepStatus::InProgress);
    assert_eq!(stored.progress, Some(30));
    assert!(stored.started_at.is_some());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_new_snapshot_replaces_old_substeps(pool: PgPool) {
    let store = PgStatusStore::new(pool);
    let mut first = WorkflowStatus::started("s1", "first", default_substeps());
    first.substep_mut_or_insert("9.9");
    store.save_status("s1", &first).await.unwrap();

    let second = WorkflowStatus::started("s1", "second", default_substeps());
    store.save_status("s1", &second).await.unwrap();

    let loaded = store.load_status("s1").await.unwrap().unwrap();
    assert!(loaded.substep("9.9").is_none());
    assert!(loaded.message.contains("second"));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_unknown_session_loads_none(pool: PgPool) {
    let store = PgStatusStore::new(pool);
    assert!(store.load_status("missing").await.unwrap().is_none());
}
