//! Integration tests for the HTTP status read path.

mod common;

use axum::http::StatusCode;
use common::{body_json, get};
use prospect_core::workflow::{StatusUpdate, WorkflowStage};

#[tokio::test]
async fn untouched_session_reads_as_idle() {
    let app = common::build_test_app(common::test_state());
    let response = get(app, "/api/v1/sessions/s-new/status").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["sessionId"], "s-new");
    assert_eq!(json["data"]["stage"], "idle");
    assert_eq!(json["data"]["substeps"], serde_json::json!([]));
}

#[tokio::test]
async fn started_session_reads_current_snapshot() {
    let state = common::test_state();
    state.engine.start("s1", "robotics startups").await.unwrap();
    state
        .engine
        .update_status(
            "s1",
            &StatusUpdate::stage(WorkflowStage::Filtering).with_progress(60),
        )
        .await
        .unwrap();

    let response = get(common::build_test_app(state), "/api/v1/sessions/s1/status").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["data"]["stage"], "filtering");
    assert_eq!(json["data"]["progress"], 60);
    assert_eq!(json["data"]["currentStep"], 3);
    assert_eq!(json["data"]["totalSteps"], 5);
    assert_eq!(json["data"]["substeps"][0]["id"], "1.1");
}

#[tokio::test]
async fn oversized_session_id_is_rejected() {
    let app = common::build_test_app(common::test_state());
    let uri = format!("/api/v1/sessions/{}/status", "x".repeat(200));
    let response = get(app, &uri).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
}
