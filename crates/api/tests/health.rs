//! Integration tests for the health check endpoint and general HTTP behaviour.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::{body_json, get};
use tower::ServiceExt;

#[tokio::test]
async fn health_check_reports_connections_and_store() {
    let state = common::test_state();
    let (conn_id, _rx) = state.registry.register("u1").await;
    state.registry.join(&conn_id, "s1").await.unwrap();

    let response = get(common::build_test_app(state), "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert_eq!(json["connections"], 1);
    assert_eq!(json["sessions"], 1);
    assert_eq!(json["store"], "memory");
    assert!(json.get("db_healthy").is_none());
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let app = common::build_test_app(common::test_state());
    let response = get(app, "/this-route-does-not-exist").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn response_contains_x_request_id_header() {
    let app = common::build_test_app(common::test_state());
    let response = get(app, "/health").await;

    let request_id = response
        .headers()
        .get("x-request-id")
        .expect("Response must contain an x-request-id header");
    assert_eq!(request_id.to_str().unwrap().len(), 36);
}

#[tokio::test]
async fn cors_preflight_returns_correct_headers() {
    let app = common::build_test_app(common::test_state());

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/v1/ws")
        .header("Origin", "http://localhost:5173")
        .header("Access-Control-Request-Method", "GET")
        .header("Access-Control-Request-Headers", "content-type")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let allow_origin = response
        .headers()
        .get("access-control-allow-origin")
        .expect("Missing Access-Control-Allow-Origin header")
        .to_str()
        .unwrap();
    assert_eq!(allow_origin, "http://localhost:5173");
}

#[tokio::test]
async fn plain_get_on_ws_route_is_not_upgraded() {
    let app = common::build_test_app(common::test_state());
    let response = get(app, "/api/v1/ws").await;

    assert!(response.status().is_client_error());
}
