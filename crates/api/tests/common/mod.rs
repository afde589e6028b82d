#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use prospect_core::store::MemoryStatusStore;
use tower::ServiceExt;

use prospect_api::auth::jwt::JwtConfig;
use prospect_api::auth::{JwtSessionAccess, OpenAccess};
use prospect_api::config::{LivenessConfig, ServerConfig};
use prospect_api::router::build_app_router;
use prospect_api::state::AppState;

pub const TEST_JWT_SECRET: &str = "integration-test-secret-with-enough-bytes";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        database_url: None,
        liveness: LivenessConfig::default(),
        jwt: None,
    }
}

pub fn test_jwt_config() -> JwtConfig {
    JwtConfig {
        secret: TEST_JWT_SECRET.to_string(),
        access_token_expiry_mins: 5,
    }
}

/// State with an in-memory store and access enforcement disabled.
pub fn test_state() -> AppState {
    AppState::new(
        test_config(),
        Arc::new(MemoryStatusStore::new()),
        Arc::new(OpenAccess),
    )
}

/// State that requires tokens signed with [`TEST_JWT_SECRET`].
pub fn jwt_state() -> AppState {
    let mut config = test_config();
    config.jwt = Some(test_jwt_config());
    AppState::new(
        config,
        Arc::new(MemoryStatusStore::new()),
        Arc::new(JwtSessionAccess::new(test_jwt_config())),
    )
}

/// Build the full application router around `state`.
pub fn build_test_app(state: AppState) -> Router {
    build_app_router(state)
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
