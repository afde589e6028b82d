use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use prospect_core::error::CoreError;
use prospect_core::protocol::{error_code, ERROR_CODE_INTERNAL};
use serde_json::json;

use crate::engine::EngineError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and [`EngineError`] for failed
/// workflow operations.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `prospect_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A failed workflow engine operation.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        ERROR_CODE_INTERNAL,
        "An internal error occurred".to_string(),
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => {
                let status = match core {
                    CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
                    CoreError::Validation(_) | CoreError::UnsupportedMessage(_) => {
                        StatusCode::BAD_REQUEST
                    }
                    CoreError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
                    CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
                    CoreError::Internal(msg) => {
                        tracing::error!(error = %msg, "Internal core error");
                        return error_body(internal());
                    }
                };
                (status, error_code(core), core.to_string())
            }

            AppError::Engine(err) => {
                tracing::error!(error = %err, "Workflow engine error");
                internal()
            }
        };

        error_body((status, code, message))
    }
}

fn error_body((status, code, message): (StatusCode, &'static str, String)) -> Response {
    let body = json!({
        "error": message,
        "code": code,
    });
    (status, axum::Json(body)).into_response()
}
