use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use reel_core::error::CoreError;
use reel_store::StoreError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Every variant is rendered through its [`CoreError`] form as
/// `{ "error": ..., "code": ... }`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `reel_core` or the orchestrator.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A history store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<AppError> for CoreError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Core(core) => core,
            AppError::Store(store) => store.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match CoreError::from(self) {
            CoreError::NotFound { entity, id } => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("{entity} with id {id} not found"),
            ),
            CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
            CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            CoreError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
