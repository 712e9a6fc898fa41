use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use carpool_core::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    AuthenticationError(String),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Core(err) => match err {
                CoreError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
                CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
                CoreError::InvalidState(msg) | CoreError::AlreadyDone(msg) => (StatusCode::CONFLICT, msg),
                CoreError::ValidationFailed(msg) => (StatusCode::BAD_REQUEST, msg),
                CoreError::Transient(msg) => {
                    tracing::error!("Internal Server Error: {}", msg);
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
                }
            },
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
