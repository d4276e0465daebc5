use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::storage::RepoError;

/// Errors that can cross an HTTP boundary or abort startup.
///
/// Forwarding failures and probe failures are handled locally and never
/// surface as an `AppError`: they become response bodies written directly
/// by the forwarder, or log lines written by the health supervisor.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("repository error: {0}")]
    Repository(#[from] RepoError),

    #[error("listen address bind failed: {0}")]
    Bind(#[source] std::io::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::Repository(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            AppError::Bind(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        };
        (
            status,
            axum::Json(json!({ "code": status.as_u16(), "message": message })),
        )
            .into_response()
    }
}
