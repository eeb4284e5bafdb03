use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Closed set of error kinds produced by the core. Each variant maps to
/// exactly one HTTP status; handlers never invent new status codes.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("temporarily unavailable: {0}")]
    Transient(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("model inference failed: {0}")]
    ModelError(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => {
                tracing::warn!(error = %msg, "not found");
                (StatusCode::NOT_FOUND, msg.clone())
            }
            AppError::Transient(msg) => {
                tracing::warn!(error = %msg, "transient error");
                (StatusCode::SERVICE_UNAVAILABLE, msg.clone())
            }
            AppError::Conflict(msg) => {
                tracing::warn!(error = %msg, "conflict");
                (StatusCode::CONFLICT, msg.clone())
            }
            AppError::Invariant(msg) => {
                tracing::error!(error = %msg, "invariant violation");
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
            AppError::Validation(msg) => {
                tracing::warn!(error = %msg, "validation error");
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            AppError::ModelError(msg) => {
                tracing::error!(error = %msg, "model error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
        };

        let body = Json(ErrorResponse {
            error: message,
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}

#[cfg(feature = "onnx")]
impl From<ort::Error> for AppError {
    fn from(err: ort::Error) -> Self {
        AppError::ModelError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
