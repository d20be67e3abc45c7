use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid file: {0}")]
    InvalidFile(String),

    #[error("File too large. Maximum size is {limit_bytes} bytes")]
    FileTooLarge { limit_bytes: usize },

    #[error("Could not extract text from PDF: {0}")]
    Extraction(String),

    #[error("Could not extract text from PDF. Please ensure it contains text.")]
    EmptyContent,

    #[error("AI generation failed: {0}")]
    GenerationFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Job {job_id} is not ready (status: {status})")]
    NotReady { job_id: String, status: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Service busy: {0}")]
    Busy(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidFile(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Extraction(_) | AppError::EmptyContent => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::GenerationFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::NotReady { .. } | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Busy(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Io(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidFile(_) | AppError::FileTooLarge { .. } => "INVALID_FILE",
            AppError::Extraction(_) => "EXTRACTION_ERROR",
            AppError::EmptyContent => "EMPTY_CONTENT",
            AppError::GenerationFailed(_) => "GENERATION_FAILED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::NotReady { .. } => "NOT_READY",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Busy(_) => "BUSY",
            AppError::Io(_) | AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show clients and to store on a failed job.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Io(_) | AppError::Internal(_) => {
                "An internal server error occurred".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Io(e) => tracing::error!("I/O error: {e}"),
            AppError::Internal(e) => tracing::error!("Internal error: {e:?}"),
            AppError::GenerationFailed(msg) => tracing::error!("Generation failed: {msg}"),
            _ => {}
        }

        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.public_message()
            }
        }));

        (self.status_code(), body).into_response()
    }
}
