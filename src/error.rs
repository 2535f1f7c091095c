//! Error types for stackwatch
//!
//! Per-container failures (one stats query, one unparseable timestamp) never
//! surface here; they are downgraded to sentinels where they happen. What does
//! surface is either a missing resource or a runtime that cannot be reached.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StackwatchError {
    #[error("Container runtime error: {0}")]
    Runtime(String),

    #[error("Failed to read container stats: {0}")]
    Stats(String),

    #[error("Container '{0}' not found")]
    ContainerNotFound(String),

    #[error("Stack '{0}' not found")]
    StackNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl StackwatchError {
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Runtime(_) => "runtime_unavailable",
            Self::Stats(_) => "stats_failed",
            Self::ContainerNotFound(_) => "container_not_found",
            Self::StackNotFound(_) => "stack_not_found",
            Self::Config(_) => "config_invalid",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Runtime(_) => StatusCode::BAD_GATEWAY,
            Self::Stats(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ContainerNotFound(_) => StatusCode::NOT_FOUND,
            Self::StackNotFound(_) => StatusCode::NOT_FOUND,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    message: String,
    r#type: String,
    code: u16,
}

impl IntoResponse for StackwatchError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            message: self.to_string(),
            r#type: self.error_type().to_string(),
            code: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<bollard::errors::Error> for StackwatchError {
    fn from(err: bollard::errors::Error) -> Self {
        match err {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                message,
            } => StackwatchError::ContainerNotFound(message),
            other => StackwatchError::Runtime(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, StackwatchError>;
