use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::models::job::JobStatus;
use crate::services::jobs::{JobQueryError, ResultError, SubmitError};

/// Error type of the HTTP handlers, rendered as `{"error": ..., "code": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    /// The job exists but has not finished; the client should poll again.
    #[error("Job is still {0}. Check /api/auto-vlog/status/{{job_id}} for updates.")]
    NotReady(JobStatus),

    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("{0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::InvalidInput(msg) => ApiError::InvalidInput(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<JobQueryError> for ApiError {
    fn from(err: JobQueryError) -> Self {
        match err {
            JobQueryError::NotFound(id) => ApiError::NotFound(id.to_string()),
            JobQueryError::Store(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<ResultError> for ApiError {
    fn from(err: ResultError) -> Self {
        match err {
            ResultError::Query(e) => e.into(),
            ResultError::NotReady(status) => ApiError::NotReady(status),
            ResultError::Failed(msg) => ApiError::JobFailed(msg),
        }
    }
}

/// 425 Too Early.
fn too_early() -> StatusCode {
    StatusCode::from_u16(425).unwrap_or(StatusCode::SERVICE_UNAVAILABLE)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::NotReady(_) => (too_early(), "NOT_READY"),
            ApiError::JobFailed(_) => (StatusCode::UNPROCESSABLE_ENTITY, "JOB_FAILED"),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        let body = json!({
            "error": self.to_string(),
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
