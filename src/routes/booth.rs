use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::job::JobStatus;
use crate::models::music::CategoryListResponse;
use crate::models::submission::{JobResultResponse, JobStatusResponse, SubmitRequest, SubmitResponse};
use crate::routes::error::{ApiError, ApiResult};

fn parse_job_id(raw: &str) -> Result<Uuid, ApiError> {
    // An id we could never have issued is simply unknown.
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound(raw.to_string()))
}

/// POST /api/auto-vlog: Submit photos for background video generation.
pub async fn submit_auto_vlog(
    State(state): State<AppState>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let Json(request) = payload.map_err(|e| {
        metrics::counter!("booth_jobs_rejected_total").increment(1);
        ApiError::InvalidInput(e.body_text())
    })?;

    let job_id = state.jobs.submit(request).await.inspect_err(|e| {
        if matches!(e, crate::services::jobs::SubmitError::InvalidInput(_)) {
            metrics::counter!("booth_jobs_rejected_total").increment(1);
        }
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id,
            status: JobStatus::Queued,
            message: format!(
                "Video generation started in background. Use /api/auto-vlog/status/{} to check progress.",
                job_id
            ),
        }),
    ))
}

/// GET /api/auto-vlog/status/{job_id}: Poll job progress.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job_id = parse_job_id(&job_id)?;
    let job = state.jobs.status(job_id).await?;
    Ok(Json(JobStatusResponse::from(&job)))
}

/// GET /api/auto-vlog/result/{job_id}: Fetch the finished video reference.
pub async fn get_job_result(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobResultResponse>> {
    let job_id = parse_job_id(&job_id)?;
    let (job, result) = state.jobs.result(job_id).await?;

    tracing::info!(job_id = %job_id, artifact = %result.artifact.location(), "Returning job result");

    Ok(Json(JobResultResponse::new(
        job_id,
        &result,
        job.completed_at,
        job.error,
    )))
}

/// GET /api/auto-vlog/music-categories
pub async fn music_categories() -> Json<CategoryListResponse> {
    Json(CategoryListResponse::catalogue())
}
