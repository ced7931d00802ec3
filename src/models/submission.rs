use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::{ArtifactRef, Job, JobResult, JobStatus};

/// Largest batch of photos accepted in one submission.
pub const MAX_IMAGES: usize = 20;

/// Request body of `POST /api/auto-vlog`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitRequest {
    /// Base64 images, optionally as `data:image/...;base64,` URLs.
    #[garde(length(min = 1, max = MAX_IMAGES), inner(length(min = 1)))]
    pub images: Vec<String>,

    /// Music mood id, `"auto"` or absent for AI selection.
    #[garde(skip)]
    #[serde(default)]
    pub music_category: Option<String>,
}

/// Response after submitting a job.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub message: String,
}

/// Response for polling job status.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl From<&Job> for JobStatusResponse {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            message: job.message.clone(),
            created_at: job.created_at,
            completed_at: job.completed_at,
            error: job.error.clone(),
        }
    }
}

/// Response for fetching the finished video.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobResultResponse {
    pub job_id: Uuid,
    /// CDN URL when uploaded, otherwise `None`.
    pub video_url: Option<String>,
    pub public_id: Option<String>,
    /// Worker-local path when the video never reached the CDN.
    pub video_path: Option<String>,
    pub duration: f64,
    pub resolution: [u32; 2],
    pub clips_count: usize,
    pub music_category: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Upload failure detail for degraded results.
    pub error: Option<String>,
    pub message: String,
}

impl JobResultResponse {
    pub fn new(
        job_id: Uuid,
        result: &JobResult,
        completed_at: Option<DateTime<Utc>>,
        error: Option<String>,
    ) -> Self {
        let (video_url, public_id, video_path, message) = match &result.artifact {
            ArtifactRef::Remote { url, public_id } => (
                Some(url.clone()),
                Some(public_id.clone()),
                None,
                "Video available on CDN".to_string(),
            ),
            ArtifactRef::Local { path } => (
                None,
                None,
                Some(path.display().to_string()),
                "Video available on the worker only".to_string(),
            ),
        };

        Self {
            job_id,
            video_url,
            public_id,
            video_path,
            duration: result.duration_secs,
            resolution: [result.width, result.height],
            clips_count: result.clips_count,
            music_category: result.music_category.clone(),
            completed_at,
            error,
            message,
        }
    }
}
