use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Status of an auto-vlog generation job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(JobStatus::Queued),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    /// `completed` and `failed` are final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether moving from `self` to `next` is a legal step of the job state machine.
    ///
    /// `processing -> processing` is allowed so the worker can rewrite its
    /// progress message.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Processing)
                | (Queued, Failed)
                | (Processing, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the generated video can be fetched from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactRef {
    /// Delivered to the CDN.
    Remote { url: String, public_id: String },
    /// Kept on the worker's filesystem (no uploader, or upload failed).
    Local { path: PathBuf },
}

impl ArtifactRef {
    /// URL or filesystem path, whichever this artifact has.
    pub fn location(&self) -> String {
        match self {
            ArtifactRef::Remote { url, .. } => url.clone(),
            ArtifactRef::Local { path } => path.display().to_string(),
        }
    }
}

/// Output of a completed job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobResult {
    pub artifact: ArtifactRef,
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
    pub clips_count: usize,
    pub music_category: Option<String>,
}

/// One unit of background video generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<JobResult>,
    pub error: Option<String>,
}

impl Job {
    /// A freshly queued job with a new v4 id.
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4())
    }

    pub fn with_id(id: Uuid) -> Self {
        Self {
            id,
            status: JobStatus::Queued,
            message: "Job queued for processing".to_string(),
            created_at: Utc::now(),
            completed_at: None,
            result: None,
            error: None,
        }
    }

    /// queued -> processing
    pub fn start(&mut self, message: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Processing)?;
        self.message = message.into();
        Ok(())
    }

    /// Rewrite the progress note of a processing job.
    pub fn progress(&mut self, message: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Processing)?;
        self.message = message.into();
        Ok(())
    }

    /// processing -> completed.
    ///
    /// `upload_error` marks a degraded completion: the video exists locally but
    /// never reached the CDN.
    pub fn complete(
        &mut self,
        result: JobResult,
        upload_error: Option<String>,
    ) -> Result<(), TransitionError> {
        self.transition(JobStatus::Completed)?;
        self.message = match upload_error {
            Some(_) => "Video generated but upload failed".to_string(),
            None => match result.artifact {
                ArtifactRef::Remote { .. } => "Video generated and uploaded to CDN".to_string(),
                ArtifactRef::Local { .. } => "Video generated".to_string(),
            },
        };
        self.result = Some(result);
        self.error = upload_error;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// queued|processing -> failed
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Failed)?;
        let error = error.into();
        self.message = format!("Video generation failed: {}", error);
        self.result = None;
        self.error = Some(error);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                job_id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

impl Default for Job {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Job {job_id} cannot move from {from} to {to}")]
pub struct TransitionError {
    pub job_id: Uuid,
    pub from: JobStatus,
    pub to: JobStatus,
}
