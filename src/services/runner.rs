//! The worker side of a job: decode, render, upload, record the outcome.

use base64::Engine;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::job::{ArtifactRef, Job, JobResult, JobStatus, TransitionError};
use crate::services::generator::{GenerationError, GenerationRequest, VideoGenerator};
use crate::services::queue::QueuedJob;
use crate::services::staging::{StagingArea, StagingError};
use crate::services::uploader::ArtifactUploader;
use crate::store::{JobStore, StoreError};

/// Executes one job end to end and owns every write to its record after hand-off.
pub struct JobRunner {
    store: Arc<dyn JobStore>,
    staging: StagingArea,
    generator: Arc<dyn VideoGenerator>,
    uploader: Option<Arc<dyn ArtifactUploader>>,
}

/// Successful pipeline output, possibly degraded by an upload failure.
struct Delivery {
    result: JobResult,
    upload_error: Option<String>,
}

impl JobRunner {
    pub fn new(
        store: Arc<dyn JobStore>,
        staging: StagingArea,
        generator: Arc<dyn VideoGenerator>,
        uploader: Option<Arc<dyn ArtifactUploader>>,
    ) -> Self {
        Self {
            store,
            staging,
            generator,
            uploader,
        }
    }

    /// Run a job to a terminal state.
    ///
    /// Pipeline failures end up in the job record, not in the return value;
    /// `Err` means the record itself could not be read or written. Staged
    /// input and the workspace are removed on every path.
    pub async fn run(&self, queued: &QueuedJob) -> Result<Job, RunError> {
        let outcome = self.execute(queued).await;

        // no-op unless execute bailed out before its own cleanup
        self.cleanup(queued).await;

        match &outcome {
            Ok(job) => tracing::info!(job_id = %job.id, status = %job.status, "Job finished"),
            Err(e) => tracing::error!(job_id = %queued.job_id, error = %e, "Job could not be recorded"),
        }
        outcome
    }

    async fn execute(&self, queued: &QueuedJob) -> Result<Job, RunError> {
        let mut job = self
            .store
            .load(queued.job_id)
            .await?
            .ok_or(RunError::UnknownJob(queued.job_id))?;

        if job.status.is_terminal() {
            tracing::warn!(job_id = %job.id, status = %job.status, "Job already finished, skipping");
            return Ok(job);
        }

        job.start("Loading images...")?;
        self.store.save(&job).await?;

        match self.pipeline(&mut job, queued).await {
            Ok(delivery) => {
                if delivery.upload_error.is_some() {
                    metrics::counter!("booth_uploads_failed_total").increment(1);
                }
                job.complete(delivery.result, delivery.upload_error)?;
                metrics::counter!("booth_jobs_completed_total").increment(1);
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Video generation failed");
                job.fail(e.to_string())?;
                metrics::counter!("booth_jobs_failed_total").increment(1);
            }
        }

        // staging is gone by the time anyone can observe the terminal state
        self.cleanup(queued).await;
        self.store.save(&job).await?;
        Ok(job)
    }

    async fn cleanup(&self, queued: &QueuedJob) {
        if let Err(e) = self.staging.cleanup(queued.job_id, &queued.payload_path).await {
            tracing::warn!(job_id = %queued.job_id, error = %e, "Failed to clean up staging");
        }
    }

    async fn pipeline(&self, job: &mut Job, queued: &QueuedJob) -> Result<Delivery, PipelineError> {
        let images = self.staging.read_payload(&queued.payload_path).await?;
        let workspace = self.staging.prepare_workspace(job.id).await?;

        self.narrate(job, format!("Decoding {} images...", images.len())).await;
        let image_paths = decode_images(&images, &workspace.input).await?;
        tracing::info!(job_id = %job.id, images = image_paths.len(), "Images decoded");

        self.narrate(job, "Generating video with AI effects...").await;
        let video = self
            .generator
            .generate(GenerationRequest {
                job_id: job.id,
                images: &image_paths,
                output_dir: &workspace.output,
                music: queued.music,
            })
            .await?;

        let metadata = |artifact: ArtifactRef| JobResult {
            artifact,
            duration_secs: video.duration_secs,
            width: video.width,
            height: video.height,
            clips_count: video.clips_count,
            music_category: video.music_category.map(|c| c.to_string()),
        };

        let Some(uploader) = &self.uploader else {
            let kept = self.staging.preserve_artifact(job.id, &video.path).await?;
            return Ok(Delivery {
                result: metadata(ArtifactRef::Local { path: kept }),
                upload_error: None,
            });
        };

        self.narrate(job, "Uploading video...").await;
        let public_id = format!("vlog_{}", job.id.simple());
        match uploader.upload(&video.path, &public_id).await {
            Ok(uploaded) => {
                tracing::info!(
                    job_id = %job.id,
                    url = %uploaded.url,
                    bytes = ?uploaded.bytes,
                    "Video uploaded"
                );
                Ok(Delivery {
                    result: metadata(ArtifactRef::Remote {
                        url: uploaded.url,
                        public_id: uploaded.public_id,
                    }),
                    upload_error: None,
                })
            }
            Err(e) => {
                tracing::warn!(job_id = %job.id, error = %e, "Upload failed, keeping local video");
                let kept = self.staging.preserve_artifact(job.id, &video.path).await?;
                Ok(Delivery {
                    result: metadata(ArtifactRef::Local { path: kept }),
                    upload_error: Some(format!("Upload failed: {}", e)),
                })
            }
        }
    }

    /// Best-effort progress note; status stays `processing`.
    async fn narrate(&self, job: &mut Job, message: impl Into<String>) {
        debug_assert_eq!(job.status, JobStatus::Processing);
        if let Err(e) = job.progress(message) {
            tracing::warn!(job_id = %job.id, error = %e, "Progress update rejected");
            return;
        }
        if let Err(e) = self.store.save(job).await {
            tracing::warn!(job_id = %job.id, error = %e, "Failed to persist progress");
        }
    }
}

/// Strip an optional data-URL prefix and base64-decode.
pub fn decode_image(index: usize, encoded: &str) -> Result<(Vec<u8>, &'static str), PipelineError> {
    let raw = match encoded.split_once(',') {
        Some((_, data)) => data,
        None => encoded,
    };
    // clients may line-wrap long payloads
    let compact: String = raw.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(&compact)
        .map_err(|e| PipelineError::Decode {
            index,
            reason: e.to_string(),
        })?;
    let format = image::guess_format(&bytes).map_err(|_| PipelineError::Decode {
        index,
        reason: "unrecognized image format".to_string(),
    })?;
    let ext = format.extensions_str().first().copied().unwrap_or("img");
    Ok((bytes, ext))
}

async fn decode_images(images: &[String], dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let mut paths = Vec::with_capacity(images.len());
    for (index, encoded) in images.iter().enumerate() {
        let (bytes, ext) = decode_image(index, encoded)?;
        let path = dir.join(format!("image_{:03}.{}", index, ext));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| PipelineError::Staging(e.into()))?;
        paths.push(path);
    }
    Ok(paths)
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{0}")]
    Staging(#[from] StagingError),

    #[error("Failed to decode image {index}: {reason}")]
    Decode { index: usize, reason: String },

    #[error("{0}")]
    Generation(#[from] GenerationError),
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Job {0} has no record")]
    UnknownJob(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_1X1: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52,
    ];

    #[test]
    fn test_decode_plain_base64() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(PNG_1X1);
        let (bytes, ext) = decode_image(0, &encoded).unwrap();
        assert_eq!(bytes, PNG_1X1);
        assert_eq!(ext, "png");
    }

    #[test]
    fn test_decode_data_url() {
        let encoded = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(PNG_1X1)
        );
        let (_, ext) = decode_image(3, &encoded).unwrap();
        assert_eq!(ext, "png");
    }

    #[test]
    fn test_decode_line_wrapped_base64() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(PNG_1X1);
        let (head, tail) = encoded.split_at(12);
        let wrapped = format!("{}\n{}\r\n", head, tail);
        let (bytes, ext) = decode_image(0, &wrapped).unwrap();
        assert_eq!(bytes, PNG_1X1);
        assert_eq!(ext, "png");

        let data_url = format!("data:image/png;base64,{}\n {}", head, tail);
        assert_eq!(decode_image(1, &data_url).unwrap().0, PNG_1X1);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode_image(2, "!!!not base64!!!").unwrap_err();
        assert!(matches!(err, PipelineError::Decode { index: 2, .. }));

        let text = base64::engine::general_purpose::STANDARD.encode(b"just some text");
        let err = decode_image(5, &text).unwrap_err();
        assert!(err.to_string().starts_with("Failed to decode image 5"));
    }
}
