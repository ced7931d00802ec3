//! Submission and status queries: the API side of a job.

use garde::Validate;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::job::{Job, JobResult, JobStatus};
use crate::models::music::MusicChoice;
use crate::models::submission::SubmitRequest;
use crate::services::dispatch::{DispatchError, Dispatcher};
use crate::services::queue::QueuedJob;
use crate::services::staging::{StagingArea, StagingError};
use crate::store::{JobStore, StoreError};

pub struct JobService {
    store: Arc<dyn JobStore>,
    staging: StagingArea,
    dispatcher: Arc<dyn Dispatcher>,
}

impl JobService {
    pub fn new(store: Arc<dyn JobStore>, staging: StagingArea, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            store,
            staging,
            dispatcher,
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Validate, record a `queued` job and hand it to a worker.
    ///
    /// Returns as soon as the hand-off succeeded; never waits for generation.
    pub async fn submit(&self, request: SubmitRequest) -> Result<Uuid, SubmitError> {
        request
            .validate()
            .map_err(|e| SubmitError::InvalidInput(e.to_string()))?;
        let music = MusicChoice::from_option(request.music_category.as_deref()).map_err(|_| {
            SubmitError::InvalidInput(format!(
                "Unknown music category '{}'",
                request.music_category.as_deref().unwrap_or_default()
            ))
        })?;

        let mut job = Job::new();
        let payload_path = self.staging.write_payload(job.id, &request.images).await?;

        if let Err(e) = self.store.create(&job).await {
            let _ = self.staging.cleanup(job.id, &payload_path).await;
            return Err(e.into());
        }

        tracing::info!(job_id = %job.id, images = request.images.len(), "Created job");

        let queued = QueuedJob {
            job_id: job.id,
            payload_path: payload_path.clone(),
            music,
        };

        if let Err(e) = self.dispatcher.dispatch(&queued).await {
            tracing::error!(job_id = %job.id, error = %e, "Failed to launch worker");
            metrics::counter!("booth_jobs_launch_failed_total").increment(1);

            // Nobody else will ever touch this record; close it out.
            if job.fail(format!("Failed to start video generation worker: {}", e)).is_ok() {
                if let Err(store_err) = self.store.save(&job).await {
                    tracing::error!(job_id = %job.id, error = %store_err, "Failed to mark job failed");
                }
            }
            let _ = self.staging.cleanup(job.id, &payload_path).await;
            return Err(SubmitError::LaunchFailure(e));
        }

        metrics::counter!("booth_jobs_submitted_total").increment(1);
        Ok(job.id)
    }

    /// Current snapshot of a job, read fresh from the store.
    pub async fn status(&self, job_id: Uuid) -> Result<Job, JobQueryError> {
        self.store
            .load(job_id)
            .await?
            .ok_or(JobQueryError::NotFound(job_id))
    }

    /// The finished job's result, or why there is none yet.
    ///
    /// Returns the whole job so callers can surface the auxiliary upload error
    /// of a degraded completion.
    pub async fn result(&self, job_id: Uuid) -> Result<(Job, JobResult), ResultError> {
        let job = self.status(job_id).await?;
        match job.status {
            JobStatus::Queued | JobStatus::Processing => Err(ResultError::NotReady(job.status)),
            JobStatus::Failed => Err(ResultError::Failed(
                job.error.clone().unwrap_or_else(|| "Unknown error".to_string()),
            )),
            JobStatus::Completed => match job.result.clone() {
                Some(result) => Ok((job, result)),
                None => Err(ResultError::Query(JobQueryError::Store(StoreError::Invalid(
                    format!("completed job {} has no result", job_id),
                )))),
            },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to start video generation: {0}")]
    LaunchFailure(#[from] DispatchError),

    #[error("Failed to stage images: {0}")]
    Staging(#[from] StagingError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum JobQueryError {
    #[error("Job {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum ResultError {
    #[error(transparent)]
    Query(#[from] JobQueryError),

    #[error("Job is still {0}")]
    NotReady(JobStatus),

    #[error("Job failed: {0}")]
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FileJobStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<QueuedJob>>,
        fail: bool,
    }

    #[async_trait]
    impl Dispatcher for Recording {
        async fn dispatch(&self, job: &QueuedJob) -> Result<(), DispatchError> {
            if self.fail {
                return Err(DispatchError::Closed);
            }
            self.sent.lock().unwrap().push(job.clone());
            Ok(())
        }
    }

    async fn service(dir: &std::path::Path, fail: bool) -> (JobService, Arc<Recording>) {
        let store = Arc::new(FileJobStore::open(dir).await.unwrap());
        let dispatcher = Arc::new(Recording {
            fail,
            ..Default::default()
        });
        let svc = JobService::new(store, StagingArea::new(dir), dispatcher.clone());
        (svc, dispatcher)
    }

    fn request(count: usize, music: Option<&str>) -> SubmitRequest {
        SubmitRequest {
            images: vec!["aGVsbG8=".to_string(); count],
            music_category: music.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_submit_queues_and_dispatches() {
        let tmp = tempfile::tempdir().unwrap();
        let (svc, dispatcher) = service(tmp.path(), false).await;

        let id = svc.submit(request(2, Some("calm"))).await.unwrap();

        let job = svc.status(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);

        let sent = dispatcher.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].job_id, id);
        assert!(sent[0].payload_path.exists());
    }

    #[tokio::test]
    async fn test_invalid_music_is_rejected_without_job() {
        let tmp = tempfile::tempdir().unwrap();
        let (svc, dispatcher) = service(tmp.path(), false).await;

        let err = svc.submit(request(1, Some("polka"))).await.unwrap_err();
        assert!(matches!(err, SubmitError::InvalidInput(_)));
        assert!(dispatcher.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_launch_failure_marks_job_failed() {
        let tmp = tempfile::tempdir().unwrap();
        let (svc, _) = service(tmp.path(), true).await;

        let err = svc.submit(request(1, None)).await.unwrap_err();
        assert!(matches!(err, SubmitError::LaunchFailure(_)));

        // the staged payload is gone
        let mut payloads = tokio::fs::read_dir(tmp.path().join("payloads")).await.unwrap();
        assert!(payloads.next_entry().await.unwrap().is_none());

        // and the one record that was created is closed out as failed
        let mut records = tokio::fs::read_dir(tmp.path().join("jobs")).await.unwrap();
        let entry = records.next_entry().await.unwrap().unwrap();
        let job: Job = serde_json::from_slice(&tokio::fs::read(entry.path()).await.unwrap()).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("Failed to start"));
        assert!(records.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_result_of_queued_job_is_not_ready() {
        let tmp = tempfile::tempdir().unwrap();
        let (svc, _) = service(tmp.path(), false).await;
        let id = svc.submit(request(1, None)).await.unwrap();

        assert!(matches!(
            svc.result(id).await.unwrap_err(),
            ResultError::NotReady(JobStatus::Queued)
        ));
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let (svc, _) = service(tmp.path(), false).await;
        let id = Uuid::new_v4();

        assert!(matches!(svc.status(id).await.unwrap_err(), JobQueryError::NotFound(x) if x == id));
        assert!(matches!(
            svc.result(id).await.unwrap_err(),
            ResultError::Query(JobQueryError::NotFound(_))
        ));
    }
}
