//! Fire-and-forget hand-off of a queued job to a worker.
//!
//! `dispatch` returns as soon as the job is handed over; generation progress
//! is only ever observable through the job store.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::models::music::MusicChoice;
use crate::services::queue::{JobQueue, QueueError, QueuedJob};
use crate::services::runner::JobRunner;

#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, job: &QueuedJob) -> Result<(), DispatchError>;
}

/// Push onto the Redis queue for a long-running `worker listen`.
pub struct QueueDispatcher {
    queue: Arc<JobQueue>,
}

impl QueueDispatcher {
    pub fn new(queue: Arc<JobQueue>) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl Dispatcher for QueueDispatcher {
    async fn dispatch(&self, job: &QueuedJob) -> Result<(), DispatchError> {
        self.queue.enqueue(job).await?;
        tracing::info!(job_id = %job.job_id, "Job enqueued");
        Ok(())
    }
}

/// Spawn a detached `worker run-job` process per job.
///
/// The child gets its own process group and its output goes to
/// `<log_dir>/job_<id>.log`; the API never waits on it.
pub struct ProcessDispatcher {
    worker_bin: PathBuf,
    log_dir: PathBuf,
}

impl ProcessDispatcher {
    pub fn new(worker_bin: PathBuf, log_dir: PathBuf) -> Self {
        Self { worker_bin, log_dir }
    }

    /// Arguments passed to the worker binary for `job`.
    pub fn worker_args(job: &QueuedJob) -> Vec<String> {
        let mut args = vec![
            "run-job".to_string(),
            "--job-id".to_string(),
            job.job_id.to_string(),
            "--payload".to_string(),
            job.payload_path.display().to_string(),
        ];
        if let MusicChoice::Fixed(category) = job.music {
            args.push("--music".to_string());
            args.push(category.to_string());
        }
        args
    }
}

#[async_trait]
impl Dispatcher for ProcessDispatcher {
    async fn dispatch(&self, job: &QueuedJob) -> Result<(), DispatchError> {
        tokio::fs::create_dir_all(&self.log_dir)
            .await
            .map_err(DispatchError::Spawn)?;
        let log_path = self.log_dir.join(format!("job_{}.log", job.job_id));
        let log = tokio::fs::File::create(&log_path)
            .await
            .map_err(DispatchError::Spawn)?;
        let stderr = log.try_clone().await.map_err(DispatchError::Spawn)?;
        let stdout = log.into_std().await;
        let stderr = stderr.into_std().await;

        let mut cmd = tokio::process::Command::new(&self.worker_bin);
        cmd.args(Self::worker_args(job))
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(false);

        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(DispatchError::Spawn)?;

        tracing::info!(
            job_id = %job.job_id,
            pid = child.id(),
            log = %log_path.display(),
            "Worker process started"
        );

        // Dropping the handle detaches the child; tokio reaps it when it exits.
        drop(child);
        Ok(())
    }
}

/// Run jobs on tokio tasks inside the current process.
///
/// Intended for embedding and tests; production deployments use one of the
/// process-isolated dispatchers above.
pub struct InProcessDispatcher {
    tx: mpsc::UnboundedSender<QueuedJob>,
}

impl InProcessDispatcher {
    /// Start the receiving loop. Each job runs on its own task.
    pub fn spawn(runner: Arc<JobRunner>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<QueuedJob>();
        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let runner = runner.clone();
                tokio::spawn(async move {
                    let _ = runner.run(&job).await;
                });
            }
            tracing::debug!("In-process dispatcher stopped");
        });
        (Self { tx }, handle)
    }
}

#[async_trait]
impl Dispatcher for InProcessDispatcher {
    async fn dispatch(&self, job: &QueuedJob) -> Result<(), DispatchError> {
        self.tx
            .send(job.clone())
            .map_err(|_| DispatchError::Closed)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Failed to enqueue job: {0}")]
    Queue(#[from] QueueError),

    #[error("Failed to start worker process: {0}")]
    Spawn(std::io::Error),

    #[error("Worker channel is closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::music::MusicCategory;
    use uuid::Uuid;

    #[test]
    fn test_worker_args_auto_music() {
        let job = QueuedJob {
            job_id: Uuid::nil(),
            payload_path: PathBuf::from("/state/payloads/p.json"),
            music: MusicChoice::Auto,
        };
        let args = ProcessDispatcher::worker_args(&job);
        assert_eq!(
            args,
            vec![
                "run-job",
                "--job-id",
                "00000000-0000-0000-0000-000000000000",
                "--payload",
                "/state/payloads/p.json"
            ]
        );
    }

    #[test]
    fn test_worker_args_fixed_music() {
        let job = QueuedJob {
            job_id: Uuid::nil(),
            payload_path: PathBuf::from("/p.json"),
            music: MusicChoice::Fixed(MusicCategory::Acoustic),
        };
        let args = ProcessDispatcher::worker_args(&job);
        assert_eq!(&args[args.len() - 2..], &["--music", "acoustic"]);
    }

    #[tokio::test]
    async fn test_missing_worker_binary_is_spawn_error() {
        let tmp = tempfile::tempdir().unwrap();
        let dispatcher = ProcessDispatcher::new(
            tmp.path().join("no-such-worker"),
            tmp.path().join("logs"),
        );
        let job = QueuedJob {
            job_id: Uuid::new_v4(),
            payload_path: tmp.path().join("p.json"),
            music: MusicChoice::Auto,
        };
        let err = dispatcher.dispatch(&job).await.unwrap_err();
        assert!(matches!(err, DispatchError::Spawn(_)));
    }
}
