//! Test helpers: stub collaborators and an in-process job harness

#![allow(dead_code)]

use async_trait::async_trait;
use base64::Engine;
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;
use tokio::time::sleep;
use uuid::Uuid;

use memento_booth::models::job::{Job, JobStatus};
use memento_booth::models::music::MusicCategory;
use memento_booth::services::dispatch::{DispatchError, Dispatcher, InProcessDispatcher};
use memento_booth::services::generator::{
    GeneratedVideo, GenerationError, GenerationRequest, VideoGenerator,
};
use memento_booth::services::jobs::JobService;
use memento_booth::services::queue::QueuedJob;
use memento_booth::services::runner::JobRunner;
use memento_booth::services::staging::StagingArea;
use memento_booth::services::uploader::{ArtifactUploader, UploadError, UploadedArtifact};
use memento_booth::store::{FileJobStore, JobStore, StoreError};

/// A small PNG photo, base64-encoded the way booth clients send it.
pub fn png_base64(width: u32, height: u32) -> String {
    let img = RgbImage::from_pixel(width, height, Rgb([200, 120, 40]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    base64::engine::general_purpose::STANDARD.encode(buf.into_inner())
}

pub fn png_data_url(width: u32, height: u32) -> String {
    format!("data:image/png;base64,{}", png_base64(width, height))
}

/// What the stub generator should do.
#[derive(Clone, Copy, PartialEq)]
pub enum GenerateBehavior {
    Succeed,
    Fail,
}

/// Writes a fake video instead of rendering.
pub struct StubGenerator {
    behavior: GenerateBehavior,
    /// When set, generation blocks until notified.
    pub gate: Option<Arc<Notify>>,
    pub seen_images: Mutex<Vec<PathBuf>>,
}

impl StubGenerator {
    pub fn new(behavior: GenerateBehavior) -> Self {
        Self {
            behavior,
            gate: None,
            seen_images: Mutex::new(Vec::new()),
        }
    }

    pub fn gated(behavior: GenerateBehavior, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(behavior)
        }
    }
}

#[async_trait]
impl VideoGenerator for StubGenerator {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<GeneratedVideo, GenerationError> {
        self.seen_images
            .lock()
            .unwrap()
            .extend(request.images.iter().cloned());

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        if self.behavior == GenerateBehavior::Fail {
            return Err(GenerationError::Other("encoder exploded".to_string()));
        }

        for image in request.images {
            assert!(image.exists(), "decoded image missing: {}", image.display());
        }

        let path = request.output_dir.join("auto_vlog.mp4");
        tokio::fs::write(&path, b"\x00\x00\x00\x18ftypmp42").await.unwrap();
        let clips = if request.images.len() == 1 { 2 } else { request.images.len() };
        Ok(GeneratedVideo {
            path,
            duration_secs: 2.5 * clips as f64,
            width: 64,
            height: 48,
            clips_count: clips,
            music_category: Some(MusicCategory::Upbeat),
        })
    }
}

/// Pretends to be the CDN.
pub struct StubUploader {
    pub fail: bool,
}

#[async_trait]
impl ArtifactUploader for StubUploader {
    async fn upload(&self, path: &Path, public_id: &str) -> Result<UploadedArtifact, UploadError> {
        assert!(path.exists(), "uploading a missing file");
        if self.fail {
            return Err(UploadError::Rejected {
                status: 503,
                message: "CDN unavailable".to_string(),
            });
        }
        Ok(UploadedArtifact {
            url: format!("https://cdn.example.test/video/upload/{}.mp4", public_id),
            public_id: format!("auto_vlogs/{}", public_id),
            bytes: Some(12),
        })
    }
}

/// Wraps a store and records every status it is asked to persist.
pub struct RecordingStore {
    inner: FileJobStore,
    pub history: Mutex<Vec<(Uuid, JobStatus)>>,
}

impl RecordingStore {
    pub fn statuses(&self, job_id: Uuid) -> Vec<JobStatus> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == job_id)
            .map(|(_, s)| *s)
            .collect()
    }
}

#[async_trait]
impl JobStore for RecordingStore {
    async fn create(&self, job: &Job) -> Result<(), StoreError> {
        self.inner.create(job).await?;
        self.history.lock().unwrap().push((job.id, job.status));
        Ok(())
    }

    async fn load(&self, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        self.inner.load(job_id).await
    }

    async fn save(&self, job: &Job) -> Result<(), StoreError> {
        self.inner.save(job).await?;
        self.history.lock().unwrap().push((job.id, job.status));
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}

/// Holds dispatched jobs until released, so tests can observe `queued`.
pub struct HeldDispatcher {
    inner: InProcessDispatcher,
    held: Mutex<Vec<QueuedJob>>,
}

impl HeldDispatcher {
    pub async fn release(&self) {
        let jobs: Vec<QueuedJob> = std::mem::take(&mut *self.held.lock().unwrap());
        for job in jobs {
            self.inner.dispatch(&job).await.unwrap();
        }
    }
}

#[async_trait]
impl Dispatcher for HeldDispatcher {
    async fn dispatch(&self, job: &QueuedJob) -> Result<(), DispatchError> {
        self.held.lock().unwrap().push(job.clone());
        Ok(())
    }
}

/// Everything needed to run jobs end to end inside one test.
pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<RecordingStore>,
    pub staging: StagingArea,
    pub service: Arc<JobService>,
    pub runner: Arc<JobRunner>,
    pub held: Option<Arc<HeldDispatcher>>,
}

pub struct HarnessOptions {
    pub generator: Arc<dyn VideoGenerator>,
    pub uploader: Option<Arc<dyn ArtifactUploader>>,
    /// Keep dispatched jobs back until `Harness::release`.
    pub hold: bool,
}

impl HarnessOptions {
    pub fn new(generator: StubGenerator) -> Self {
        Self {
            generator: Arc::new(generator),
            uploader: Some(Arc::new(StubUploader { fail: false })),
            hold: false,
        }
    }

    pub fn uploader(mut self, uploader: Option<StubUploader>) -> Self {
        self.uploader = uploader.map(|u| Arc::new(u) as Arc<dyn ArtifactUploader>);
        self
    }

    pub fn hold(mut self) -> Self {
        self.hold = true;
        self
    }
}

impl Harness {
    pub async fn start(options: HarnessOptions) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(RecordingStore {
            inner: FileJobStore::open(dir.path()).await.unwrap(),
            history: Mutex::new(Vec::new()),
        });
        let staging = StagingArea::new(dir.path());

        let runner = Arc::new(JobRunner::new(
            store.clone(),
            staging.clone(),
            options.generator,
            options.uploader,
        ));
        let (in_process, _handle) = InProcessDispatcher::spawn(runner.clone());

        let (dispatcher, held): (Arc<dyn Dispatcher>, _) = if options.hold {
            let held = Arc::new(HeldDispatcher {
                inner: in_process,
                held: Mutex::new(Vec::new()),
            });
            (held.clone(), Some(held))
        } else {
            (Arc::new(in_process), None)
        };

        let service = Arc::new(JobService::new(store.clone(), staging.clone(), dispatcher));

        Self {
            dir,
            store,
            staging,
            service,
            runner,
            held,
        }
    }

    pub async fn release(&self) {
        if let Some(held) = &self.held {
            held.release().await;
        }
    }

    /// Poll until the job is terminal (with timeout)
    pub async fn wait_for_terminal(&self, job_id: Uuid) -> Job {
        self.wait_for(job_id, |job| job.status.is_terminal()).await
    }

    pub async fn wait_for(&self, job_id: Uuid, done: impl Fn(&Job) -> bool) -> Job {
        for _ in 0..200 {
            let job = self.service.status(job_id).await.unwrap();
            if done(&job) {
                return job;
            }
            sleep(Duration::from_millis(25)).await;
        }
        panic!("job {} did not reach the expected state within 5 seconds", job_id);
    }

    pub fn payload_path(&self, job_id: Uuid) -> PathBuf {
        self.staging.payload_path(job_id)
    }

    pub fn workspace_dir(&self, job_id: Uuid) -> PathBuf {
        self.staging.workspace_dir(job_id)
    }
}
