use clap::{Parser, Subcommand};
use memento_booth::{
    config::AppConfig,
    models::music::{MusicCategory, MusicChoice},
    services::{
        advisor::GeminiAdvisor,
        generator::{FfmpegSlideshow, VideoGenerator},
        music::{CategoryAdvisor, MusicLibrary, MusicSelector},
        queue::{JobQueue, QueuedJob},
        runner::JobRunner,
        staging::StagingArea,
        uploader::{ArtifactUploader, CloudinaryUploader},
    },
    store,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const POLL_INTERVAL_MS: u64 = 1000; // 1 second

#[derive(Parser)]
#[command(name = "worker", about = "Memento booth video generation worker")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Consume jobs from the Redis queue until stopped (default)
    Listen,
    /// Run a single job handed over by the API, then exit
    RunJob {
        #[arg(long)]
        job_id: Uuid,
        /// Staged images file written by the API
        #[arg(long)]
        payload: PathBuf,
        /// Music category; the vision model picks one when omitted
        #[arg(long)]
        music: Option<MusicCategory>,
    },
}

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    let runner = build_runner(&config).await;

    match cli.command.unwrap_or(Command::Listen) {
        Command::RunJob {
            job_id,
            payload,
            music,
        } => {
            tracing::info!(job_id = %job_id, payload = %payload.display(), "Worker started for job");
            let job = QueuedJob {
                job_id,
                payload_path: payload,
                music: music.map(MusicChoice::Fixed).unwrap_or_default(),
            };
            if runner.run(&job).await.is_err() {
                std::process::exit(1);
            }
        }
        Command::Listen => {
            let redis_url = config
                .redis_url
                .as_deref()
                .expect("REDIS_URL is required for `worker listen`");
            let queue = JobQueue::new(redis_url).expect("Failed to initialize job queue");
            listen(&queue, &runner).await;
        }
    }
}

async fn build_runner(config: &AppConfig) -> JobRunner {
    let job_store = store::from_config(config)
        .await
        .expect("Failed to initialize job store");

    let mut advisors: Vec<Arc<dyn CategoryAdvisor>> = Vec::new();
    match &config.gemini_api_key {
        Some(key) if !key.is_empty() => {
            tracing::info!(model = %config.gemini_model, "Gemini music selection enabled");
            let gemini = GeminiAdvisor::new(key.clone(), config.gemini_model.clone())
                .expect("Failed to initialize Gemini client");
            advisors.push(Arc::new(gemini));
        }
        _ => tracing::warn!("No Gemini API key, music defaults to upbeat"),
    }

    let generator: Arc<dyn VideoGenerator> = Arc::new(FfmpegSlideshow::new(
        config.ffmpeg_path.clone(),
        Duration::from_secs(config.render_timeout_secs),
        MusicSelector::new(advisors),
        MusicLibrary::new().expect("Failed to initialize HTTP client"),
    ));

    let uploader: Option<Arc<dyn ArtifactUploader>> = match config.cloudinary() {
        Some(cloudinary) => Some(Arc::new(
            CloudinaryUploader::new(cloudinary).expect("Failed to initialize Cloudinary client"),
        )),
        None => {
            tracing::warn!("Cloudinary not configured, videos stay on local disk");
            None
        }
    };

    JobRunner::new(
        job_store,
        StagingArea::new(&config.state_dir),
        generator,
        uploader,
    )
}

/// Redis consumer loop.
async fn listen(queue: &JobQueue, runner: &JobRunner) {
    tracing::info!("Worker ready, starting job processing loop");

    loop {
        match queue.dequeue().await {
            Ok(Some(job)) => {
                tracing::info!(job_id = %job.job_id, "Processing job");
                // terminal state (or a store failure) is already recorded and logged
                let _ = runner.run(&job).await;
                if let Err(e) = queue.complete(&job).await {
                    tracing::error!(job_id = %job.job_id, error = %e, "Failed to acknowledge job");
                }
            }
            Ok(None) => {
                tracing::trace!("No jobs available, sleeping");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Error dequeuing job, will retry");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
        }
    }
}
