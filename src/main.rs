use axum::extract::DefaultBodyLimit;
use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use memento_booth::app_state::AppState;
use memento_booth::config::AppConfig;
use memento_booth::routes;
use memento_booth::services::{
    dispatch::{Dispatcher, ProcessDispatcher, QueueDispatcher},
    jobs::JobService,
    queue::JobQueue,
    staging::StagingArea,
};
use memento_booth::store;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing memento-booth server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    metrics::describe_counter!("booth_jobs_submitted_total", "Jobs accepted and handed to a worker");
    metrics::describe_counter!("booth_jobs_rejected_total", "Submissions rejected as invalid");
    metrics::describe_counter!("booth_jobs_launch_failed_total", "Jobs whose worker could not be started");
    metrics::describe_gauge!("booth_queue_depth", "Jobs waiting in the Redis queue");

    let job_store = store::from_config(&config)
        .await
        .expect("Failed to initialize job store");

    let staging = StagingArea::new(&config.state_dir);

    // Hand-off: Redis queue for long-running workers, otherwise one process per job
    let (dispatcher, queue): (Arc<dyn Dispatcher>, Option<Arc<JobQueue>>) = match &config.redis_url {
        Some(url) => {
            tracing::info!("Dispatching jobs through Redis");
            let queue = Arc::new(JobQueue::new(url).expect("Failed to initialize job queue"));
            (Arc::new(QueueDispatcher::new(queue.clone())), Some(queue))
        }
        None => {
            let worker_bin = config
                .worker_executable()
                .expect("Failed to locate worker executable");
            tracing::info!(worker = %worker_bin.display(), "Dispatching jobs to worker processes");
            (
                Arc::new(ProcessDispatcher::new(worker_bin, config.state_dir.join("logs"))),
                None,
            )
        }
    };

    let jobs = JobService::new(job_store, staging, dispatcher);
    let state = AppState::new(jobs, queue);

    let app = Router::new()
        .merge(routes::api_router(state))
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        // base64 photo batches exceed axum's 2 MB default
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
