use axum::routing::{get, post};
use axum::Router;

use crate::app_state::AppState;

pub mod booth;
pub mod error;
pub mod health;
pub mod metrics;

/// Application routes with state applied. Middleware and `/metrics` are
/// added by the binary.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health_check))
        .route("/ping", get(health::ping))
        .route("/api/auto-vlog", post(booth::submit_auto_vlog))
        .route("/api/auto-vlog/status/{job_id}", get(booth::get_job_status))
        .route("/api/auto-vlog/result/{job_id}", get(booth::get_job_result))
        .route("/api/auto-vlog/music-categories", get(booth::music_categories))
        .with_state(state)
}
