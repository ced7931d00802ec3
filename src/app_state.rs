use std::sync::Arc;

use crate::services::{jobs::JobService, queue::JobQueue};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<JobService>,
    /// Present when jobs are handed off through Redis.
    pub queue: Option<Arc<JobQueue>>,
}

impl AppState {
    pub fn new(jobs: JobService, queue: Option<Arc<JobQueue>>) -> Self {
        Self {
            jobs: Arc::new(jobs),
            queue,
        }
    }
}
