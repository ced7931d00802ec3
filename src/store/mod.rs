//! Persisted job records, shared between the API process and its workers.
//!
//! The API creates a record; after hand-off only the worker writes it.
//! Records are read and written whole; concurrent writers resolve as last
//! writer wins.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::models::job::Job;

pub mod file;
pub mod postgres;

pub use file::FileJobStore;
pub use postgres::PgJobStore;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a brand new record. Fails if the id was ever issued before.
    async fn create(&self, job: &Job) -> Result<(), StoreError>;

    /// Fresh snapshot of a record, `None` for unknown ids.
    async fn load(&self, job_id: Uuid) -> Result<Option<Job>, StoreError>;

    /// Overwrite an existing record as a whole.
    async fn save(&self, job: &Job) -> Result<(), StoreError>;

    /// Check the backend is reachable (for health checks).
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Pick the backend from configuration: PostgreSQL when `DATABASE_URL` is
/// set, otherwise JSON files under `STATE_DIR`.
pub async fn from_config(config: &AppConfig) -> Result<Arc<dyn JobStore>, StoreError> {
    match &config.database_url {
        Some(url) => {
            tracing::info!("Using PostgreSQL job store");
            let pool = postgres::init_pool(url).await?;
            postgres::run_migrations(&pool).await?;
            Ok(Arc::new(PgJobStore::new(pool)))
        }
        None => {
            tracing::info!(state_dir = %config.state_dir.display(), "Using file job store");
            Ok(Arc::new(FileJobStore::open(&config.state_dir).await?))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Job {0} already exists")]
    AlreadyExists(Uuid),

    #[error("Job {0} not found")]
    Missing(Uuid),

    #[error("Job store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt job record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid job record: {0}")]
    Invalid(String),
}
