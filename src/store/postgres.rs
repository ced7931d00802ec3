use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use std::time::Duration;
use uuid::Uuid;

use super::{JobStore, StoreError};
use crate::models::job::{Job, JobResult, JobStatus};

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

/// Job records in the `booth_jobs` table.
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_job(row: &sqlx::postgres::PgRow) -> Result<Job, StoreError> {
        let status_str: String = row.try_get("status")?;
        let status = JobStatus::parse(&status_str)
            .ok_or_else(|| StoreError::Invalid(format!("unknown status '{}'", status_str)))?;

        let result: Option<serde_json::Value> = row.try_get("result")?;
        let result: Option<JobResult> = result.map(serde_json::from_value).transpose()?;

        Ok(Job {
            id: row.try_get("id")?,
            status,
            message: row.try_get("message")?,
            created_at: row.try_get("created_at")?,
            completed_at: row.try_get("completed_at")?,
            result,
            error: row.try_get("error")?,
        })
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, job: &Job) -> Result<(), StoreError> {
        let result = job.result.as_ref().map(serde_json::to_value).transpose()?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO booth_jobs (id, status, message, created_at, completed_at, result, error)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(job.id)
        .bind(job.status.as_str())
        .bind(&job.message)
        .bind(job.created_at)
        .bind(job.completed_at)
        .bind(result)
        .bind(&job.error)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists(job.id));
        }
        Ok(())
    }

    async fn load(&self, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, status, message, created_at, completed_at, result, error
            FROM booth_jobs
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_job).transpose()
    }

    async fn save(&self, job: &Job) -> Result<(), StoreError> {
        let result = job.result.as_ref().map(serde_json::to_value).transpose()?;

        let updated = sqlx::query(
            r#"
            UPDATE booth_jobs
            SET status = $1,
                message = $2,
                completed_at = $3,
                result = $4,
                error = $5,
                updated_at = NOW()
            WHERE id = $6
            "#,
        )
        .bind(job.status.as_str())
        .bind(&job.message)
        .bind(job.completed_at)
        .bind(result)
        .bind(&job.error)
        .bind(job.id)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::Missing(job.id));
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
