use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

use super::{JobStore, StoreError};
use crate::models::job::Job;

/// One JSON file per job under `<state_dir>/jobs`.
///
/// Every write lands in a private temp file first and is then linked or
/// renamed into place, so a reader in another process sees either the old or
/// the new record, never a partial one.
pub struct FileJobStore {
    dir: PathBuf,
}

impl FileJobStore {
    pub async fn open(state_dir: &Path) -> Result<Self, StoreError> {
        let dir = state_dir.join("jobs");
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn record_path(&self, job_id: Uuid) -> PathBuf {
        self.dir.join(format!("job_{}.json", job_id))
    }

    async fn write_temp(&self, job: &Job) -> Result<PathBuf, StoreError> {
        let tmp = self
            .dir
            .join(format!(".job_{}.{}.tmp", job.id, Uuid::new_v4().simple()));
        let payload = serde_json::to_vec_pretty(job)?;
        fs::write(&tmp, payload).await?;
        Ok(tmp)
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn create(&self, job: &Job) -> Result<(), StoreError> {
        let tmp = self.write_temp(job).await?;
        // hard_link refuses to replace an existing record
        let linked = fs::hard_link(&tmp, self.record_path(job.id)).await;
        let _ = fs::remove_file(&tmp).await;
        match linked {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(StoreError::AlreadyExists(job.id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn load(&self, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        match fs::read(self.record_path(job_id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, job: &Job) -> Result<(), StoreError> {
        let path = self.record_path(job.id);
        if fs::metadata(&path).await.is_err() {
            return Err(StoreError::Missing(job.id));
        }
        let tmp = self.write_temp(job).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let meta = fs::metadata(&self.dir).await?;
        if !meta.is_dir() {
            return Err(StoreError::Invalid(format!(
                "{} is not a directory",
                self.dir.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::JobStatus;

    #[tokio::test]
    async fn test_create_load_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileJobStore::open(tmp.path()).await.unwrap();

        let job = Job::new();
        store.create(&job).await.unwrap();

        let loaded = store.load(job.id).await.unwrap().unwrap();
        assert_eq!(loaded, job);
    }

    #[tokio::test]
    async fn test_create_refuses_reused_id() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileJobStore::open(tmp.path()).await.unwrap();

        let job = Job::new();
        store.create(&job).await.unwrap();
        let err = store.create(&job).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(id) if id == job.id));
    }

    #[tokio::test]
    async fn test_unknown_id_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileJobStore::open(tmp.path()).await.unwrap();
        assert!(store.load(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_overwrites_whole_record() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileJobStore::open(tmp.path()).await.unwrap();

        let mut job = Job::new();
        store.create(&job).await.unwrap();
        job.start("Loading images...").unwrap();
        store.save(&job).await.unwrap();

        let loaded = store.load(job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Processing);
        assert_eq!(loaded.message, "Loading images...");

        // no temp files left behind
        let mut entries = fs::read_dir(tmp.path().join("jobs")).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names, vec![format!("job_{}.json", job.id)]);
    }

    #[tokio::test]
    async fn test_save_unknown_job_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileJobStore::open(tmp.path()).await.unwrap();
        let job = Job::new();
        assert!(matches!(
            store.save(&job).await.unwrap_err(),
            StoreError::Missing(_)
        ));
    }
}
