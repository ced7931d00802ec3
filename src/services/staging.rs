use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// Per-job scratch space under the shared state directory.
///
/// Every path is derived from the job id, so concurrent jobs never collide.
///
/// ```text
/// <root>/payloads/job_<id>_images.json   staged request images
/// <root>/work/<id>/input                 decoded photos
/// <root>/work/<id>/output                rendered video, music
/// <root>/artifacts/<id>.mp4              videos kept after a failed upload
/// ```
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

/// Input and output directories of one job.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: PathBuf,
    pub input: PathBuf,
    pub output: PathBuf,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn payload_path(&self, job_id: Uuid) -> PathBuf {
        self.root
            .join("payloads")
            .join(format!("job_{}_images.json", job_id))
    }

    pub fn workspace_dir(&self, job_id: Uuid) -> PathBuf {
        self.root.join("work").join(job_id.to_string())
    }

    pub fn artifact_path(&self, job_id: Uuid) -> PathBuf {
        self.root.join("artifacts").join(format!("{}.mp4", job_id))
    }

    /// Stage the request images so the worker can pick them up by path.
    pub async fn write_payload(&self, job_id: Uuid, images: &[String]) -> Result<PathBuf, StagingError> {
        let path = self.payload_path(job_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, serde_json::to_vec(images)?).await?;
        Ok(path)
    }

    pub async fn read_payload(&self, path: &Path) -> Result<Vec<String>, StagingError> {
        let bytes = fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn prepare_workspace(&self, job_id: Uuid) -> Result<Workspace, StagingError> {
        let root = self.workspace_dir(job_id);
        let input = root.join("input");
        let output = root.join("output");
        fs::create_dir_all(&input).await?;
        fs::create_dir_all(&output).await?;
        Ok(Workspace { root, input, output })
    }

    /// Move a rendered video out of the workspace so cleanup keeps it.
    pub async fn preserve_artifact(&self, job_id: Uuid, video: &Path) -> Result<PathBuf, StagingError> {
        let dest = self.artifact_path(job_id);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        if fs::rename(video, &dest).await.is_err() {
            // rename fails across filesystems
            fs::copy(video, &dest).await?;
            fs::remove_file(video).await?;
        }
        Ok(dest)
    }

    /// Remove the staged payload and the workspace of a job. Safe to call twice.
    pub async fn cleanup(&self, job_id: Uuid, payload: &Path) -> Result<(), StagingError> {
        let mut first_err = None;

        if let Err(e) = fs::remove_file(payload).await {
            if e.kind() != ErrorKind::NotFound {
                first_err.get_or_insert(e);
            }
        }
        if let Err(e) = fs::remove_dir_all(self.workspace_dir(job_id)).await {
            if e.kind() != ErrorKind::NotFound {
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("Staging I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed staged payload: {0}")]
    Payload(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_payload_roundtrip_and_cleanup() {
        let tmp = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(tmp.path());
        let job_id = Uuid::new_v4();

        let images = vec!["aGVsbG8=".to_string(), "d29ybGQ=".to_string()];
        let path = staging.write_payload(job_id, &images).await.unwrap();
        assert_eq!(staging.read_payload(&path).await.unwrap(), images);

        let ws = staging.prepare_workspace(job_id).await.unwrap();
        fs::write(ws.input.join("image_000.jpg"), b"x").await.unwrap();

        staging.cleanup(job_id, &path).await.unwrap();
        assert!(!path.exists());
        assert!(!ws.root.exists());

        // second cleanup is a no-op
        staging.cleanup(job_id, &path).await.unwrap();
    }

    #[tokio::test]
    async fn test_paths_are_unique_per_job() {
        let staging = StagingArea::new("/state");
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_ne!(staging.payload_path(a), staging.payload_path(b));
        assert_ne!(staging.workspace_dir(a), staging.workspace_dir(b));
        assert_ne!(staging.artifact_path(a), staging.artifact_path(b));
    }

    #[tokio::test]
    async fn test_preserved_artifact_survives_cleanup() {
        let tmp = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(tmp.path());
        let job_id = Uuid::new_v4();
        let payload = staging.write_payload(job_id, &["aGk=".to_string()]).await.unwrap();

        let ws = staging.prepare_workspace(job_id).await.unwrap();
        let video = ws.output.join("auto_vlog.mp4");
        fs::write(&video, b"mp4").await.unwrap();

        let kept = staging.preserve_artifact(job_id, &video).await.unwrap();
        staging.cleanup(job_id, &payload).await.unwrap();

        assert_eq!(fs::read(&kept).await.unwrap(), b"mp4");
        assert!(!ws.root.exists());
    }
}
