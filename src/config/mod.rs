use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:8000"). Unused by worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Root of job records, staged payloads, workspaces and fallback artifacts.
    /// Must be shared between the API and its workers.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// PostgreSQL connection string. Job records go to `state_dir` when unset.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Redis connection string. When unset the API spawns one worker process per job.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Worker executable spawned per job. Defaults to `worker` next to the current binary.
    #[serde(default)]
    pub worker_bin: Option<PathBuf>,

    /// ffmpeg executable used for rendering
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Upper bound on a single render, in seconds
    #[serde(default = "default_render_timeout_secs")]
    pub render_timeout_secs: u64,

    /// Gemini API key for AI music selection
    #[serde(default)]
    pub gemini_api_key: Option<String>,

    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    /// Cloudinary credentials; upload is disabled unless all three are set.
    #[serde(default)]
    pub cloudinary_cloud_name: Option<String>,
    #[serde(default)]
    pub cloudinary_api_key: Option<String>,
    #[serde(default)]
    pub cloudinary_api_secret: Option<String>,

    /// Cloudinary folder for uploaded videos
    #[serde(default = "default_cloudinary_folder")]
    pub cloudinary_folder: String,

    /// Request body limit in bytes (base64 photos are large)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Cloudinary account settings, present only when fully configured.
#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub folder: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_state_dir() -> PathBuf {
    std::env::temp_dir().join("memento-booth")
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_render_timeout_secs() -> u64 {
    900
}

fn default_gemini_model() -> String {
    "gemini-2.5-flash-lite".to_string()
}

fn default_cloudinary_folder() -> String {
    "auto_vlogs".to_string()
}

fn default_max_body_bytes() -> usize {
    64 * 1024 * 1024
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn cloudinary(&self) -> Option<CloudinaryConfig> {
        match (
            &self.cloudinary_cloud_name,
            &self.cloudinary_api_key,
            &self.cloudinary_api_secret,
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret))
                if !cloud_name.is_empty() && !api_key.is_empty() && !api_secret.is_empty() =>
            {
                Some(CloudinaryConfig {
                    cloud_name: cloud_name.clone(),
                    api_key: api_key.clone(),
                    api_secret: api_secret.clone(),
                    folder: self.cloudinary_folder.clone(),
                })
            }
            _ => None,
        }
    }

    /// Resolve the worker executable for per-job process dispatch.
    pub fn worker_executable(&self) -> std::io::Result<PathBuf> {
        if let Some(path) = &self.worker_bin {
            return Ok(path.clone());
        }
        let current = std::env::current_exe()?;
        let dir = current.parent().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "executable has no parent directory")
        })?;
        Ok(dir.join(format!("worker{}", std::env::consts::EXE_SUFFIX)))
    }
}
