use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::config::CloudinaryConfig;

/// A video delivered to remote storage.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedArtifact {
    pub url: String,
    pub public_id: String,
    pub bytes: Option<u64>,
}

/// Remote-upload collaborator: local video in, public URL out.
#[async_trait]
pub trait ArtifactUploader: Send + Sync {
    async fn upload(&self, path: &Path, public_id: &str) -> Result<UploadedArtifact, UploadError>;
}

/// Signed uploads to the Cloudinary video API.
pub struct CloudinaryUploader {
    http: Client,
    config: CloudinaryConfig,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
    bytes: Option<u64>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl CloudinaryUploader {
    pub fn new(config: CloudinaryConfig) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "https://api.cloudinary.com/v1_1/{}/video/upload",
            self.config.cloud_name
        )
    }
}

/// Cloudinary request signature: parameters sorted by key, joined as
/// `k=v&k=v`, with the API secret appended, hashed with SHA-256.
///
/// The product environment must be set to SHA-256 signatures.
pub fn sign(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().filter(|(_, v)| !v.is_empty()).collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl ArtifactUploader for CloudinaryUploader {
    async fn upload(&self, path: &Path, public_id: &str) -> Result<UploadedArtifact, UploadError> {
        let data = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "auto_vlog.mp4".to_string());

        let timestamp = chrono::Utc::now().timestamp().to_string();
        let params = [
            ("folder", self.config.folder.clone()),
            ("overwrite", "true".to_string()),
            ("public_id", public_id.to_string()),
            ("timestamp", timestamp.clone()),
        ];
        let signature = sign(&params, &self.config.api_secret);

        let mut form = Form::new()
            .part(
                "file",
                Part::bytes(data).file_name(file_name).mime_str("video/mp4")?,
            )
            .text("api_key", self.config.api_key.clone())
            .text("signature", signature);
        for (key, value) in params {
            form = form.text(key, value);
        }

        tracing::info!(public_id = %public_id, folder = %self.config.folder, "Uploading video to Cloudinary");

        let response = self
            .http
            .post(self.endpoint())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let uploaded: UploadResponse = response.json().await?;
        Ok(UploadedArtifact {
            url: uploaded.secure_url,
            public_id: uploaded.public_id,
            bytes: uploaded.bytes,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Could not read video: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upload rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
}
