use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::models::music::MusicCategory;

/// A source of music-mood suggestions for a set of photos.
#[async_trait]
pub trait CategoryAdvisor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn suggest(&self, images: &[PathBuf]) -> Result<MusicCategory, AdvisorError>;
}

/// Ordered chain of advisors; the first successful suggestion wins.
#[derive(Clone)]
pub struct MusicSelector {
    advisors: Vec<Arc<dyn CategoryAdvisor>>,
    fallback: MusicCategory,
}

impl MusicSelector {
    pub fn new(advisors: Vec<Arc<dyn CategoryAdvisor>>) -> Self {
        Self {
            advisors,
            fallback: MusicCategory::DEFAULT,
        }
    }

    pub async fn select(&self, images: &[PathBuf]) -> MusicCategory {
        for advisor in &self.advisors {
            match advisor.suggest(images).await {
                Ok(category) => {
                    tracing::info!(advisor = advisor.name(), category = %category, "Music category suggested");
                    return category;
                }
                Err(e) => {
                    tracing::warn!(advisor = advisor.name(), error = %e, "Music advisor failed, trying next");
                }
            }
        }
        tracing::info!(category = %self.fallback, "Using default music category");
        self.fallback
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AdvisorError {
    #[error("No readable images to analyze")]
    NoImages,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Advisor API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Unrecognized suggestion '{0}'")]
    Unrecognized(String),
}

/// Downloads background tracks, trying each candidate URL in order.
#[derive(Clone)]
pub struct MusicLibrary {
    http: reqwest::Client,
}

impl MusicLibrary {
    pub fn new() -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { http })
    }

    /// Download a track for `category` to `dest`.
    ///
    /// Returns `None` when every candidate failed; the video is then rendered
    /// without audio.
    pub async fn fetch(&self, category: MusicCategory, dest: &Path) -> Option<PathBuf> {
        self.fetch_from(category.track_urls(), dest).await
    }

    pub async fn fetch_from(&self, urls: &[&str], dest: &Path) -> Option<PathBuf> {
        if tokio::fs::metadata(dest).await.is_ok() {
            return Some(dest.to_path_buf());
        }
        for url in urls {
            match self.download(url, dest).await {
                Ok(()) => {
                    tracing::info!(url = %url, "Background music downloaded");
                    return Some(dest.to_path_buf());
                }
                Err(e) => tracing::warn!(url = %url, error = %e, "Music download failed"),
            }
        }
        tracing::warn!("Could not download music, video will have no audio");
        None
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(DownloadError::Empty);
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, &bytes).await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
enum DownloadError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("empty response body")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed(Result<MusicCategory, ()>, Arc<AtomicUsize>);

    #[async_trait]
    impl CategoryAdvisor for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn suggest(&self, _images: &[PathBuf]) -> Result<MusicCategory, AdvisorError> {
            self.1.fetch_add(1, Ordering::SeqCst);
            self.0.map_err(|_| AdvisorError::NoImages)
        }
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let calls = Arc::new(AtomicUsize::new(0));
        let selector = MusicSelector::new(vec![
            Arc::new(Fixed(Err(()), calls.clone())),
            Arc::new(Fixed(Ok(MusicCategory::Calm), calls.clone())),
            Arc::new(Fixed(Ok(MusicCategory::Electronic), calls.clone())),
        ]);
        assert_eq!(selector.select(&[]).await, MusicCategory::Calm);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_falls_back_to_default() {
        let calls = Arc::new(AtomicUsize::new(0));
        let selector = MusicSelector::new(vec![Arc::new(Fixed(Err(()), calls.clone()))]);
        assert_eq!(selector.select(&[]).await, MusicCategory::Upbeat);

        let empty = MusicSelector::new(Vec::new());
        assert_eq!(empty.select(&[]).await, MusicCategory::Upbeat);
    }

    #[tokio::test]
    async fn test_existing_track_is_reused() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("background_music.mp3");
        tokio::fs::write(&dest, b"id3").await.unwrap();

        let library = MusicLibrary::new().unwrap();
        assert_eq!(library.fetch_from(&[], &dest).await, Some(dest.clone()));
    }

    #[tokio::test]
    async fn test_all_candidates_failing_gives_none() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("background_music.mp3");
        let library = MusicLibrary::new().unwrap();
        // unroutable scheme fails fast without network
        let got = library.fetch_from(&["notaurl://x", "also not a url"], &dest).await;
        assert!(got.is_none());
        assert!(!dest.exists());
    }
}
