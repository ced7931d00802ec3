use async_trait::async_trait;
use base64::Engine;
use image::ImageFormat;
use reqwest::Client;
use serde::Deserialize;
use std::io::Cursor;
use std::path::PathBuf;
use std::str::FromStr;
use strsim::jaro_winkler;
use strum::IntoEnumIterator;
use tokio::task::JoinError;

use crate::models::music::MusicCategory;
use crate::services::music::{AdvisorError, CategoryAdvisor};

/// Photos sent to the model per request.
const MAX_ANALYZED_IMAGES: usize = 3;

/// Longest side of a photo sent to the model.
const ANALYSIS_MAX_SIDE: u32 = 1024;

/// Minimum similarity for mapping a free-form answer onto a category.
const MATCH_THRESHOLD: f64 = 0.85;

/// Gemini vision model picking a music mood from the photos.
pub struct GeminiAdvisor {
    http: Client,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

impl GeminiAdvisor {
    pub fn new(api_key: String, model: String) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            api_key,
            model,
        })
    }

    fn prompt(count: usize) -> String {
        let mut prompt = format!(
            "Analyze these {} image(s) and suggest the most suitable background music category.\n\n\
             Consider the subject matter, mood and atmosphere, cultural context and setting.\n\n\
             Available music categories:\n",
            count
        );
        for category in MusicCategory::iter() {
            prompt.push_str(&format!(
                "- {}: {} ({})\n",
                category,
                category.description(),
                category.prompt_hint()
            ));
        }
        prompt.push_str(
            "\nRespond with ONLY ONE category name from the list above. No explanations, just the category.",
        );
        prompt
    }

    /// Downscale and JPEG-encode a photo for upload.
    fn encode_for_analysis(path: PathBuf) -> Option<String> {
        let img = match image::open(&path) {
            Ok(img) => img,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Could not load image for analysis");
                return None;
            }
        };
        let img = if img.width().max(img.height()) > ANALYSIS_MAX_SIDE {
            img.thumbnail(ANALYSIS_MAX_SIDE, ANALYSIS_MAX_SIDE)
        } else {
            img
        };
        let mut buf = Cursor::new(Vec::new());
        img.to_rgb8().write_to(&mut buf, ImageFormat::Jpeg).ok()?;
        Some(base64::engine::general_purpose::STANDARD.encode(buf.into_inner()))
    }
}

/// Encoded photos from the blocking preparation task; a crashed task counts as none.
fn prepared_images(joined: Result<Vec<String>, JoinError>) -> Vec<String> {
    joined.unwrap_or_else(|e| {
        tracing::error!(error = %e, "Image preparation for analysis panicked");
        Vec::new()
    })
}

/// Map the model's free-text answer onto a category.
pub fn interpret_suggestion(text: &str) -> Option<MusicCategory> {
    let cleaned: String = text
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphabetic() || c.is_whitespace())
        .collect();
    let cleaned = cleaned.trim();

    if let Ok(category) = MusicCategory::from_str(cleaned) {
        return Some(category);
    }

    // "Category: calm" and similar chatty answers
    if let Some(category) = cleaned
        .split_whitespace()
        .find_map(|word| MusicCategory::from_str(word).ok())
    {
        return Some(category);
    }

    MusicCategory::iter()
        .map(|c| (c, jaro_winkler(cleaned, c.as_ref())))
        .filter(|(_, score)| *score >= MATCH_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(c, _)| c)
}

#[async_trait]
impl CategoryAdvisor for GeminiAdvisor {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn suggest(&self, images: &[PathBuf]) -> Result<MusicCategory, AdvisorError> {
        let selected: Vec<PathBuf> = images.iter().take(MAX_ANALYZED_IMAGES).cloned().collect();
        let encoded = prepared_images(
            tokio::task::spawn_blocking(move || {
                selected
                    .into_iter()
                    .filter_map(Self::encode_for_analysis)
                    .collect::<Vec<_>>()
            })
            .await,
        );

        if encoded.is_empty() {
            return Err(AdvisorError::NoImages);
        }

        let mut parts = vec![serde_json::json!({ "text": Self::prompt(encoded.len()) })];
        parts.extend(encoded.iter().map(|data| {
            serde_json::json!({
                "inline_data": { "mime_type": "image/jpeg", "data": data }
            })
        }));

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        );

        tracing::info!(images = encoded.len(), model = %self.model, "Analyzing images with Gemini");

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&serde_json::json!({ "contents": [{ "parts": parts }] }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdvisorError::Api {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let body: GenerateResponse = response.json().await?;
        let text: String = body
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join(" ");

        interpret_suggestion(&text).ok_or(AdvisorError::Unrecognized(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_answers() {
        assert_eq!(interpret_suggestion("calm"), Some(MusicCategory::Calm));
        assert_eq!(interpret_suggestion("  Cinematic\n"), Some(MusicCategory::Cinematic));
        assert_eq!(interpret_suggestion("asian."), Some(MusicCategory::Asian));
    }

    #[test]
    fn test_chatty_answer() {
        assert_eq!(
            interpret_suggestion("Category: acoustic"),
            Some(MusicCategory::Acoustic)
        );
    }

    #[test]
    fn test_near_miss_spelling() {
        assert_eq!(interpret_suggestion("electronik"), Some(MusicCategory::Electronic));
    }

    #[test]
    fn test_unrelated_answer() {
        assert_eq!(interpret_suggestion("jazz"), None);
        assert_eq!(interpret_suggestion(""), None);
    }

    #[tokio::test]
    async fn test_crashed_preparation_yields_no_images() {
        let joined = tokio::task::spawn_blocking(|| -> Vec<String> { panic!("decoder blew up") }).await;
        assert!(joined.is_err());
        assert!(prepared_images(joined).is_empty());

        let ok = prepared_images(Ok(vec!["abc".to_string()]));
        assert_eq!(ok, vec!["abc".to_string()]);
    }

    #[test]
    fn test_prompt_lists_every_category() {
        let prompt = GeminiAdvisor::prompt(2);
        assert!(prompt.starts_with("Analyze these 2 image(s)"));
        for category in MusicCategory::iter() {
            assert!(prompt.contains(&format!("- {}:", category)));
        }
    }
}
