use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

/// Background music moods, backed by royalty-free Bensound tracks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, EnumIter, AsRefStr,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum MusicCategory {
    Upbeat,
    Calm,
    Cinematic,
    Corporate,
    Asian,
    Acoustic,
    Electronic,
}

impl MusicCategory {
    pub const DEFAULT: MusicCategory = MusicCategory::Upbeat;

    pub fn display_name(&self) -> &'static str {
        match self {
            MusicCategory::Upbeat => "Upbeat",
            MusicCategory::Calm => "Calm",
            MusicCategory::Cinematic => "Cinematic",
            MusicCategory::Corporate => "Corporate",
            MusicCategory::Asian => "Asian",
            MusicCategory::Acoustic => "Acoustic",
            MusicCategory::Electronic => "Electronic",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            MusicCategory::Upbeat => "Happy, energetic, fun",
            MusicCategory::Calm => "Peaceful, relaxing, gentle",
            MusicCategory::Cinematic => "Epic, dramatic, powerful",
            MusicCategory::Corporate => "Professional, motivational",
            MusicCategory::Asian => "Traditional Asian influences",
            MusicCategory::Acoustic => "Folk, guitar, organic",
            MusicCategory::Electronic => "Modern, digital, energetic",
        }
    }

    /// Longer hint used when asking the vision model to pick a mood.
    pub fn prompt_hint(&self) -> &'static str {
        match self {
            MusicCategory::Upbeat => "parties, celebrations, joyful moments",
            MusicCategory::Calm => "nature, meditation, quiet moments",
            MusicCategory::Cinematic => "landscapes, achievements, storytelling",
            MusicCategory::Corporate => "business, presentations, modern",
            MusicCategory::Asian => "Asian culture, temples, festivals",
            MusicCategory::Acoustic => "authentic, intimate, personal",
            MusicCategory::Electronic => "tech, urban, contemporary",
        }
    }

    /// Candidate track URLs, tried in order.
    pub fn track_urls(&self) -> &'static [&'static str] {
        match self {
            MusicCategory::Upbeat => &[
                "https://www.bensound.com/bensound-music/bensound-ukulele.mp3",
                "https://www.bensound.com/bensound-music/bensound-sunny.mp3",
                "https://www.bensound.com/bensound-music/bensound-happyrock.mp3",
            ],
            MusicCategory::Calm => &[
                "https://www.bensound.com/bensound-music/bensound-relaxing.mp3",
                "https://www.bensound.com/bensound-music/bensound-slowmotion.mp3",
                "https://www.bensound.com/bensound-music/bensound-memories.mp3",
            ],
            MusicCategory::Cinematic => &[
                "https://www.bensound.com/bensound-music/bensound-epic.mp3",
                "https://www.bensound.com/bensound-music/bensound-rumble.mp3",
                "https://www.bensound.com/bensound-music/bensound-actionable.mp3",
            ],
            MusicCategory::Corporate => &[
                "https://www.bensound.com/bensound-music/bensound-creativeminds.mp3",
                "https://www.bensound.com/bensound-music/bensound-betterdays.mp3",
                "https://www.bensound.com/bensound-music/bensound-inspire.mp3",
            ],
            MusicCategory::Asian => &[
                "https://www.bensound.com/bensound-music/bensound-tokyo.mp3",
                "https://www.bensound.com/bensound-music/bensound-oriental.mp3",
            ],
            MusicCategory::Acoustic => &[
                "https://www.bensound.com/bensound-music/bensound-acoustic.mp3",
                "https://www.bensound.com/bensound-music/bensound-folkround.mp3",
            ],
            MusicCategory::Electronic => &[
                "https://www.bensound.com/bensound-music/bensound-evolution.mp3",
                "https://www.bensound.com/bensound-music/bensound-energy.mp3",
            ],
        }
    }
}

/// Music requested by the client: a fixed mood, or let the vision model decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "mode", content = "category")]
pub enum MusicChoice {
    #[default]
    Auto,
    Fixed(MusicCategory),
}

impl MusicChoice {
    /// Parse the optional request option. `None`, empty and `"auto"` mean [`MusicChoice::Auto`].
    pub fn from_option(value: Option<&str>) -> Result<Self, strum::ParseError> {
        match value.map(str::trim) {
            None | Some("") => Ok(MusicChoice::Auto),
            Some(v) if v.eq_ignore_ascii_case("auto") => Ok(MusicChoice::Auto),
            Some(v) => MusicCategory::from_str(v).map(MusicChoice::Fixed),
        }
    }
}

/// One entry of `GET /api/auto-vlog/music-categories`.
#[derive(Debug, Serialize)]
pub struct CategoryInfo {
    pub id: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct CategoryListResponse {
    pub categories: Vec<CategoryInfo>,
}

impl CategoryListResponse {
    pub fn catalogue() -> Self {
        let mut categories = vec![CategoryInfo {
            id: "auto".to_string(),
            name: "AI Auto-Select".to_string(),
            description: "Let AI analyze your photos and pick the best music".to_string(),
        }];
        categories.extend(MusicCategory::iter().map(|c| CategoryInfo {
            id: c.to_string(),
            name: c.display_name().to_string(),
            description: c.description().to_string(),
        }));
        Self { categories }
    }
}
