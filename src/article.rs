use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Number of content characters included in the vectorized document text.
/// Article bodies repeat the lede heavily past this point.
const CONTENT_PREFIX_CHARS: usize = 500;

/// Image URL fragments that mark a stand-in graphic rather than real art.
const PLACEHOLDER_MARKERS: &[&str] = &["placeholder", "no-image", "noimage", "missing", "spacer"];

/// The outlet an article came from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Source {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
}

/// A single ingested news article. Immutable input to the pipeline; the
/// only mutation allowed anywhere is image-URL backfill performed by the
/// feed layer before clustering starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_to_image: Option<String>,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub source: Source,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_height: Option<u32>,
}

impl Article {
    /// Text used for vectorization: title, description, and a bounded
    /// prefix of the content.
    pub fn document_text(&self) -> String {
        let prefix: String = self.content.chars().take(CONTENT_PREFIX_CHARS).collect();
        format!("{} {} {}", self.title, self.description, prefix)
    }

    /// Lowercased hostname of the article URL, falling back to the source
    /// name when the URL does not parse.
    pub fn domain(&self) -> String {
        Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
            .unwrap_or_else(|| self.source.name.to_lowercase())
    }

    /// Whether the article carries a usable image URL rather than a
    /// placeholder graphic.
    pub fn has_real_image(&self) -> bool {
        match &self.url_to_image {
            Some(raw) => {
                let lower = raw.to_lowercase();
                lower.starts_with("http") && !PLACEHOLDER_MARKERS.iter().any(|m| lower.contains(m))
            }
            None => false,
        }
    }
}
