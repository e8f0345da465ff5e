use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::article::Article;
use crate::clustering::types::Severity;
use crate::error::ClusterError;
use crate::llm::{parse, prompts};
use crate::TARGET_LLM_REQUEST;

const DEFAULT_API_BASE: &str = "https://api.groq.com/openai/v1";
const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

/// Compact article representation submitted to the remote model.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleBrief {
    pub id: String,
    pub title: String,
    pub description: String,
    pub published_at: DateTime<Utc>,
    pub source: String,
    pub category: String,
}

impl ArticleBrief {
    pub fn from_article(article: &Article) -> Self {
        Self {
            id: article.id.clone(),
            title: article.title.clone(),
            description: article.description.clone(),
            published_at: article.published_at,
            source: article.source.name.clone(),
            category: article.category.clone(),
        }
    }
}

/// A named cluster proposal returned by the refine call. Also the cached
/// form of refinement results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefinedCluster {
    pub cluster_title: String,
    pub article_ids: Vec<String>,
}

/// One cluster digest submitted to the semantic-merge call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterBrief {
    pub index: usize,
    pub title: String,
    pub sample_titles: Vec<String>,
}

/// Group proposal from the semantic-merge call: indices into the
/// submitted brief list.
#[derive(Debug, Clone, Deserialize)]
pub struct MergeGroup {
    #[serde(default)]
    pub title: String,
    pub indices: Vec<usize>,
}

/// The remote refine/summarize/assess surface.
///
/// Implementations degrade malformed responses to empty results instead
/// of erroring; transport and quota failures surface as `ClusterError`
/// and are classified by the shared rate-limit classifier.
#[async_trait]
pub trait RefineBackend: Send + Sync {
    async fn refine(&self, articles: &[ArticleBrief]) -> Result<Vec<RefinedCluster>, ClusterError>;

    async fn summarize(&self, articles: &[ArticleBrief]) -> Result<String, ClusterError>;

    async fn assess_severity(
        &self,
        title: &str,
        member_titles: &[String],
    ) -> Result<Severity, ClusterError>;

    async fn merge_similar(&self, briefs: &[ClusterBrief])
        -> Result<Vec<MergeGroup>, ClusterError>;
}

/// Chat-completions backend for Groq's OpenAI-compatible API.
pub struct GroqBackend {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl GroqBackend {
    pub fn new(api_key: String, api_base: Option<String>, model: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }

    /// One chat completion round trip, returning the raw assistant text.
    async fn chat(&self, prompt: &str) -> Result<String, ClusterError> {
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": 0.2,
        });

        debug!(target: TARGET_LLM_REQUEST, "sending chat request ({} chars)", prompt.len());

        let response = self
            .http
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ClusterError::upstream(e.status().map(|s| s.as_u16()), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClusterError::upstream(Some(status.as_u16()), message));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| ClusterError::Malformed(e.to_string()))?;

        value["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ClusterError::Malformed("missing completion content".to_string()))
    }
}

#[async_trait]
impl RefineBackend for GroqBackend {
    async fn refine(&self, articles: &[ArticleBrief]) -> Result<Vec<RefinedCluster>, ClusterError> {
        let payload =
            serde_json::to_string(articles).map_err(|e| ClusterError::Malformed(e.to_string()))?;
        let raw = self.chat(&prompts::refine_prompt(&payload)).await?;
        Ok(refined_clusters_from(&raw))
    }

    async fn summarize(&self, articles: &[ArticleBrief]) -> Result<String, ClusterError> {
        let payload =
            serde_json::to_string(articles).map_err(|e| ClusterError::Malformed(e.to_string()))?;
        let raw = self.chat(&prompts::summary_prompt(&payload)).await?;
        Ok(raw.trim().to_string())
    }

    async fn assess_severity(
        &self,
        title: &str,
        member_titles: &[String],
    ) -> Result<Severity, ClusterError> {
        let payload = serde_json::to_string(member_titles)
            .map_err(|e| ClusterError::Malformed(e.to_string()))?;
        let raw = self.chat(&prompts::severity_prompt(title, &payload)).await?;
        Ok(severity_from(&raw))
    }

    async fn merge_similar(
        &self,
        briefs: &[ClusterBrief],
    ) -> Result<Vec<MergeGroup>, ClusterError> {
        let payload =
            serde_json::to_string(briefs).map_err(|e| ClusterError::Malformed(e.to_string()))?;
        let raw = self.chat(&prompts::semantic_merge_prompt(&payload)).await?;
        Ok(merge_groups_from(&raw))
    }
}

/// Offline backend: echoes each submitted batch back as a single cluster
/// and leaves summaries and assessments empty, so the deterministic
/// stages do all the work.
pub struct PassthroughBackend;

#[async_trait]
impl RefineBackend for PassthroughBackend {
    async fn refine(&self, articles: &[ArticleBrief]) -> Result<Vec<RefinedCluster>, ClusterError> {
        match articles.first() {
            Some(first) => Ok(vec![RefinedCluster {
                cluster_title: first.title.clone(),
                article_ids: articles.iter().map(|a| a.id.clone()).collect(),
            }]),
            None => Ok(Vec::new()),
        }
    }

    async fn summarize(&self, _articles: &[ArticleBrief]) -> Result<String, ClusterError> {
        Ok(String::new())
    }

    async fn assess_severity(
        &self,
        _title: &str,
        _member_titles: &[String],
    ) -> Result<Severity, ClusterError> {
        Ok(Severity::default())
    }

    async fn merge_similar(
        &self,
        _briefs: &[ClusterBrief],
    ) -> Result<Vec<MergeGroup>, ClusterError> {
        Ok(Vec::new())
    }
}

/// Decodes refine output, dropping elements that do not fit the schema.
/// Unrecoverable output degrades to an empty list, never an error.
fn refined_clusters_from(raw: &str) -> Vec<RefinedCluster> {
    let Some(value) = parse::extract_json_array(raw) else {
        warn!(target: TARGET_LLM_REQUEST, "refine response had no recoverable JSON array");
        return Vec::new();
    };

    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Decodes a severity assessment, clamping the level into 0..=5.
/// Unrecoverable output degrades to the default (level 0) assessment.
fn severity_from(raw: &str) -> Severity {
    let Some(value) = parse::extract_json_object(raw) else {
        warn!(target: TARGET_LLM_REQUEST, "severity response had no recoverable JSON object");
        return Severity::default();
    };

    let level = value["level"].as_u64().unwrap_or(0).min(5) as u8;
    let label = value["label"]
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or("Other")
        .to_string();
    let reasons = value["reasons"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|r| r.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    Severity {
        level,
        label,
        reasons,
    }
}

/// Decodes semantic-merge output. Unrecoverable output degrades to no
/// merge proposals.
fn merge_groups_from(raw: &str) -> Vec<MergeGroup> {
    let Some(value) = parse::extract_json_array(raw) else {
        return Vec::new();
    };

    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}
