use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::article::Article;

/// Severity assessment attached to a ranked cluster. Levels run 0
/// (Other) through 5 (War/Conflict).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Severity {
    pub level: u8,
    pub label: String,
    #[serde(default)]
    pub reasons: Vec<String>,
}

impl Default for Severity {
    fn default() -> Self {
        Self {
            level: 0,
            label: "Other".to_string(),
            reasons: Vec::new(),
        }
    }
}

/// A group of articles believed to describe one real-world event.
///
/// Created ephemeral-per-run, mutated in place through the
/// merge/split/expand chain, finalized by enrichment and scoring.
/// `article_ids` is the full membership in canonical display order and
/// never contains duplicates; `articles` is the capped display list
/// populated during enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryCluster {
    pub cluster_title: String,
    pub article_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub articles: Vec<Article>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl StoryCluster {
    /// Creates a cluster from a title and member ids, dropping duplicate
    /// ids while preserving first-seen order.
    pub fn new(cluster_title: impl Into<String>, article_ids: Vec<String>) -> Self {
        let mut seen = HashSet::new();
        let article_ids = article_ids
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();
        Self {
            cluster_title: cluster_title.into(),
            article_ids,
            articles: Vec::new(),
            summary: None,
            image_urls: Vec::new(),
            severity: None,
            score: None,
        }
    }

    /// Absorbs another cluster's membership: the result is the exact
    /// union of both id sets, keeping this cluster's order first.
    pub fn absorb_ids(&mut self, other: &StoryCluster) {
        let existing: HashSet<&str> = self.article_ids.iter().map(String::as_str).collect();
        let added: Vec<String> = other
            .article_ids
            .iter()
            .filter(|id| !existing.contains(id.as_str()))
            .cloned()
            .collect();
        self.article_ids.extend(added);
    }

    pub fn len(&self) -> usize {
        self.article_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.article_ids.is_empty()
    }
}

/// Final pipeline outcome. When `rate_limited` is set the cluster list
/// is empty and the caller is expected to fall back to showing
/// ungrouped articles.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterOutcome {
    pub clusters: Vec<StoryCluster>,
    pub rate_limited: bool,
}
