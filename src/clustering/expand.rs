use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::article::Article;
use crate::clustering::types::StoryCluster;
use crate::config::ClusterConfig;
use crate::vectorizer::{self, TfIdfVectorizer};
use crate::TARGET_PIPELINE;

/// Upper bound on the expansion recency window.
const MAX_WINDOW_HOURS: i64 = 168;

/// Grows each cluster toward nearby non-member articles.
///
/// The cluster centroid is built over the full-corpus TF-IDF space, not
/// a per-cluster one. Candidates must match the cluster's dominant
/// category (when strict matching is on), fall inside the recency window
/// measured from the newest member, and meet the similarity threshold.
/// Additions are made in descending similarity order up to the cap.
pub fn expand_clusters(
    clusters: &mut [StoryCluster],
    articles: &[Article],
    vectorizer: &TfIdfVectorizer,
    config: &ClusterConfig,
) {
    let articles_by_id: HashMap<&str, &Article> =
        articles.iter().map(|a| (a.id.as_str(), a)).collect();
    let window_hours = config.expand_window_hours.clamp(1, MAX_WINDOW_HOURS);

    for cluster in clusters.iter_mut() {
        let members: HashSet<&str> = cluster.article_ids.iter().map(String::as_str).collect();

        let mut centroid = HashMap::new();
        for id in &cluster.article_ids {
            if let Some(vector) = vectorizer.vector(id) {
                vectorizer::add_into(&mut centroid, vector);
            }
        }
        if centroid.is_empty() {
            continue;
        }

        let Some(newest) = newest_member(cluster, &articles_by_id) else {
            continue;
        };
        let dominant = dominant_category(cluster, &articles_by_id);

        let mut candidates: Vec<(f64, &Article)> = articles
            .iter()
            .filter(|a| !members.contains(a.id.as_str()))
            .filter(|a| {
                !config.expand_category_strict
                    || dominant.is_empty()
                    || a.category.eq_ignore_ascii_case(&dominant)
            })
            .filter(|a| {
                let hours = newest
                    .signed_duration_since(a.published_at)
                    .num_hours()
                    .abs();
                hours <= window_hours
            })
            .filter_map(|a| {
                vectorizer
                    .vector(&a.id)
                    .map(|v| (vectorizer::centroid_similarity(v, &centroid), a))
            })
            .filter(|(sim, _)| *sim >= config.expand_sim_threshold)
            .collect();

        candidates.sort_by(|x, y| y.0.partial_cmp(&x.0).unwrap_or(Ordering::Equal));

        for (sim, article) in candidates.into_iter().take(config.expand_max_add) {
            debug!(
                target: TARGET_PIPELINE,
                "expanding '{}' with article {} (sim {sim:.3})",
                cluster.cluster_title, article.id
            );
            cluster.article_ids.push(article.id.clone());
        }
    }
}

fn newest_member(
    cluster: &StoryCluster,
    articles_by_id: &HashMap<&str, &Article>,
) -> Option<DateTime<Utc>> {
    cluster
        .article_ids
        .iter()
        .filter_map(|id| articles_by_id.get(id.as_str()))
        .map(|a| a.published_at)
        .max()
}

/// Most common member category; ties resolve to the earliest member's
/// category so the result stays deterministic.
fn dominant_category(cluster: &StoryCluster, articles_by_id: &HashMap<&str, &Article>) -> String {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for id in &cluster.article_ids {
        let Some(article) = articles_by_id.get(id.as_str()) else {
            continue;
        };
        let category = article.category.to_lowercase();
        if category.is_empty() {
            continue;
        }
        match counts.iter_mut().find(|(c, _)| *c == category) {
            Some((_, n)) => *n += 1,
            None => counts.push((category, 1)),
        }
    }
    counts
        .into_iter()
        .max_by_key(|(_, n)| *n)
        .map(|(c, _)| c)
        .unwrap_or_default()
}
