use std::collections::HashMap;
use tracing::debug;

use crate::article::Article;
use crate::vectorizer::{self, TfIdfVectorizer};
use crate::TARGET_PIPELINE;

/// A deterministic seed group produced before any remote refinement.
#[derive(Debug)]
pub struct SeedGroup {
    /// Title of the most recent member, used as the representative label.
    pub title: String,
    /// Member ids in assignment order (most recent first).
    pub article_ids: Vec<String>,
    /// Element-wise sum of member term vectors. Deliberately not
    /// re-normalized as members accumulate.
    centroid: HashMap<String, f64>,
}

/// Parameters for one seed pass. The coherence splitter re-runs the same
/// algorithm at a stricter threshold.
#[derive(Debug, Clone, Copy)]
pub struct PreclusterParams {
    pub threshold: f64,
    pub min_size: usize,
    pub max_group: usize,
}

/// Groups articles into seed clusters with a single nearest-centroid
/// pass.
///
/// Articles are visited most-recent-first and joined to their
/// best-matching existing seed, so iteration order is part of the
/// contract: changing it changes which seed an article lands in. The
/// scan is O(articles x seeds), not O(n^2) over article pairs: each
/// article is compared against seed centroids only, and the seed count
/// stays small in practice.
pub fn precluster(
    articles: &[Article],
    vectorizer: &TfIdfVectorizer,
    params: PreclusterParams,
) -> Vec<SeedGroup> {
    let mut ordered: Vec<&Article> = articles.iter().collect();
    ordered.sort_by(|a, b| b.published_at.cmp(&a.published_at));

    let mut seeds: Vec<SeedGroup> = Vec::new();

    for article in ordered {
        let Some(vector) = vectorizer.vector(&article.id) else {
            continue;
        };

        let mut best: Option<(usize, f64)> = None;
        for (idx, seed) in seeds.iter().enumerate() {
            let sim = vectorizer::centroid_similarity(vector, &seed.centroid);
            if best.map_or(true, |(_, score)| sim > score) {
                best = Some((idx, sim));
            }
        }

        match best {
            Some((idx, sim))
                if sim >= params.threshold && seeds[idx].article_ids.len() < params.max_group =>
            {
                debug!(
                    target: TARGET_PIPELINE,
                    "article {} joins seed '{}' (sim {:.3})",
                    article.id, seeds[idx].title, sim
                );
                vectorizer::add_into(&mut seeds[idx].centroid, vector);
                seeds[idx].article_ids.push(article.id.clone());
            }
            _ => {
                let mut centroid = HashMap::new();
                vectorizer::add_into(&mut centroid, vector);
                seeds.push(SeedGroup {
                    title: article.title.clone(),
                    article_ids: vec![article.id.clone()],
                    centroid,
                });
            }
        }
    }

    seeds.retain(|seed| seed.article_ids.len() >= params.min_size);
    seeds
}
