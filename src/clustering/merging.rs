use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::article::Article;
use crate::clustering::types::StoryCluster;
use crate::config::ClusterConfig;
use crate::entities::extract_entities;
use crate::error::ClusterError;
use crate::llm::backend::ClusterBrief;
use crate::llm::client::BoundedClient;
use crate::vectorizer::{tokenize, TfIdfVectorizer};
use crate::TARGET_PIPELINE;

/// Number of member titles included in one semantic-merge brief.
const BRIEF_SAMPLE_TITLES: usize = 3;

/// Merges clusters whose member sets overlap strongly.
///
/// Jaccard similarity over article ids; the surviving cluster keeps the
/// longer of the two titles and the exact union of both id sets. O(n^2)
/// over the refined-cluster count, which stays small.
pub fn merge_by_id_overlap(clusters: Vec<StoryCluster>, threshold: f64) -> Vec<StoryCluster> {
    merge_pairwise(clusters, |base, other| {
        let sim = jaccard(
            &base.article_ids.iter().map(String::as_str).collect(),
            &other.article_ids.iter().map(String::as_str).collect(),
        );
        if sim >= threshold {
            debug!(
                target: TARGET_PIPELINE,
                "id-overlap merge '{}' <- '{}' ({sim:.2})",
                base.cluster_title, other.cluster_title
            );
            Some(MergeAction::KeepLongerTitle)
        } else {
            None
        }
    })
}

/// Merges clusters with near-identical titles.
///
/// Jaccard similarity over stopword-filtered title tokens, at a tighter
/// threshold than the id merge: titles are short, so matching wording
/// implies the same event.
pub fn merge_by_title(clusters: Vec<StoryCluster>, threshold: f64) -> Vec<StoryCluster> {
    let mut token_cache: HashMap<String, HashSet<String>> = HashMap::new();
    let mut title_tokens = |title: &str| -> HashSet<String> {
        token_cache
            .entry(title.to_string())
            .or_insert_with(|| tokenize(title).into_iter().collect())
            .clone()
    };

    merge_pairwise(clusters, |base, other| {
        let a = title_tokens(&base.cluster_title);
        let b = title_tokens(&other.cluster_title);
        let sim = jaccard(
            &a.iter().map(String::as_str).collect(),
            &b.iter().map(String::as_str).collect(),
        );
        if sim >= threshold {
            debug!(
                target: TARGET_PIPELINE,
                "title merge '{}' <- '{}' ({sim:.2})",
                base.cluster_title, other.cluster_title
            );
            Some(MergeAction::KeepLongerTitle)
        } else {
            None
        }
    })
}

/// Merges clusters that share named entities, gated by cross-cluster
/// text coherence.
///
/// Entity sets are computed once before the pass and are never
/// re-unioned into a surviving cluster: a merge must not inherit the
/// absorbed cluster's entities, otherwise cluster A absorbs B and then
/// improperly absorbs unrelated C through entities B brought in.
pub fn merge_by_entity(
    clusters: Vec<StoryCluster>,
    articles_by_id: &HashMap<String, &Article>,
    config: &ClusterConfig,
) -> Vec<StoryCluster> {
    if clusters.len() < 2 {
        return clusters;
    }

    let entity_sets: Vec<HashSet<String>> = clusters
        .iter()
        .map(|cluster| cluster_entities(cluster, articles_by_id, config))
        .collect();

    // One vector space over every article any cluster references, built
    // once for the whole pass.
    let referenced: Vec<Article> = {
        let mut seen = HashSet::new();
        clusters
            .iter()
            .flat_map(|c| c.article_ids.iter())
            .filter(|id| seen.insert(id.as_str()))
            .filter_map(|id| articles_by_id.get(id).map(|a| (*a).clone()))
            .collect()
    };
    let vectorizer = TfIdfVectorizer::build(&referenced);

    let mut consumed = vec![false; clusters.len()];
    let mut merged = Vec::with_capacity(clusters.len());

    for i in 0..clusters.len() {
        if consumed[i] {
            continue;
        }
        let mut base = clusters[i].clone();

        for j in (i + 1)..clusters.len() {
            if consumed[j] {
                continue;
            }

            // The base set stays frozen at its pre-pass value even after
            // the base absorbs other clusters.
            let shared = entity_sets[i].intersection(&entity_sets[j]).count();
            if shared < config.min_shared_entities {
                continue;
            }

            let coherence = cross_cluster_coherence(
                &base,
                &clusters[j],
                &vectorizer,
                config.coherence_sample_pairs,
            );
            if coherence < config.min_coherence {
                debug!(
                    target: TARGET_PIPELINE,
                    "entity merge blocked by coherence gate: '{}' / '{}' ({coherence:.3})",
                    base.cluster_title, clusters[j].cluster_title
                );
                continue;
            }

            info!(
                target: TARGET_PIPELINE,
                "entity merge '{}' <- '{}' ({shared} shared, coherence {coherence:.3})",
                base.cluster_title, clusters[j].cluster_title
            );
            base.absorb_ids(&clusters[j]);
            consumed[j] = true;
        }

        merged.push(base);
    }

    merged
}

/// Optional LLM-assisted merge for clusters the lexical passes missed.
/// Group proposals referencing unknown or already-consumed indices are
/// ignored.
pub async fn merge_semantic(
    clusters: Vec<StoryCluster>,
    articles_by_id: &HashMap<String, &Article>,
    client: &BoundedClient,
) -> Result<Vec<StoryCluster>, ClusterError> {
    if clusters.len() < 2 {
        return Ok(clusters);
    }

    let briefs: Vec<ClusterBrief> = clusters
        .iter()
        .enumerate()
        .map(|(index, cluster)| ClusterBrief {
            index,
            title: cluster.cluster_title.clone(),
            sample_titles: cluster
                .article_ids
                .iter()
                .take(BRIEF_SAMPLE_TITLES)
                .filter_map(|id| articles_by_id.get(id).map(|a| a.title.clone()))
                .collect(),
        })
        .collect();

    let groups = client.merge_similar(&briefs).await?;

    let mut consumed = vec![false; clusters.len()];
    let mut out = Vec::with_capacity(clusters.len());

    for group in groups {
        let mut seen = HashSet::new();
        let indices: Vec<usize> = group
            .indices
            .into_iter()
            .filter(|&idx| idx < clusters.len() && !consumed[idx] && seen.insert(idx))
            .collect();
        if indices.len() < 2 {
            continue;
        }

        let mut base = clusters[indices[0]].clone();
        for &idx in &indices[1..] {
            base.absorb_ids(&clusters[idx]);
        }
        for &idx in &indices {
            consumed[idx] = true;
        }
        if !group.title.trim().is_empty() {
            base.cluster_title = group.title;
        }
        info!(
            target: TARGET_PIPELINE,
            "semantic merge combined {} clusters into '{}'",
            indices.len(),
            base.cluster_title
        );
        out.push(base);
    }

    for (idx, cluster) in clusters.into_iter().enumerate() {
        if !consumed[idx] {
            out.push(cluster);
        }
    }
    Ok(out)
}

enum MergeAction {
    KeepLongerTitle,
}

/// Shared pairwise merge scan: each surviving cluster absorbs every
/// later cluster the decision function accepts. The base keeps growing
/// within the pass, so transitive unions are allowed here; only the
/// entity merge forbids them.
fn merge_pairwise<F>(clusters: Vec<StoryCluster>, mut decide: F) -> Vec<StoryCluster>
where
    F: FnMut(&StoryCluster, &StoryCluster) -> Option<MergeAction>,
{
    let mut consumed = vec![false; clusters.len()];
    let mut merged = Vec::with_capacity(clusters.len());

    for i in 0..clusters.len() {
        if consumed[i] {
            continue;
        }
        let mut base = clusters[i].clone();

        for j in (i + 1)..clusters.len() {
            if consumed[j] {
                continue;
            }
            match decide(&base, &clusters[j]) {
                Some(MergeAction::KeepLongerTitle) => {
                    if clusters[j].cluster_title.len() > base.cluster_title.len() {
                        base.cluster_title = clusters[j].cluster_title.clone();
                    }
                    base.absorb_ids(&clusters[j]);
                    consumed[j] = true;
                }
                None => {}
            }
        }

        merged.push(base);
    }

    merged
}

/// Entity set for a cluster: the cluster title plus a sample of member
/// titles, joined with sentence punctuation so each title keeps its own
/// sentence-initial word.
fn cluster_entities(
    cluster: &StoryCluster,
    articles_by_id: &HashMap<String, &Article>,
    config: &ClusterConfig,
) -> HashSet<String> {
    let mut text = cluster.cluster_title.clone();
    for id in cluster.article_ids.iter().take(config.entity_title_sample) {
        if let Some(article) = articles_by_id.get(id) {
            text.push_str(". ");
            text.push_str(&article.title);
        }
    }

    extract_entities(&text)
        .into_iter()
        .filter(|e| e.len() >= config.min_entity_length)
        .collect()
}

/// Average cosine over up to `max_pairs` cross-cluster article pairs,
/// sampled deterministically in member order.
fn cross_cluster_coherence(
    a: &StoryCluster,
    b: &StoryCluster,
    vectorizer: &TfIdfVectorizer,
    max_pairs: usize,
) -> f64 {
    let mut sims = Vec::new();
    'outer: for left in &a.article_ids {
        for right in &b.article_ids {
            sims.push(vectorizer.similarity(left, right));
            if sims.len() >= max_pairs {
                break 'outer;
            }
        }
    }

    if sims.is_empty() {
        return 0.0;
    }
    sims.iter().sum::<f64>() / sims.len() as f64
}

fn jaccard(a: &HashSet<&str>, b: &HashSet<&str>) -> f64 {
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::Source;
    use chrono::{Duration, Utc};

    fn article(id: &str, title: &str, description: &str) -> Article {
        Article {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            content: String::new(),
            url: format!("https://example.com/{id}"),
            url_to_image: None,
            published_at: Utc::now() - Duration::hours(1),
            source: Source::default(),
            category: "world".into(),
            image_width: None,
            image_height: None,
        }
    }

    fn by_id(articles: &[Article]) -> HashMap<String, &Article> {
        articles.iter().map(|a| (a.id.clone(), a)).collect()
    }

    fn cluster(title: &str, ids: &[&str]) -> StoryCluster {
        StoryCluster::new(title, ids.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn id_overlap_merge_produces_exact_union() {
        let clusters = vec![
            cluster("Fed decision", &["a", "b", "c"]),
            cluster("Fed raises interest rates", &["b", "c", "d"]),
        ];
        let merged = merge_by_id_overlap(clusters, 0.45);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].article_ids, vec!["a", "b", "c", "d"]);
        // Longer title wins.
        assert_eq!(merged[0].cluster_title, "Fed raises interest rates");
    }

    #[test]
    fn id_overlap_below_threshold_does_not_merge() {
        let clusters = vec![
            cluster("Fed decision", &["a", "b", "c", "d", "e"]),
            cluster("Other story", &["e", "f", "g", "h", "i"]),
        ];
        let merged = merge_by_id_overlap(clusters, 0.45);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn identical_titles_merge_with_disjoint_ids() {
        let clusters = vec![
            cluster("Winter Olympics", &["a", "b"]),
            cluster("Winter Olympics", &["c", "d"]),
        ];
        let merged = merge_by_title(clusters, 0.72);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].article_ids, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn unrelated_titles_do_not_merge() {
        let clusters = vec![
            cluster("Winter Olympics open in style", &["a", "b"]),
            cluster("Banking crisis deepens", &["c", "d"]),
        ];
        let merged = merge_by_title(clusters, 0.72);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn entity_merge_is_snowball_free() {
        // A and B share "geneva_accord" entities; B and C share
        // "trade_council"; A and C share nothing. A must absorb B without
        // inheriting B's entities and absorbing C.
        let articles = vec![
            article("a1", "Geneva Accord talks resume", "delegates meet on Geneva Accord terms"),
            article("a2", "Progress on Geneva Accord", "delegates meet on Geneva Accord terms"),
            article("b1", "Geneva Accord backed by Trade Council", "delegates meet on Geneva Accord terms"),
            article("b2", "Trade Council endorses Geneva Accord", "delegates meet on Geneva Accord terms"),
            article("c1", "Trade Council elects new chair", "a routine vote on leadership"),
            article("c2", "New chair for Trade Council", "a routine vote on leadership"),
        ];
        let lookup = by_id(&articles);

        let clusters = vec![
            cluster("Geneva Accord talks resume", &["a1", "a2"]),
            cluster("Trade Council endorses Geneva Accord", &["b1", "b2"]),
            cluster("Trade Council elects new chair", &["c1", "c2"]),
        ];

        let config = ClusterConfig {
            min_shared_entities: 1,
            min_coherence: 0.05,
            ..ClusterConfig::default()
        };
        let merged = merge_by_entity(clusters, &lookup, &config);

        assert_eq!(merged.len(), 2, "got {merged:#?}");
        let first = &merged[0];
        assert!(first.article_ids.contains(&"a1".to_string()));
        assert!(first.article_ids.contains(&"b1".to_string()));
        assert!(
            !first.article_ids.contains(&"c1".to_string()),
            "A must not absorb C through entities inherited from B"
        );
    }

    #[test]
    fn coherence_gate_blocks_shared_entity_merge() {
        // Both clusters mention Paris mid-sentence, but the stories have
        // no vocabulary in common.
        let articles = vec![
            article("p1", "Leaders arrive in Paris for climate summit", "emissions pledges dominate the climate agenda"),
            article("p2", "Climate summit opens in Paris", "emissions pledges dominate the climate agenda"),
            article("f1", "Designers flock to Paris fashion week", "runway shows and couture houses draw celebrities"),
            article("f2", "Fashion week begins in Paris", "runway shows and couture houses draw celebrities"),
        ];
        let lookup = by_id(&articles);

        let clusters = vec![
            cluster("Climate summit opens", &["p1", "p2"]),
            cluster("Fashion week begins", &["f1", "f2"]),
        ];

        let config = ClusterConfig {
            min_shared_entities: 1,
            min_coherence: 0.12,
            ..ClusterConfig::default()
        };
        let merged = merge_by_entity(clusters, &lookup, &config);
        assert_eq!(merged.len(), 2, "coherence gate should block the merge");
    }

    #[tokio::test]
    async fn semantic_merge_ignores_invalid_indices() {
        use crate::llm::backend::{MergeGroup, PassthroughBackend, RefineBackend};
        use async_trait::async_trait;

        struct ProposingBackend;

        #[async_trait]
        impl RefineBackend for ProposingBackend {
            async fn refine(
                &self,
                articles: &[crate::llm::backend::ArticleBrief],
            ) -> Result<Vec<crate::llm::backend::RefinedCluster>, ClusterError> {
                PassthroughBackend.refine(articles).await
            }

            async fn summarize(
                &self,
                _articles: &[crate::llm::backend::ArticleBrief],
            ) -> Result<String, ClusterError> {
                Ok(String::new())
            }

            async fn assess_severity(
                &self,
                _title: &str,
                _member_titles: &[String],
            ) -> Result<crate::clustering::types::Severity, ClusterError> {
                Ok(Default::default())
            }

            async fn merge_similar(
                &self,
                _briefs: &[ClusterBrief],
            ) -> Result<Vec<MergeGroup>, ClusterError> {
                Ok(vec![
                    MergeGroup {
                        title: "Merged story".into(),
                        indices: vec![0, 1, 99],
                    },
                    MergeGroup {
                        title: "Bogus".into(),
                        indices: vec![1],
                    },
                ])
            }
        }

        let articles = vec![
            article("a", "Fed raises rates", ""),
            article("b", "Rate hike lands", ""),
            article("c", "Volcano erupts", ""),
        ];
        let lookup = by_id(&articles);
        let clusters = vec![
            cluster("Fed raises rates", &["a", "b"]),
            cluster("Rate hike lands", &["a", "b"]),
            cluster("Volcano erupts", &["c", "a"]),
        ];

        let client = BoundedClient::new(Box::new(ProposingBackend), &ClusterConfig::default());
        let merged = merge_semantic(clusters, &lookup, &client).await.unwrap();

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].cluster_title, "Merged story");
        assert_eq!(merged[0].article_ids, vec!["a", "b"]);
    }
}
