use std::collections::HashMap;
use tracing::info;

use crate::article::Article;
use crate::clustering::precluster::{precluster, PreclusterParams};
use crate::clustering::types::StoryCluster;
use crate::config::ClusterConfig;
use crate::vectorizer::TfIdfVectorizer;
use crate::TARGET_PIPELINE;

/// Re-partitions clusters whose members do not hold together.
///
/// Each cluster's own articles are re-run through the seed pass at a
/// stricter threshold. Any sub-clusters found replace the original; when
/// the strict pass finds nothing usable, the original survives only if
/// it still meets the minimum size. The first sub-cluster keeps the
/// original cluster title, later ones take their representative member's
/// title.
pub fn split_incoherent(
    clusters: Vec<StoryCluster>,
    articles_by_id: &HashMap<String, &Article>,
    vectorizer: &TfIdfVectorizer,
    config: &ClusterConfig,
) -> Vec<StoryCluster> {
    let params = PreclusterParams {
        threshold: config.split_threshold,
        min_size: config.split_min_size,
        max_group: config.precluster_max_group,
    };

    let mut out = Vec::with_capacity(clusters.len());

    for cluster in clusters {
        let members: Vec<Article> = cluster
            .article_ids
            .iter()
            .filter_map(|id| articles_by_id.get(id).map(|a| (*a).clone()))
            .collect();

        let sub_groups = precluster(&members, vectorizer, params);

        if sub_groups.is_empty() {
            if cluster.article_ids.len() >= config.split_min_size {
                out.push(cluster);
            }
            continue;
        }

        if sub_groups.len() > 1 {
            info!(
                target: TARGET_PIPELINE,
                "split '{}' into {} sub-clusters",
                cluster.cluster_title,
                sub_groups.len()
            );
        }

        for (idx, group) in sub_groups.into_iter().enumerate() {
            let title = if idx == 0 {
                cluster.cluster_title.clone()
            } else {
                group.title.clone()
            };
            out.push(StoryCluster::new(title, group.article_ids));
        }
    }

    out
}
