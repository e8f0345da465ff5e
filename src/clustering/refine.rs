use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::article::Article;
use crate::cache::{fingerprint, Cache};
use crate::clustering::precluster::SeedGroup;
use crate::clustering::types::StoryCluster;
use crate::clustering::MIN_CLUSTER_SIZE;
use crate::config::ClusterConfig;
use crate::error::ClusterError;
use crate::llm::backend::ArticleBrief;
use crate::llm::client::BoundedClient;
use crate::TARGET_PIPELINE;

/// Refines seed groups into named clusters through the bounded client,
/// then makes one recovery pass over articles no returned cluster
/// covered.
///
/// Large seeds are split into overlapping chunks so a single call never
/// carries an unbounded payload. Chunk calls run sequentially with a
/// pacing sleep regardless of success; rate limits must be respected
/// even at the cost of pipeline latency.
///
/// A rate limit during seed refinement is fatal to this stage. A rate
/// limit during uncovered recovery only stops the recovery loop: the
/// clusters found so far survive. Any other per-chunk failure is logged
/// and skipped.
pub async fn refine_seed_groups(
    articles: &[Article],
    seeds: &[SeedGroup],
    articles_by_id: &HashMap<String, &Article>,
    client: &BoundedClient,
    cache: &dyn Cache,
    config: &ClusterConfig,
) -> Result<Vec<StoryCluster>, ClusterError> {
    let mut clusters = Vec::new();

    for seed in seeds {
        let briefs = briefs_for(&seed.article_ids, articles_by_id);
        for chunk in overlapping_chunks(
            &briefs,
            config.refine_chunk_size,
            config.refine_chunk_overlap,
        ) {
            match refine_chunk(chunk, client, cache, config).await {
                Ok(mut found) => clusters.append(&mut found),
                Err(err) if err.is_rate_limit() => return Err(ClusterError::RateLimited),
                Err(err) => {
                    warn!(
                        target: TARGET_PIPELINE,
                        "skipping chunk of seed '{}': {err}", seed.title
                    );
                }
            }
            sleep(Duration::from_millis(config.refine_chunk_delay_ms)).await;
        }
    }

    let covered: HashSet<&str> = clusters
        .iter()
        .flat_map(|c| c.article_ids.iter().map(String::as_str))
        .collect();
    let uncovered: Vec<ArticleBrief> = articles
        .iter()
        .filter(|a| !covered.contains(a.id.as_str()))
        .map(ArticleBrief::from_article)
        .collect();

    if !uncovered.is_empty() {
        info!(
            target: TARGET_PIPELINE,
            "{} uncovered articles after seed refinement", uncovered.len()
        );
    }

    for chunk in uncovered.chunks(config.uncovered_chunk_size.max(1)) {
        match refine_chunk(chunk, client, cache, config).await {
            Ok(mut found) => clusters.append(&mut found),
            Err(err) if err.is_rate_limit() => {
                warn!(
                    target: TARGET_PIPELINE,
                    "rate limited during uncovered recovery, keeping {} clusters",
                    clusters.len()
                );
                break;
            }
            Err(err) => {
                warn!(target: TARGET_PIPELINE, "skipping uncovered chunk: {err}");
            }
        }
        sleep(Duration::from_millis(config.refine_chunk_delay_ms)).await;
    }

    Ok(clusters)
}

/// One refine round trip, memoized by the sorted-id fingerprint of the
/// chunk.
async fn refine_chunk(
    chunk: &[ArticleBrief],
    client: &BoundedClient,
    cache: &dyn Cache,
    config: &ClusterConfig,
) -> Result<Vec<StoryCluster>, ClusterError> {
    if chunk.len() < MIN_CLUSTER_SIZE {
        return Ok(Vec::new());
    }

    let ids: Vec<String> = chunk.iter().map(|b| b.id.clone()).collect();
    let key = format!("refine:{}", fingerprint(&ids));

    if let Some(value) = cache.get(&key) {
        if let Ok(cached) = serde_json::from_value(value) {
            debug!(target: TARGET_PIPELINE, "refine cache hit for {} articles", chunk.len());
            return Ok(accept_refined(cached, chunk));
        }
    }

    let refined = client.refine(chunk).await?;
    if let Ok(value) = serde_json::to_value(&refined) {
        cache.set(&key, value, config.cache_ttl_seconds);
    }
    Ok(accept_refined(refined, chunk))
}

/// Validates refine output against the submitted chunk: ids must come
/// from the chunk, duplicates collapse, and clusters below the minimum
/// size are dropped.
fn accept_refined(
    refined: Vec<crate::llm::backend::RefinedCluster>,
    chunk: &[ArticleBrief],
) -> Vec<StoryCluster> {
    let known: HashSet<&str> = chunk.iter().map(|b| b.id.as_str()).collect();

    refined
        .into_iter()
        .filter_map(|candidate| {
            let ids: Vec<String> = candidate
                .article_ids
                .into_iter()
                .filter(|id| known.contains(id.as_str()))
                .collect();
            let cluster = StoryCluster::new(candidate.cluster_title, ids);
            (cluster.len() >= MIN_CLUSTER_SIZE).then_some(cluster)
        })
        .collect()
}

fn briefs_for(ids: &[String], articles_by_id: &HashMap<String, &Article>) -> Vec<ArticleBrief> {
    ids.iter()
        .filter_map(|id| articles_by_id.get(id))
        .map(|article| ArticleBrief::from_article(article))
        .collect()
}

/// Splits a slice into chunks of `size` where consecutive chunks share
/// `overlap` trailing/leading elements, so clusters straddling a chunk
/// boundary can still be recovered.
fn overlapping_chunks<T>(items: &[T], size: usize, overlap: usize) -> Vec<&[T]> {
    let size = size.max(MIN_CLUSTER_SIZE);
    let overlap = overlap.min(size - 1);

    if items.len() <= size {
        return vec![items];
    }

    let step = size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < items.len() {
        let end = (start + size).min(items.len());
        chunks.push(&items[start..end]);
        if end == items.len() {
            break;
        }
        start += step;
    }
    chunks
}
