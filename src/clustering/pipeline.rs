use chrono::Utc;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::article::Article;
use crate::cache::Cache;
use crate::clustering::enrich::{attach_summaries, enrich_cluster};
use crate::clustering::expand::expand_clusters;
use crate::clustering::merging::{
    merge_by_entity, merge_by_id_overlap, merge_by_title, merge_semantic,
};
use crate::clustering::precluster::{precluster, PreclusterParams};
use crate::clustering::refine::refine_seed_groups;
use crate::clustering::severity::{assign_severity, ranking_score};
use crate::clustering::split::split_incoherent;
use crate::clustering::types::{ClusterOutcome, StoryCluster};
use crate::clustering::MIN_CLUSTER_SIZE;
use crate::config::ClusterConfig;
use crate::error::ClusterError;
use crate::llm::backend::RefineBackend;
use crate::llm::client::BoundedClient;
use crate::vectorizer::TfIdfVectorizer;
use crate::TARGET_PIPELINE;

/// Pipeline stages in execution order, used for progress logging and
/// error attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineStage {
    Preclustering,
    Refining,
    Merging,
    Splitting,
    SemanticMerge,
    Expansion,
    Enriching,
    Scoring,
    Sorted,
}

/// Everything one clustering run needs: the flat config, the bounded
/// client around the remote backend, and the memoization cache.
pub struct ClusterPipeline {
    config: ClusterConfig,
    client: BoundedClient,
    cache: Arc<dyn Cache>,
}

impl ClusterPipeline {
    pub fn new(
        config: ClusterConfig,
        backend: Box<dyn RefineBackend>,
        cache: Arc<dyn Cache>,
    ) -> Self {
        let client = BoundedClient::new(backend, &config);
        Self {
            config,
            client,
            cache,
        }
    }

    /// Groups a batch of articles into ranked story clusters.
    ///
    /// This entry point never fails. A rate-limited run returns an empty
    /// cluster list with `rate_limited` set so the caller can fall back
    /// to showing ungrouped articles; any other unexpected error logs
    /// and returns an empty list.
    pub async fn cluster_articles(&self, articles: &[Article]) -> ClusterOutcome {
        match self.run(articles).await {
            Ok(clusters) => ClusterOutcome {
                clusters,
                rate_limited: false,
            },
            Err(ClusterError::RateLimited) => {
                warn!(
                    target: TARGET_PIPELINE,
                    "run rate limited, returning ungrouped fallback"
                );
                ClusterOutcome {
                    clusters: Vec::new(),
                    rate_limited: true,
                }
            }
            Err(err) => {
                error!(target: TARGET_PIPELINE, "run failed: {err}");
                ClusterOutcome {
                    clusters: Vec::new(),
                    rate_limited: false,
                }
            }
        }
    }

    async fn run(&self, articles: &[Article]) -> Result<Vec<StoryCluster>, ClusterError> {
        if articles.len() < MIN_CLUSTER_SIZE {
            return Ok(Vec::new());
        }

        let articles_by_id: HashMap<String, &Article> =
            articles.iter().map(|a| (a.id.clone(), a)).collect();
        let vectorizer = TfIdfVectorizer::build(articles);

        self.enter(PipelineStage::Preclustering);
        let seeds = precluster(
            articles,
            &vectorizer,
            PreclusterParams {
                threshold: self.config.precluster_threshold,
                min_size: self.config.precluster_min_size,
                max_group: self.config.precluster_max_group,
            },
        );
        info!(
            target: TARGET_PIPELINE,
            "{} seed groups from {} articles",
            seeds.len(),
            articles.len()
        );

        self.enter(PipelineStage::Refining);
        let mut clusters = refine_seed_groups(
            articles,
            &seeds,
            &articles_by_id,
            &self.client,
            self.cache.as_ref(),
            &self.config,
        )
        .await?;

        self.enter(PipelineStage::Merging);
        clusters = merge_by_id_overlap(clusters, self.config.id_merge_threshold);
        clusters = merge_by_title(clusters, self.config.title_merge_threshold);
        clusters = merge_by_entity(clusters, &articles_by_id, &self.config);

        self.enter(PipelineStage::Splitting);
        clusters = split_incoherent(clusters, &articles_by_id, &vectorizer, &self.config);
        // Splitting can recreate near-duplicate titles; run the title
        // merge once more before the optional stages.
        clusters = merge_by_title(clusters, self.config.title_merge_threshold);

        if self.config.semantic_merge_enabled && clusters.len() > 1 {
            self.enter(PipelineStage::SemanticMerge);
            match merge_semantic(clusters.clone(), &articles_by_id, &self.client).await {
                Ok(merged) => clusters = merged,
                Err(err) if err.is_rate_limit() => return Err(ClusterError::RateLimited),
                Err(err) => {
                    warn!(
                        target: TARGET_PIPELINE,
                        "semantic merge failed, keeping pre-stage clusters: {err}"
                    );
                }
            }
        }

        if self.config.expand_enabled {
            self.enter(PipelineStage::Expansion);
            expand_clusters(&mut clusters, articles, &vectorizer, &self.config);
        }

        self.enter(PipelineStage::Enriching);
        clusters.retain_mut(|cluster| enrich_cluster(cluster, &articles_by_id, &self.config));
        attach_summaries(
            &mut clusters,
            &self.client,
            self.cache.as_ref(),
            &self.config,
        )
        .await?;

        self.enter(PipelineStage::Scoring);
        assign_severity(
            &mut clusters,
            &self.client,
            self.cache.as_ref(),
            &self.config,
        )
        .await?;

        let now = Utc::now();
        for cluster in &mut clusters {
            cluster.score = Some(ranking_score(cluster, &self.config, now));
        }
        clusters.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
        });

        self.enter(PipelineStage::Sorted);
        info!(
            target: TARGET_PIPELINE,
            "run complete with {} clusters",
            clusters.len()
        );
        Ok(clusters)
    }

    fn enter(&self, stage: PipelineStage) {
        debug!(target: TARGET_PIPELINE, "stage: {stage:?}");
    }
}
