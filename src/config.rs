/// Flat tuning surface for the whole pipeline.
///
/// Constructed once at the top of a run and threaded through every stage
/// as a parameter, so no stage reaches into the environment on its own.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Minimum centroid similarity for an article to join a seed group.
    pub precluster_threshold: f64,
    /// Seed groups smaller than this are discarded.
    pub precluster_min_size: usize,
    /// Hard cap on members per seed group.
    pub precluster_max_group: usize,

    /// Seed groups larger than this are refined in overlapping chunks.
    pub refine_chunk_size: usize,
    /// Articles shared between consecutive refinement chunks.
    pub refine_chunk_overlap: usize,
    /// Pacing delay between consecutive refinement calls.
    pub refine_chunk_delay_ms: u64,
    /// Chunk size for the uncovered-article recovery pass.
    pub uncovered_chunk_size: usize,

    /// Jaccard threshold over article ids for the ID-overlap merge.
    pub id_merge_threshold: f64,
    /// Jaccard threshold over title tokens. Tighter than the ID merge:
    /// titles are short, so near-identical wording implies the same event.
    pub title_merge_threshold: f64,

    /// Shared entities required before an entity merge is considered.
    pub min_shared_entities: usize,
    /// Entities shorter than this are ignored by the entity merge.
    pub min_entity_length: usize,
    /// Average cross-cluster cosine required to allow an entity merge.
    pub min_coherence: f64,
    /// Cross-cluster article pairs sampled by the coherence gate.
    pub coherence_sample_pairs: usize,
    /// Member titles sampled when building a cluster's entity set.
    pub entity_title_sample: usize,

    /// Seed threshold for the coherence splitter, stricter than
    /// `precluster_threshold`.
    pub split_threshold: f64,
    /// Minimum sub-cluster size the splitter will keep.
    pub split_min_size: usize,

    /// Run the LLM-assisted semantic merge stage.
    pub semantic_merge_enabled: bool,

    /// Run the centroid expansion stage.
    pub expand_enabled: bool,
    /// Minimum centroid similarity for expansion candidates.
    pub expand_sim_threshold: f64,
    /// Recency window for expansion candidates, in hours, measured from
    /// the cluster's newest member. Clamped to 168.
    pub expand_window_hours: i64,
    /// Maximum articles added to one cluster by expansion.
    pub expand_max_add: usize,
    /// Require expansion candidates to match the cluster's dominant
    /// category.
    pub expand_category_strict: bool,

    /// Ask the model for severity assessments; the rule table remains the
    /// fallback.
    pub severity_llm_enabled: bool,
    /// Attach remote summaries during enrichment.
    pub summary_enabled: bool,

    /// Display cap per source domain within a cluster.
    pub max_per_domain: usize,
    /// Total display cap per cluster.
    pub max_display_articles: usize,
    /// Collage image URLs attached per cluster.
    pub max_image_urls: usize,
    /// Minimum image dimensions for collage candidates. Unknown
    /// dimensions pass; known-small images do not.
    pub min_image_width: u32,
    pub min_image_height: u32,

    /// Concurrent in-flight calls allowed through the bounded client.
    pub llm_concurrency: usize,
    /// Attempts per remote call before a rate limit propagates.
    pub retry_max: u32,
    /// Base backoff delay, doubled on each retry.
    pub retry_base_delay_ms: u64,

    /// TTL for memoized refine results, summaries, and assessments.
    pub cache_ttl_seconds: u64,

    /// Ranking weights, applied in `ranking_score`.
    pub weight_articles: f64,
    pub weight_domains: f64,
    pub weight_images: f64,
    pub weight_recency: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            precluster_threshold: 0.32,
            precluster_min_size: 2,
            precluster_max_group: 40,

            refine_chunk_size: 25,
            refine_chunk_overlap: 5,
            refine_chunk_delay_ms: 800,
            uncovered_chunk_size: 40,

            id_merge_threshold: 0.45,
            title_merge_threshold: 0.72,

            min_shared_entities: 1,
            min_entity_length: 4,
            min_coherence: 0.12,
            coherence_sample_pairs: 20,
            entity_title_sample: 10,

            split_threshold: 0.52,
            split_min_size: 2,

            semantic_merge_enabled: true,

            expand_enabled: false,
            expand_sim_threshold: 0.44,
            expand_window_hours: 96,
            expand_max_add: 40,
            expand_category_strict: true,

            severity_llm_enabled: false,
            summary_enabled: true,

            max_per_domain: 2,
            max_display_articles: 20,
            max_image_urls: 4,
            min_image_width: 200,
            min_image_height: 150,

            llm_concurrency: 2,
            retry_max: 3,
            retry_base_delay_ms: 800,

            cache_ttl_seconds: 3600,

            weight_articles: 1.2,
            weight_domains: 0.6,
            weight_images: 0.5,
            weight_recency: 1.5,
        }
    }
}
