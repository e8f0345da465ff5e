use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};
use url::Url;

use crate::article::Article;
use crate::cache::{fingerprint, Cache};
use crate::clustering::types::StoryCluster;
use crate::clustering::{MAX_SUMMARY_ARTICLES, MIN_CLUSTER_SIZE};
use crate::config::ClusterConfig;
use crate::error::ClusterError;
use crate::llm::backend::ArticleBrief;
use crate::llm::client::BoundedClient;
use crate::TARGET_PIPELINE;

/// Resolves, deduplicates, caps, and decorates one cluster in place.
///
/// Members are deduplicated first by canonical URL (origin + path,
/// ignoring query and fragment), then by (host, lowercased title) to
/// catch same-outlet reposts hiding behind distinct tracking URLs.
/// Survivors are ordered image-first then by recency, capped per domain
/// and in total, and up to four collage image URLs are attached.
///
/// Returns false when fewer than two articles survive; such clusters
/// are dropped by the caller.
pub fn enrich_cluster(
    cluster: &mut StoryCluster,
    articles_by_id: &HashMap<String, &Article>,
    config: &ClusterConfig,
) -> bool {
    let mut resolved: Vec<Article> = cluster
        .article_ids
        .iter()
        .filter_map(|id| articles_by_id.get(id).map(|a| (*a).clone()))
        .collect();

    if resolved.len() < MIN_CLUSTER_SIZE {
        return false;
    }

    let mut seen_urls = HashSet::new();
    let mut seen_outlet_titles = HashSet::new();
    resolved.retain(|article| {
        if !seen_urls.insert(canonical_url(&article.url)) {
            return false;
        }
        seen_outlet_titles.insert((article.domain(), article.title.trim().to_lowercase()))
    });

    if resolved.len() < MIN_CLUSTER_SIZE {
        debug!(
            target: TARGET_PIPELINE,
            "'{}' collapsed to {} articles after dedup",
            cluster.cluster_title,
            resolved.len()
        );
        return false;
    }

    resolved.sort_by(|a, b| {
        b.has_real_image()
            .cmp(&a.has_real_image())
            .then(b.published_at.cmp(&a.published_at))
    });

    let mut domain_counts: HashMap<String, usize> = HashMap::new();
    let mut capped: Vec<Article> = Vec::new();
    for article in &resolved {
        if capped.len() >= config.max_display_articles {
            break;
        }
        let count = domain_counts.entry(article.domain()).or_insert(0);
        if *count >= config.max_per_domain {
            continue;
        }
        *count += 1;
        capped.push(article.clone());
    }

    if capped.len() < MIN_CLUSTER_SIZE {
        return false;
    }

    cluster.image_urls = collect_images(&capped, &resolved, config);
    cluster.articles = capped;
    true
}

/// Attaches a cached or freshly generated summary to each cluster.
/// Per-cluster failures are skipped; a rate limit aborts the stage.
pub async fn attach_summaries(
    clusters: &mut [StoryCluster],
    client: &BoundedClient,
    cache: &dyn Cache,
    config: &ClusterConfig,
) -> Result<(), ClusterError> {
    if !config.summary_enabled {
        return Ok(());
    }

    for cluster in clusters.iter_mut() {
        let key = format!("summary:{}", fingerprint(&cluster.article_ids));
        if let Some(value) = cache.get(&key) {
            if let Some(cached) = value.as_str() {
                cluster.summary = Some(cached.to_string());
                continue;
            }
        }

        let briefs: Vec<ArticleBrief> = cluster
            .articles
            .iter()
            .take(MAX_SUMMARY_ARTICLES)
            .map(ArticleBrief::from_article)
            .collect();

        match client.summarize(&briefs).await {
            Ok(text) if !text.trim().is_empty() => {
                cache.set(&key, text.clone().into(), config.cache_ttl_seconds);
                cluster.summary = Some(text);
            }
            Ok(_) => {}
            Err(err) if err.is_rate_limit() => return Err(ClusterError::RateLimited),
            Err(err) => {
                warn!(
                    target: TARGET_PIPELINE,
                    "summary failed for '{}': {err}", cluster.cluster_title
                );
            }
        }
    }
    Ok(())
}

/// Canonical dedup key for an article URL: origin plus path, with query
/// and fragment stripped. Unparseable URLs fall back to the raw string.
fn canonical_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(url) => format!("{}{}", url.origin().ascii_serialization(), url.path()),
        Err(_) => raw.trim().to_lowercase(),
    }
}

/// Collage image selection: up to `max_image_urls` deduplicated URLs
/// from capped members with real images meeting the dimension floor,
/// falling back to the pre-cap deduplicated set when none qualify.
fn collect_images(capped: &[Article], deduped: &[Article], config: &ClusterConfig) -> Vec<String> {
    let from_capped = image_urls_from(capped, config);
    if !from_capped.is_empty() {
        return from_capped;
    }
    image_urls_from(deduped, config)
}

fn image_urls_from(articles: &[Article], config: &ClusterConfig) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for article in articles {
        if !article.has_real_image() || !meets_dimension_floor(article, config) {
            continue;
        }
        let Some(url) = &article.url_to_image else {
            continue;
        };
        if seen.insert(url.clone()) {
            urls.push(url.clone());
        }
        if urls.len() >= config.max_image_urls {
            break;
        }
    }
    urls
}

/// Unknown dimensions pass the floor; known-small images do not.
fn meets_dimension_floor(article: &Article, config: &ClusterConfig) -> bool {
    let width_ok = article.image_width.map_or(true, |w| w >= config.min_image_width);
    let height_ok = article
        .image_height
        .map_or(true, |h| h >= config.min_image_height);
    width_ok && height_ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::Source;
    use chrono::{Duration, Utc};

    fn article(id: &str, title: &str, url: &str, domain: &str, hours_ago: i64) -> Article {
        Article {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            content: String::new(),
            url: url.into(),
            url_to_image: None,
            published_at: Utc::now() - Duration::hours(hours_ago),
            source: Source {
                name: domain.into(),
                url: format!("https://{domain}"),
            },
            category: "world".into(),
            image_width: None,
            image_height: None,
        }
    }

    fn enrich(articles: &[Article], ids: &[&str], config: &ClusterConfig) -> Option<StoryCluster> {
        let lookup: HashMap<String, &Article> =
            articles.iter().map(|a| (a.id.clone(), a)).collect();
        let mut cluster = StoryCluster::new("story", ids.iter().map(|s| s.to_string()).collect());
        enrich_cluster(&mut cluster, &lookup, config).then_some(cluster)
    }

    #[test]
    fn tracking_url_variants_deduplicate() {
        let articles = vec![
            article("a", "Big story", "https://one.com/big-story?utm_source=rss", "one.com", 1),
            article("b", "Big story", "https://one.com/big-story#section", "one.com", 2),
            article("c", "Big story follow-up", "https://two.com/follow", "two.com", 3),
        ];
        let cluster = enrich(&articles, &["a", "b", "c"], &ClusterConfig::default()).unwrap();

        assert_eq!(cluster.articles.len(), 2);
        assert!(cluster.articles.iter().any(|a| a.id == "c"));
    }

    #[test]
    fn same_outlet_same_title_deduplicates() {
        let articles = vec![
            article("a", "Big story", "https://one.com/path-one", "one.com", 1),
            article("b", "Big Story", "https://one.com/path-two", "one.com", 2),
            article("c", "Big story elsewhere", "https://two.com/item", "two.com", 3),
        ];
        let cluster = enrich(&articles, &["a", "b", "c"], &ClusterConfig::default()).unwrap();
        assert_eq!(cluster.articles.len(), 2);
    }

    #[test]
    fn cluster_collapsing_below_two_is_dropped() {
        let articles = vec![
            article("a", "Big story", "https://one.com/big-story?p=1", "one.com", 1),
            article("b", "Big story", "https://one.com/big-story?p=2", "one.com", 2),
        ];
        assert!(enrich(&articles, &["a", "b"], &ClusterConfig::default()).is_none());
    }

    #[test]
    fn per_domain_cap_limits_one_outlet() {
        let articles = vec![
            article("a", "Take one", "https://one.com/1", "one.com", 1),
            article("b", "Take two", "https://one.com/2", "one.com", 2),
            article("c", "Take three", "https://one.com/3", "one.com", 3),
            article("d", "Other view", "https://two.com/1", "two.com", 4),
        ];
        let cluster = enrich(&articles, &["a", "b", "c", "d"], &ClusterConfig::default()).unwrap();

        let from_one = cluster
            .articles
            .iter()
            .filter(|a| a.domain() == "one.com")
            .count();
        assert_eq!(from_one, 2);
        assert_eq!(cluster.articles.len(), 3);
    }

    #[test]
    fn images_prefer_capped_members_with_real_art() {
        let mut a = article("a", "Take one", "https://one.com/1", "one.com", 1);
        a.url_to_image = Some("https://cdn.one.com/photo.jpg".into());
        a.image_width = Some(800);
        a.image_height = Some(600);
        let mut b = article("b", "Take two", "https://two.com/1", "two.com", 2);
        b.url_to_image = Some("https://cdn.two.com/placeholder.png".into());
        let c = article("c", "Take three", "https://three.com/1", "three.com", 3);

        let articles = vec![a, b, c];
        let cluster = enrich(&articles, &["a", "b", "c"], &ClusterConfig::default()).unwrap();

        assert_eq!(cluster.image_urls, vec!["https://cdn.one.com/photo.jpg"]);
    }

    #[test]
    fn small_images_fail_the_dimension_floor() {
        let mut a = article("a", "Take one", "https://one.com/1", "one.com", 1);
        a.url_to_image = Some("https://cdn.one.com/thumb.jpg".into());
        a.image_width = Some(64);
        a.image_height = Some(64);
        let b = article("b", "Take two", "https://two.com/1", "two.com", 2);

        let articles = vec![a, b];
        let cluster = enrich(&articles, &["a", "b"], &ClusterConfig::default()).unwrap();
        assert!(cluster.image_urls.is_empty());
    }
}
