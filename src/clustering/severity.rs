use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::cache::{fingerprint, Cache};
use crate::clustering::types::{Severity, StoryCluster};
use crate::config::ClusterConfig;
use crate::error::ClusterError;
use crate::llm::client::BoundedClient;
use crate::TARGET_PIPELINE;

struct SeverityRule {
    level: u8,
    label: &'static str,
    pattern: Regex,
}

fn rule(level: u8, label: &'static str, pattern: &str) -> SeverityRule {
    SeverityRule {
        level,
        label,
        pattern: Regex::new(pattern).expect("severity rule pattern"),
    }
}

/// Prioritized severity rules, highest level first. The first (and
/// therefore highest) matching rule wins, so a story mentioning both a
/// missile strike and a death toll classifies as War/Conflict.
static SEVERITY_RULES: Lazy<Vec<SeverityRule>> = Lazy::new(|| {
    vec![
        rule(
            5,
            "War/Conflict",
            r"(?i)\b(war|invasion|air ?strikes?|missiles?|ceasefire|troops|offensive|shelling|artillery|armed conflict|drone attacks?|frontline)\b",
        ),
        rule(
            4,
            "Mass Casualty/Deaths",
            r"(?i)\b(dead|deaths?|killed|casualt(y|ies)|fatalit(y|ies)|death toll|massacre|wounded|injured)\b",
        ),
        rule(
            3,
            "National Politics",
            r"(?i)\b(elections?|president|parliament|congress|senate|prime minister|impeachments?|legislation|cabinet|coup|referendum)\b",
        ),
        rule(
            2,
            "Economy/Markets",
            r"(?i)\b(inflation|recession|stock markets?|stocks?|interest rates?|economy|gdp|unemployment|tariffs?|federal reserve|central bank)\b",
        ),
        rule(
            1,
            "Tech/Business",
            r"(?i)\b(tech|startups?|software|smartphones?|chips?|mergers?|acquisitions?|earnings|layoffs?|artificial intelligence)\b",
        ),
    ]
});

/// Classifies a cluster with the deterministic rule table over the
/// cluster title and member titles/descriptions.
pub fn rule_based_severity(cluster: &StoryCluster) -> Severity {
    let mut text = cluster.cluster_title.clone();
    for article in &cluster.articles {
        text.push('\n');
        text.push_str(&article.title);
        text.push('\n');
        text.push_str(&article.description);
    }

    for rule in SEVERITY_RULES.iter() {
        if let Some(found) = rule.pattern.find(&text) {
            return Severity {
                level: rule.level,
                label: rule.label.to_string(),
                reasons: vec![format!("matched \"{}\"", found.as_str().to_lowercase())],
            };
        }
    }
    Severity::default()
}

/// Assigns a severity to every cluster.
///
/// With the LLM path enabled, the remote assessment (memoized by member
/// fingerprint) replaces the rules, but the rule table remains the
/// fallback whenever the model is unavailable, answers with level 0, or
/// returns something unusable. A rate limit aborts the stage.
pub async fn assign_severity(
    clusters: &mut [StoryCluster],
    client: &BoundedClient,
    cache: &dyn Cache,
    config: &ClusterConfig,
) -> Result<(), ClusterError> {
    for cluster in clusters.iter_mut() {
        let severity = if config.severity_llm_enabled {
            match llm_severity(cluster, client, cache, config).await {
                Ok(assessment) if assessment.level > 0 => assessment,
                Ok(_) => rule_based_severity(cluster),
                Err(err) if err.is_rate_limit() => return Err(ClusterError::RateLimited),
                Err(err) => {
                    warn!(
                        target: TARGET_PIPELINE,
                        "severity assessment failed for '{}', using rules: {err}",
                        cluster.cluster_title
                    );
                    rule_based_severity(cluster)
                }
            }
        } else {
            rule_based_severity(cluster)
        };
        cluster.severity = Some(severity);
    }
    Ok(())
}

async fn llm_severity(
    cluster: &StoryCluster,
    client: &BoundedClient,
    cache: &dyn Cache,
    config: &ClusterConfig,
) -> Result<Severity, ClusterError> {
    let key = format!("severity:{}", fingerprint(&cluster.article_ids));
    if let Some(value) = cache.get(&key) {
        if let Ok(cached) = serde_json::from_value(value) {
            return Ok(cached);
        }
    }

    let member_titles: Vec<String> = cluster.articles.iter().map(|a| a.title.clone()).collect();
    let assessment = client
        .assess_severity(&cluster.cluster_title, &member_titles)
        .await?;

    if let Ok(value) = serde_json::to_value(&assessment) {
        cache.set(&key, value, config.cache_ttl_seconds);
    }
    Ok(assessment)
}

/// Boost added to the ranking score per severity label.
fn severity_boost(label: &str) -> f64 {
    match label {
        "War/Conflict" => 3.0,
        "Mass Casualty/Deaths" => 2.5,
        "National Politics" => 1.5,
        "Economy/Markets" => 1.0,
        "Tech/Business" => 0.5,
        _ => 0.0,
    }
}

/// Composite ranking score:
/// `wA*ln(1+n) + wD*domains + wI*imageBonus + wR*exp(-hours/24) + boost`.
///
/// The image bonus is +2 for two or more collage images, +1 for exactly
/// one, and -1 for none; recency decays from the newest member.
pub fn ranking_score(cluster: &StoryCluster, config: &ClusterConfig, now: DateTime<Utc>) -> f64 {
    let article_count = if cluster.articles.is_empty() {
        cluster.article_ids.len()
    } else {
        cluster.articles.len()
    };

    let domains: std::collections::HashSet<String> =
        cluster.articles.iter().map(|a| a.domain()).collect();

    let image_bonus = match cluster.image_urls.len() {
        0 => -1.0,
        1 => 1.0,
        _ => 2.0,
    };

    let hours_since_latest = cluster
        .articles
        .iter()
        .map(|a| a.published_at)
        .max()
        .map(|latest| {
            (now.signed_duration_since(latest).num_minutes() as f64 / 60.0).max(0.0)
        })
        .unwrap_or(f64::INFINITY);
    let recency_decay = (-hours_since_latest / 24.0).exp();

    let boost = cluster
        .severity
        .as_ref()
        .map(|s| severity_boost(&s.label))
        .unwrap_or(0.0);

    config.weight_articles * (1.0 + article_count as f64).ln()
        + config.weight_domains * domains.len() as f64
        + config.weight_images * image_bonus
        + config.weight_recency * recency_decay
        + boost
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::{Article, Source};
    use chrono::Duration;

    fn article(id: &str, title: &str, description: &str, domain: &str, hours_ago: i64) -> Article {
        Article {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            content: String::new(),
            url: format!("https://{domain}/{id}"),
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

    fn cluster_with(title: &str, articles: Vec<Article>) -> StoryCluster {
        let ids = articles.iter().map(|a| a.id.clone()).collect();
        let mut cluster = StoryCluster::new(title, ids);
        cluster.articles = articles;
        cluster
    }

    #[test]
    fn war_outranks_mass_casualty_when_both_match() {
        let cluster = cluster_with(
            "Missile strike hits city",
            vec![
                article("a", "Missile strike hits city center", "death toll rises", "one.com", 1),
                article("b", "Ceasefire talks stall", "dozens killed in strikes", "two.com", 2),
            ],
        );

        let severity = rule_based_severity(&cluster);
        assert_eq!(severity.level, 5);
        assert_eq!(severity.label, "War/Conflict");
    }

    #[test]
    fn unmatched_text_defaults_to_other() {
        let cluster = cluster_with(
            "Local bakery wins award",
            vec![
                article("a", "Local bakery wins award", "best croissant in town", "one.com", 1),
                article("b", "Bakery celebrates win", "customers line up", "two.com", 2),
            ],
        );

        let severity = rule_based_severity(&cluster);
        assert_eq!(severity, Severity::default());
    }

    #[test]
    fn image_bonus_steps_with_collage_size() {
        let base = cluster_with(
            "Story",
            vec![
                article("a", "Story", "", "one.com", 1),
                article("b", "Story again", "", "two.com", 1),
            ],
        );
        let config = ClusterConfig::default();
        let now = Utc::now();

        let mut none = base.clone();
        let mut one = base.clone();
        one.image_urls = vec!["https://img/1.jpg".into()];
        let mut two = base.clone();
        two.image_urls = vec!["https://img/1.jpg".into(), "https://img/2.jpg".into()];

        none.image_urls.clear();
        let s_none = ranking_score(&none, &config, now);
        let s_one = ranking_score(&one, &config, now);
        let s_two = ranking_score(&two, &config, now);

        assert!(s_none < s_one && s_one < s_two);
    }

    #[test]
    fn severity_boost_orders_equal_clusters() {
        let config = ClusterConfig::default();
        let now = Utc::now();
        let base = cluster_with(
            "Story",
            vec![
                article("a", "Story", "", "one.com", 1),
                article("b", "Story again", "", "two.com", 1),
            ],
        );

        let mut war = base.clone();
        war.severity = Some(Severity {
            level: 5,
            label: "War/Conflict".into(),
            reasons: vec![],
        });
        let mut other = base;
        other.severity = Some(Severity::default());

        assert!(ranking_score(&war, &config, now) > ranking_score(&other, &config, now));
    }
}
