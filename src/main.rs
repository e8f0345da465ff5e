use anyhow::{Context, Result};
use clap::Parser;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use newsreel::cache::MemoryCache;
use newsreel::clustering::pipeline::ClusterPipeline;
use newsreel::config::ClusterConfig;
use newsreel::llm::backend::{GroqBackend, PassthroughBackend, RefineBackend};
use newsreel::logging::configure_logging;
use newsreel::Article;

/// Group a batch of news articles into ranked story clusters.
#[derive(Parser, Debug)]
#[command(name = "newsreel", version, about)]
struct Cli {
    /// Path to a JSON array of articles.
    #[arg(long)]
    input: PathBuf,

    /// Write the cluster JSON here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Enable the centroid expansion stage.
    #[arg(long)]
    expand: bool,

    /// Skip the LLM-assisted semantic merge stage.
    #[arg(long)]
    no_semantic_merge: bool,

    /// Ask the model for severity assessments instead of the rule table.
    #[arg(long)]
    llm_severity: bool,

    /// Run without a remote backend; only the deterministic stages do
    /// any work.
    #[arg(long)]
    offline: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    configure_logging();
    let cli = Cli::parse();

    let raw = fs::read_to_string(&cli.input)
        .with_context(|| format!("reading {}", cli.input.display()))?;
    let articles: Vec<Article> = serde_json::from_str(&raw).context("parsing article JSON")?;
    info!("Loaded {} articles from {}", articles.len(), cli.input.display());

    let config = ClusterConfig {
        expand_enabled: cli.expand,
        semantic_merge_enabled: !cli.no_semantic_merge,
        severity_llm_enabled: cli.llm_severity,
        ..ClusterConfig::default()
    };

    let backend: Box<dyn RefineBackend> = if cli.offline {
        info!("Running offline; remote refinement is disabled");
        Box::new(PassthroughBackend)
    } else {
        let api_key =
            env::var("GROQ_API_KEY").context("GROQ_API_KEY environment variable required")?;
        let api_base = env::var("GROQ_API_BASE").ok();
        let model = env::var("GROQ_MODEL").ok();
        Box::new(GroqBackend::new(api_key, api_base, model))
    };

    let pipeline = ClusterPipeline::new(config, backend, Arc::new(MemoryCache::new()));
    let outcome = pipeline.cluster_articles(&articles).await;

    if outcome.rate_limited {
        warn!("Upstream rate limited; emitting an empty cluster list");
    }
    info!("Produced {} story clusters", outcome.clusters.len());

    let serialized = serde_json::to_string_pretty(&outcome)?;
    match &cli.output {
        Some(path) => {
            fs::write(path, serialized).with_context(|| format!("writing {}", path.display()))?;
            info!("Wrote clusters to {}", path.display());
        }
        None => println!("{serialized}"),
    }

    Ok(())
}
