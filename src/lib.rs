pub mod article;
pub mod cache;
pub mod clustering;
pub mod config;
pub mod entities;
pub mod error;
pub mod llm;
pub mod logging;
pub mod vectorizer;

pub use article::{Article, Source};
pub use clustering::pipeline::ClusterPipeline;
pub use clustering::types::{ClusterOutcome, Severity, StoryCluster};
pub use config::ClusterConfig;
pub use error::ClusterError;

pub const TARGET_LLM_REQUEST: &str = "llm_request";
pub const TARGET_PIPELINE: &str = "pipeline";
