pub mod backend;
pub mod client;
pub mod parse;
pub mod prompts;

pub use backend::{
    ArticleBrief, ClusterBrief, GroqBackend, MergeGroup, PassthroughBackend, RefineBackend,
    RefinedCluster,
};
pub use client::BoundedClient;
