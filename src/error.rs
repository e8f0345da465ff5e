use thiserror::Error;

/// Message substrings that classify an upstream failure as a rate limit.
/// Covers HTTP 429 bodies plus the vendor strings we have seen in the
/// wild for quota exhaustion.
const RATE_LIMIT_PATTERNS: &[&str] = &[
    "rate_limit_exceeded",
    "spend_limit_reached",
    "too many requests",
    "429",
];

/// Failure taxonomy for the clustering pipeline.
///
/// `RateLimited` is a distinguished abort signal: it terminates the
/// current stage, propagates to the orchestrator, and turns the whole run
/// into the rate-limited terminal outcome. Everything else is either
/// retried, skipped per-item, or surfaced as an unexpected failure.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The upstream refused us for quota reasons and retries are
    /// exhausted.
    #[error("upstream rate limit reached")]
    RateLimited,

    /// The remote call failed for a transport or server-side reason.
    #[error("upstream call failed: {message}")]
    Upstream {
        status: Option<u16>,
        message: String,
    },

    /// The remote answered with something we could not interpret even
    /// after substring recovery.
    #[error("malformed upstream response: {0}")]
    Malformed(String),
}

impl ClusterError {
    pub fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        ClusterError::Upstream {
            status,
            message: message.into(),
        }
    }

    /// Shared rate-limit classifier. Every caller of the bounded client
    /// routes through this so backoff and fallback decisions stay
    /// consistent pipeline-wide.
    pub fn is_rate_limit(&self) -> bool {
        match self {
            ClusterError::RateLimited => true,
            ClusterError::Upstream { status, message } => {
                if *status == Some(429) {
                    return true;
                }
                let lower = message.to_lowercase();
                RATE_LIMIT_PATTERNS.iter().any(|p| lower.contains(p))
            }
            ClusterError::Malformed(_) => false,
        }
    }
}
