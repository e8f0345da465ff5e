use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::clustering::types::Severity;
use crate::config::ClusterConfig;
use crate::error::ClusterError;
use crate::llm::backend::{ArticleBrief, ClusterBrief, MergeGroup, RefineBackend, RefinedCluster};
use crate::TARGET_LLM_REQUEST;

/// Concurrency-limited, retrying gateway to the remote refinement
/// backend.
///
/// Each instance owns its semaphore, so independent clients never share
/// hidden state. The semaphore is fair: queued callers are released in
/// FIFO order. A permit is held for the full attempt sequence of one
/// call, including backoff sleeps, and released on every exit path.
pub struct BoundedClient {
    backend: Box<dyn RefineBackend>,
    permits: Arc<Semaphore>,
    retry_max: u32,
    retry_base_delay: Duration,
}

impl BoundedClient {
    pub fn new(backend: Box<dyn RefineBackend>, config: &ClusterConfig) -> Self {
        Self {
            backend,
            permits: Arc::new(Semaphore::new(config.llm_concurrency.max(1))),
            retry_max: config.retry_max.max(1),
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }

    pub async fn refine(
        &self,
        articles: &[ArticleBrief],
    ) -> Result<Vec<RefinedCluster>, ClusterError> {
        self.call("refine", || self.backend.refine(articles)).await
    }

    pub async fn summarize(&self, articles: &[ArticleBrief]) -> Result<String, ClusterError> {
        self.call("summarize", || self.backend.summarize(articles))
            .await
    }

    pub async fn assess_severity(
        &self,
        title: &str,
        member_titles: &[String],
    ) -> Result<Severity, ClusterError> {
        self.call("assess_severity", || {
            self.backend.assess_severity(title, member_titles)
        })
        .await
    }

    pub async fn merge_similar(
        &self,
        briefs: &[ClusterBrief],
    ) -> Result<Vec<MergeGroup>, ClusterError> {
        self.call("merge_similar", || self.backend.merge_similar(briefs))
            .await
    }

    /// Runs one backend operation under the concurrency cap.
    ///
    /// Rate-limit-classified failures are retried with a doubling delay
    /// plus proportional jitter; once attempts are exhausted the
    /// distinguished `RateLimited` sentinel propagates. Any other error
    /// propagates immediately without retry.
    async fn call<T, F, Fut>(&self, op: &str, mut attempt_fn: F) -> Result<T, ClusterError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClusterError>>,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .expect("client semaphore closed");

        let mut delay = self.retry_base_delay;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match attempt_fn().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_rate_limit() => {
                    if attempt >= self.retry_max {
                        warn!(
                            target: TARGET_LLM_REQUEST,
                            "{op}: rate limited after {attempt} attempts, giving up"
                        );
                        return Err(ClusterError::RateLimited);
                    }
                    // Jitter stays proportional to the current delay so
                    // consecutive delays remain strictly increasing.
                    let jitter_ms = rand::rng().random_range(0..=(delay.as_millis() as u64 / 4));
                    let pause = delay + Duration::from_millis(jitter_ms);
                    debug!(
                        target: TARGET_LLM_REQUEST,
                        "{op}: rate limited, retry {attempt}/{} in {:?}",
                        self.retry_max, pause
                    );
                    sleep(pause).await;
                    delay *= 2;
                }
                Err(err) => {
                    warn!(target: TARGET_LLM_REQUEST, "{op}: {err}");
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::future::join_all;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    fn test_config(concurrency: usize, retry_max: u32, base_delay_ms: u64) -> ClusterConfig {
        ClusterConfig {
            llm_concurrency: concurrency,
            retry_max,
            retry_base_delay_ms: base_delay_ms,
            ..ClusterConfig::default()
        }
    }

    /// Backend that tracks in-flight call counts through shared handles
    /// the test keeps after the backend moves into the client.
    struct CountingBackend {
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RefineBackend for CountingBackend {
        async fn refine(
            &self,
            _articles: &[ArticleBrief],
        ) -> Result<Vec<RefinedCluster>, ClusterError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn summarize(&self, _articles: &[ArticleBrief]) -> Result<String, ClusterError> {
            Ok(String::new())
        }

        async fn assess_severity(
            &self,
            _title: &str,
            _member_titles: &[String],
        ) -> Result<Severity, ClusterError> {
            Ok(Severity::default())
        }

        async fn merge_similar(
            &self,
            _briefs: &[ClusterBrief],
        ) -> Result<Vec<MergeGroup>, ClusterError> {
            Ok(Vec::new())
        }
    }

    /// Backend whose refine always fails with the configured error,
    /// recording when each attempt arrived.
    struct FailingBackend {
        error_status: Option<u16>,
        error_message: &'static str,
        attempt_times: Arc<Mutex<Vec<Instant>>>,
    }

    #[async_trait]
    impl RefineBackend for FailingBackend {
        async fn refine(
            &self,
            _articles: &[ArticleBrief],
        ) -> Result<Vec<RefinedCluster>, ClusterError> {
            self.attempt_times.lock().unwrap().push(Instant::now());
            Err(ClusterError::upstream(
                self.error_status,
                self.error_message,
            ))
        }

        async fn summarize(&self, _articles: &[ArticleBrief]) -> Result<String, ClusterError> {
            Ok(String::new())
        }

        async fn assess_severity(
            &self,
            _title: &str,
            _member_titles: &[String],
        ) -> Result<Severity, ClusterError> {
            Ok(Severity::default())
        }

        async fn merge_similar(
            &self,
            _briefs: &[ClusterBrief],
        ) -> Result<Vec<MergeGroup>, ClusterError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_calls_never_exceed_the_cap() {
        let max_in_flight = Arc::new(AtomicUsize::new(0));
        let backend = CountingBackend {
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::clone(&max_in_flight),
        };
        let client = Arc::new(BoundedClient::new(Box::new(backend), &test_config(2, 3, 10)));

        let calls: Vec<_> = (0..6)
            .map(|_| {
                let client = Arc::clone(&client);
                tokio::spawn(async move { client.refine(&[]).await })
            })
            .collect();
        for result in join_all(calls).await {
            assert!(result.unwrap().is_ok());
        }

        assert!(max_in_flight.load(Ordering::SeqCst) <= 2);
        assert!(max_in_flight.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_calls_retry_with_increasing_delay_then_propagate() {
        let attempt_times = Arc::new(Mutex::new(Vec::new()));
        let backend = FailingBackend {
            error_status: Some(429),
            error_message: "rate_limit_exceeded",
            attempt_times: Arc::clone(&attempt_times),
        };
        let client = BoundedClient::new(Box::new(backend), &test_config(2, 3, 100));

        let result = client.refine(&[]).await;
        assert!(matches!(result, Err(ClusterError::RateLimited)));

        let times = attempt_times.lock().unwrap();
        assert_eq!(times.len(), 3, "retry_max bounds the attempt count");
        let first_gap = times[1] - times[0];
        let second_gap = times[2] - times[1];
        assert!(
            second_gap > first_gap,
            "delays must strictly increase: {first_gap:?} then {second_gap:?}"
        );
        assert!(first_gap >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn non_rate_limit_errors_propagate_without_retry() {
        let attempt_times = Arc::new(Mutex::new(Vec::new()));
        let backend = FailingBackend {
            error_status: Some(500),
            error_message: "internal error",
            attempt_times: Arc::clone(&attempt_times),
        };
        let client = BoundedClient::new(Box::new(backend), &test_config(2, 3, 10));

        let result = client.refine(&[]).await;
        assert!(matches!(result, Err(ClusterError::Upstream { .. })));
        assert_eq!(attempt_times.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn permit_is_released_when_a_call_fails() {
        let attempt_times = Arc::new(Mutex::new(Vec::new()));
        let backend = FailingBackend {
            error_status: Some(500),
            error_message: "internal error",
            attempt_times: Arc::clone(&attempt_times),
        };
        // Concurrency of one: if the failed call leaked its permit, the
        // second call would hang instead of failing promptly.
        let client = BoundedClient::new(Box::new(backend), &test_config(1, 3, 10));

        assert!(client.refine(&[]).await.is_err());
        assert!(client.refine(&[]).await.is_err());
        assert_eq!(attempt_times.lock().unwrap().len(), 2);
    }
}
