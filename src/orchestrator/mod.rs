//! Multi-Source Intelligence Orchestrator (C3, §4.3): fans out to
//! collectors under rate-limit and circuit-breaker protection, with
//! deduplication and a three-tier cache.
//!
//! Grounded on `data::mod::DataProvider` (trait-object provider registry)
//! and `engine::scanner`'s concurrent `tokio::join!` fan-out pattern,
//! generalized to the collector contract in §4.3.1.

pub mod cache;
pub mod circuit_breaker;
pub mod collectors;
pub mod dedup;
pub mod priority_queue;
pub mod rate_limiter;
pub mod retry;

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::oneshot;
use tracing::warn;

use crate::config::OrchestratorConfig;
use cache::{FetchOutcome, ThreeTierCache};
use circuit_breaker::CircuitBreaker;
use collectors::{Collector, CollectorRequest};
use dedup::Deduplicator;
use priority_queue::{Priority, PriorityQueue, WaitThresholds};
use rate_limiter::TokenBucket;

/// One turn in a collector's priority queue: granted by the collector's
/// turnstile worker once this entry reaches the head of its (possibly
/// escalated) lane.
type Turnstile = Arc<PriorityQueue<oneshot::Sender<()>>>;

/// Ties cache, rate limiting, circuit breaking, deduplication, and
/// priority scheduling together behind one `dispatch` entry point. One
/// `Orchestrator` is shared by the Decision Engine, Discoverer, and
/// Backtester worker pools.
pub struct Orchestrator {
    collectors: HashMap<&'static str, Arc<dyn Collector>>,
    buckets: HashMap<&'static str, Arc<TokenBucket>>,
    breakers: HashMap<&'static str, Arc<CircuitBreaker>>,
    turnstiles: HashMap<&'static str, Turnstile>,
    cache: ThreeTierCache,
    dedup: Arc<Deduplicator>,
    config: OrchestratorConfig,
}

/// Grant turns from `turnstile` one at a time, in priority + FIFO order
/// with starvation escalation (§4.3.6). Runs for the lifetime of the
/// Orchestrator; one per registered collector.
fn spawn_turnstile_worker(turnstile: Turnstile) {
    tokio::spawn(async move {
        loop {
            match turnstile.dequeue().await {
                Some(tx) => {
                    let _ = tx.send(());
                }
                None => tokio::time::sleep(StdDuration::from_millis(20)).await,
            }
        }
    });
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, registered: Vec<Arc<dyn Collector>>, cache: ThreeTierCache) -> Self {
        let mut collectors = HashMap::new();
        let mut buckets = HashMap::new();
        let mut breakers = HashMap::new();
        let mut turnstiles = HashMap::new();

        let thresholds = WaitThresholds {
            low_secs: config.priority_wait_low_secs,
            normal_secs: config.priority_wait_normal_secs,
            high_secs: config.priority_wait_high_secs,
        };

        for collector in registered {
            let key = collector.key();
            let collector_cfg = config.collector_or_default(key);
            buckets.insert(key, Arc::new(TokenBucket::new(collector_cfg.capacity, collector_cfg.refill_per_day)));
            breakers.insert(
                key,
                Arc::new(CircuitBreaker::new(
                    config.circuit_failure_threshold,
                    config.circuit_cooloff_secs,
                    config.circuit_half_open_successes,
                )),
            );
            let turnstile: Turnstile = Arc::new(PriorityQueue::new(thresholds));
            spawn_turnstile_worker(turnstile.clone());
            turnstiles.insert(key, turnstile);
            collectors.insert(key, collector);
        }

        Self { collectors, buckets, breakers, turnstiles, cache, dedup: Arc::new(Deduplicator::new()), config }
    }

    fn max_wait(&self, priority: Priority) -> Option<StdDuration> {
        match priority {
            Priority::Low => None,
            Priority::Normal => Some(StdDuration::from_secs(self.config.priority_wait_normal_secs)),
            Priority::High => Some(StdDuration::from_secs(self.config.priority_wait_high_secs)),
            Priority::Critical => Some(StdDuration::from_secs(self.config.priority_wait_high_secs * 2)),
        }
    }

    /// Consume one token, waiting (polling) up to the priority's bound if
    /// none is immediately available. LOW priority never waits — it either
    /// gets a token now or is rejected.
    async fn acquire_token(bucket: &TokenBucket, priority: Priority, max_wait: Option<StdDuration>) -> bool {
        if bucket.try_consume().await {
            return true;
        }
        let Some(max_wait) = max_wait else {
            return false;
        };
        let deadline = tokio::time::Instant::now() + max_wait;
        loop {
            tokio::time::sleep(StdDuration::from_millis(50)).await;
            if bucket.try_consume().await {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
        }
    }

    /// Fetch `request` from `collector_key`, honoring cache, the
    /// collector's priority turnstile, deduplication, circuit breaker,
    /// rate limit, and retry-with-backoff, in that order. Cache hits never
    /// touch the turnstile, rate limiter, or circuit breaker. Of any number
    /// of concurrent cache-miss callers for the same canonical request, only
    /// the one that becomes the dedup leader ever waits for a turn or pays
    /// the breaker/bucket cost — followers attach to the leader's result.
    pub async fn dispatch(&self, collector_key: &str, request: CollectorRequest, priority: Priority) -> Result<FetchOutcome> {
        let collector = self
            .collectors
            .get(collector_key)
            .cloned()
            .ok_or_else(|| anyhow!("no collector registered for key '{collector_key}'"))?;
        let breaker = self.breakers.get(collector_key).cloned().expect("breaker registered alongside collector");
        let bucket = self.buckets.get(collector_key).cloned().expect("bucket registered alongside collector");
        let turnstile = self.turnstiles.get(collector_key).cloned().expect("turnstile registered alongside collector");
        let dedup = self.dedup.clone();

        let ttl = collector.ttl(&request);
        let request_key = dedup::Deduplicator::canonicalize(collector_key, &request.params);
        let max_retries = self.config.max_retries;
        let base_backoff = StdDuration::from_millis(self.config.retry_base_backoff_ms);
        let max_wait = self.max_wait(priority);
        let collector_key_owned = collector_key.to_string();

        let request_key_for_fetch = request_key.clone();

        self.cache
            .get_or_fetch(collector_key, &request_key, ttl, move || {
                let request_key = request_key_for_fetch;
                let collector_key_owned = collector_key_owned.clone();
                async move {
                    let collector_key_for_fetch = collector_key_owned.clone();
                    let dedup_result = dedup
                        .run_deduplicated(&request_key, move || async move {
                            let (tx, rx) = oneshot::channel();
                            turnstile.enqueue(tx, priority).await;
                            let _ = rx.await;

                            if !breaker.allow_request().await {
                                return Err(format!("circuit open for collector '{collector_key_for_fetch}'"));
                            }
                            if !Self::acquire_token(&bucket, priority, max_wait).await {
                                return Err(format!("rate limit exceeded for collector '{collector_key_for_fetch}'"));
                            }

                            let outcome = retry::retry_with_backoff(max_retries, base_backoff, priority, move || {
                                let request = request.clone();
                                let collector = collector.clone();
                                async move { collector.fetch(&request).await }
                            })
                            .await;

                            match outcome {
                                Ok(value) => {
                                    breaker.on_success().await;
                                    Ok(value)
                                }
                                Err(e) => {
                                    breaker.on_failure().await;
                                    Err(e.to_string())
                                }
                            }
                        })
                        .await;

                    dedup_result.map_err(|message| {
                        warn!(collector = %collector_key_owned, error = %message, "collector fetch failed");
                        anyhow!(message)
                    })
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc as StdArc;

    use crate::storage::history_store::HistoryStore;
    use crate::types::CoreError;

    struct CountingCollector {
        calls: StdArc<AtomicUsize>,
        fail_times: usize,
    }

    #[async_trait]
    impl Collector for CountingCollector {
        fn key(&self) -> &'static str {
            "counting"
        }

        async fn fetch(&self, _request: &CollectorRequest) -> Result<serde_json::Value, CoreError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                return Err(CoreError::TransientSource { source: "counting".into(), message: "simulated failure".into() });
            }
            Ok(serde_json::json!({ "n": n }))
        }

        fn ttl(&self, _request: &CollectorRequest) -> Duration {
            Duration::minutes(60)
        }
    }

    async fn test_orchestrator(collector: Arc<dyn Collector>, capacity: f64) -> Orchestrator {
        let mut config = OrchestratorConfig::default();
        config.collectors.insert("counting".to_string(), crate::config::CollectorConfig::defaults_for(capacity));
        let dir = std::env::temp_dir().join(format!("pregame-orch-test-{}", uuid::Uuid::new_v4()));
        let history = HistoryStore::connect("sqlite::memory:").await.unwrap();
        let cache = ThreeTierCache::new(32, dir, history);
        Orchestrator::new(config, vec![collector], cache)
    }

    #[tokio::test]
    async fn test_dispatch_succeeds_and_caches() {
        let calls = StdArc::new(AtomicUsize::new(0));
        let collector: Arc<dyn Collector> = Arc::new(CountingCollector { calls: calls.clone(), fail_times: 0 });
        let orchestrator = test_orchestrator(collector, 10.0).await;

        let outcome = orchestrator.dispatch("counting", CollectorRequest::new(), Priority::Normal).await.unwrap();
        assert!(!outcome.stale);
        let second = orchestrator.dispatch("counting", CollectorRequest::new(), Priority::Normal).await.unwrap();
        assert_eq!(second.value, outcome.value);
        assert_eq!(calls.load(Ordering::SeqCst), 1, "second dispatch should be served from cache");
    }

    #[tokio::test]
    async fn test_dispatch_rejects_unknown_collector() {
        let calls = StdArc::new(AtomicUsize::new(0));
        let collector: Arc<dyn Collector> = Arc::new(CountingCollector { calls, fail_times: 0 });
        let orchestrator = test_orchestrator(collector, 10.0).await;
        let result = orchestrator.dispatch("nonexistent", CollectorRequest::new(), Priority::Normal).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_low_priority_fails_fast_when_bucket_exhausted() {
        let calls = StdArc::new(AtomicUsize::new(0));
        let collector: Arc<dyn Collector> = Arc::new(CountingCollector { calls, fail_times: 0 });
        let orchestrator = test_orchestrator(collector, 1.0).await;

        orchestrator
            .dispatch("counting", CollectorRequest::new().with("x", "1"), Priority::Low)
            .await
            .unwrap();
        let second = orchestrator.dispatch("counting", CollectorRequest::new().with("x", "2"), Priority::Low).await;
        assert!(second.is_err(), "LOW priority must fail fast once the bucket is exhausted");
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failure() {
        let calls = StdArc::new(AtomicUsize::new(0));
        let collector: Arc<dyn Collector> = Arc::new(CountingCollector { calls: calls.clone(), fail_times: 2 });
        let orchestrator = test_orchestrator(collector, 10.0).await;

        let outcome = orchestrator.dispatch("counting", CollectorRequest::new(), Priority::Critical).await.unwrap();
        assert!(!outcome.stale);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    /// A bucket with capacity for exactly one token must not reject any of
    /// N concurrent identical requests: only the dedup leader ever checks
    /// the breaker or draws a token, so the other N-1 never touch either.
    #[tokio::test]
    async fn test_concurrent_identical_dispatch_consumes_single_token() {
        let calls = StdArc::new(AtomicUsize::new(0));
        let collector: Arc<dyn Collector> = Arc::new(CountingCollector { calls: calls.clone(), fail_times: 0 });
        let orchestrator = StdArc::new(test_orchestrator(collector, 1.0).await);

        let mut handles = Vec::new();
        for _ in 0..20 {
            let orchestrator = orchestrator.clone();
            handles.push(tokio::spawn(async move {
                orchestrator.dispatch("counting", CollectorRequest::new().with("x", "shared"), Priority::Normal).await
            }));
        }

        for h in handles {
            h.await.unwrap().expect("follower must not pay the bucket/breaker cost itself");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1, "only the dedup leader should reach the collector");
    }
}
