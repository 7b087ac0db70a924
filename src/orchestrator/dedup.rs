//! Request deduplicator (§4.3.5): at most one outbound call per canonical
//! `(collector_key, sorted_params)` in flight at any time; all subscribers
//! receive the same result.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

type Shared = Arc<watch::Receiver<Option<Result<serde_json::Value, String>>>>;

pub struct Deduplicator {
    in_flight: Mutex<HashMap<String, Shared>>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self { in_flight: Mutex::new(HashMap::new()) }
    }

    /// Run `fetch` for `canonical_key`, or attach to an identical in-flight
    /// call if one exists. Returns the same result (success or error
    /// message) to every caller.
    pub async fn run_deduplicated<F, Fut>(&self, canonical_key: &str, fetch: F) -> Result<serde_json::Value, String>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<serde_json::Value, String>>,
    {
        let mut guard = self.in_flight.lock().await;
        if let Some(rx) = guard.get(canonical_key).cloned() {
            drop(guard);
            return Self::wait_for(rx).await;
        }

        let (tx, rx) = watch::channel(None);
        guard.insert(canonical_key.to_string(), Arc::new(rx));
        drop(guard);

        let result = fetch().await;
        let _ = tx.send(Some(result.clone()));

        let mut guard = self.in_flight.lock().await;
        guard.remove(canonical_key);
        drop(guard);

        result
    }

    async fn wait_for(mut rx: Shared) -> Result<serde_json::Value, String> {
        loop {
            if let Some(result) = rx.borrow().clone() {
                return result;
            }
            let rx_mut = Arc::make_mut(&mut rx);
            if rx_mut.changed().await.is_err() {
                return Err("in-flight request dropped before completion".to_string());
            }
        }
    }

    /// Canonical key for a collector request: `collector_key` plus params
    /// sorted by name.
    pub fn canonicalize(collector_key: &str, params: &std::collections::BTreeMap<String, String>) -> String {
        let joined = params.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&");
        format!("{collector_key}?{joined}")
    }
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_canonicalize_sorts_params() {
        let mut params = BTreeMap::new();
        params.insert("stadium".to_string(), "KC".to_string());
        params.insert("time".to_string(), "2024-10-01T00:00:00Z".to_string());
        let key = Deduplicator::canonicalize("weather", &params);
        assert_eq!(key, "weather?stadium=KC&time=2024-10-01T00:00:00Z");
    }

    #[tokio::test]
    async fn test_concurrent_identical_requests_single_outbound_call() {
        let dedup = Arc::new(Deduplicator::new());
        let call_count = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..100 {
            let dedup = dedup.clone();
            let call_count = call_count.clone();
            handles.push(tokio::spawn(async move {
                dedup
                    .run_deduplicated("weather?stadium=KC", || {
                        let call_count = call_count.clone();
                        async move {
                            call_count.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                            Ok(serde_json::json!({"wind_mph": 12.0}))
                        }
                    })
                    .await
            }));
        }

        let mut results = Vec::new();
        for h in handles {
            results.push(h.await.unwrap().unwrap());
        }

        assert_eq!(call_count.load(Ordering::SeqCst), 1, "exactly one outbound fetch expected");
        assert!(results.iter().all(|r| *r == serde_json::json!({"wind_mph": 12.0})));
    }

    #[tokio::test]
    async fn test_sequential_requests_each_trigger_own_fetch() {
        let dedup = Deduplicator::new();
        let call_count = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let call_count = call_count.clone();
            dedup
                .run_deduplicated("weather?stadium=KC", || async move {
                    call_count.fetch_add(1, Ordering::SeqCst);
                    Ok(serde_json::json!({"wind_mph": 12.0}))
                })
                .await
                .unwrap();
        }

        assert_eq!(call_count.load(Ordering::SeqCst), 3, "sequential (non-overlapping) calls must not dedup");
    }
}
