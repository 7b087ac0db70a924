//! Collector contracts (§4.3.1, §6): one small fetcher per external data
//! type. The core only defines the contract — any conforming implementation
//! of the external interfaces in §6 suffices; collectors here are pure
//! transport-and-parse, with no retry/cache/rate-limit logic of their own
//! (that lives in the Orchestrator).
//!
//! Grounded on `data::DataProvider` (category + fetch + cost) for the trait
//! shape, generalized to a `(key, request) -> parsed JSON` fetcher.

pub mod ai_reasoning;
pub mod efficiency;
pub mod injury;
pub mod odds;
pub mod referee;
pub mod schedule;
pub mod weather;

use async_trait::async_trait;
use chrono::Duration;
use std::collections::BTreeMap;

use crate::types::CoreError;

/// Canonicalized request parameters for one collector call.
#[derive(Debug, Clone, Default)]
pub struct CollectorRequest {
    pub params: BTreeMap<String, String>,
}

impl CollectorRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(|s| s.as_str())
    }

    /// Minutes between `now` and a `kickoff_utc` param, if present and
    /// well-formed. Used to shorten TTLs as kickoff approaches.
    pub fn minutes_to_kickoff(&self) -> Option<i64> {
        let raw = self.get("kickoff_utc")?;
        let kickoff = chrono::DateTime::parse_from_rfc3339(raw).ok()?.with_timezone(&chrono::Utc);
        Some((kickoff - chrono::Utc::now()).num_minutes())
    }
}

#[async_trait]
pub trait Collector: Send + Sync {
    /// Stable name used for rate-limit accounting and cache partitioning.
    fn key(&self) -> &'static str;

    /// Fetch and parse one request. No side effects beyond logging; caching,
    /// retry, and circuit-breaking are the Orchestrator's job.
    async fn fetch(&self, request: &CollectorRequest) -> Result<serde_json::Value, CoreError>;

    /// Dynamic TTL hint for this request, shortened as kickoff approaches.
    fn ttl(&self, request: &CollectorRequest) -> Duration;
}
