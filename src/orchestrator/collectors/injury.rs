//! Injury collector (§6): team-level injury reports with severity buckets
//! `{out, doubtful, questionable, probable}`, timestamped to the report
//! publish time (used verbatim for no-look-ahead replay).

use async_trait::async_trait;
use chrono::Duration;
use reqwest::Client;
use serde::Deserialize;

use super::{Collector, CollectorRequest};
use crate::types::CoreError;

#[derive(Debug, Deserialize, serde::Serialize)]
pub struct InjuryReportEntry {
    pub player: String,
    pub position: String,
    pub severity: String,
    pub published_at: String,
}

pub struct InjuryCollector {
    client: Client,
    base_url: String,
}

impl InjuryCollector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: Client::new(), base_url: base_url.into() }
    }
}

#[async_trait]
impl Collector for InjuryCollector {
    fn key(&self) -> &'static str {
        "injury"
    }

    async fn fetch(&self, request: &CollectorRequest) -> Result<serde_json::Value, CoreError> {
        let team = request.get("team").ok_or_else(|| CoreError::Config("injury request missing team".into()))?;

        let url = format!("{}/injuries", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("team", team)])
            .send()
            .await
            .map_err(|e| CoreError::TransientSource { source: "injury".into(), message: e.to_string() })?;

        if !response.status().is_success() {
            return Err(CoreError::PermanentSource { source: "injury".into(), message: response.status().to_string() });
        }

        let entries: Vec<InjuryReportEntry> = response
            .json()
            .await
            .map_err(|e| CoreError::PermanentSource { source: "injury".into(), message: e.to_string() })?;

        serde_json::to_value(entries).map_err(|e| CoreError::PermanentSource { source: "injury".into(), message: e.to_string() })
    }

    fn ttl(&self, _request: &CollectorRequest) -> Duration {
        Duration::hours(6)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_is_six_hours() {
        let collector = InjuryCollector::new("https://example.invalid");
        assert_eq!(collector.ttl(&CollectorRequest::new()), Duration::hours(6));
    }
}
