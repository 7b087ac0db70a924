//! Schedule collector (§6): games for a week — `{game_id, season, week,
//! home, away, kickoff_utc, stadium_ref, status, final_score?}`. Refresh
//! cadence is daily per the spec; the Orchestrator enforces that via TTL.

use async_trait::async_trait;
use chrono::Duration;
use reqwest::Client;
use serde::Deserialize;

use super::{Collector, CollectorRequest};
use crate::types::CoreError;

#[derive(Debug, Deserialize, serde::Serialize)]
pub struct ScheduledGame {
    pub game_id: String,
    pub season: u32,
    pub week: u32,
    pub home: String,
    pub away: String,
    pub kickoff_utc: String,
    pub stadium_ref: String,
    pub status: String,
    #[serde(default)]
    pub final_score: Option<serde_json::Value>,
}

pub struct ScheduleCollector {
    client: Client,
    base_url: String,
}

impl ScheduleCollector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: Client::new(), base_url: base_url.into() }
    }
}

#[async_trait]
impl Collector for ScheduleCollector {
    fn key(&self) -> &'static str {
        "schedule"
    }

    async fn fetch(&self, request: &CollectorRequest) -> Result<serde_json::Value, CoreError> {
        let season = request.get("season").ok_or_else(|| CoreError::Config("schedule request missing season".into()))?;
        let week = request.get("week").ok_or_else(|| CoreError::Config("schedule request missing week".into()))?;

        let url = format!("{}/schedule", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("season", season), ("week", week)])
            .send()
            .await
            .map_err(|e| CoreError::TransientSource { source: "schedule".into(), message: e.to_string() })?;

        if !response.status().is_success() {
            return Err(CoreError::PermanentSource { source: "schedule".into(), message: response.status().to_string() });
        }

        let games: Vec<ScheduledGame> = response
            .json()
            .await
            .map_err(|e| CoreError::PermanentSource { source: "schedule".into(), message: e.to_string() })?;

        serde_json::to_value(games).map_err(|e| CoreError::PermanentSource { source: "schedule".into(), message: e.to_string() })
    }

    fn ttl(&self, _request: &CollectorRequest) -> Duration {
        Duration::hours(24)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_is_24_hours() {
        let collector = ScheduleCollector::new("https://example.invalid");
        assert_eq!(collector.ttl(&CollectorRequest::new()), Duration::hours(24));
    }
}
