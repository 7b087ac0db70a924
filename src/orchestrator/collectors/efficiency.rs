//! Play-by-play / efficiency collector (§6): per-team offensive/defensive
//! efficiency metrics for a completed game, used to build rolling-form
//! features. Refreshed after game completion.

use async_trait::async_trait;
use chrono::Duration;
use reqwest::Client;
use serde::Deserialize;

use super::{Collector, CollectorRequest};
use crate::types::CoreError;

#[derive(Debug, Deserialize, serde::Serialize)]
pub struct TeamEfficiency {
    pub team: String,
    pub off_efficiency: f64,
    pub def_efficiency: f64,
}

pub struct EfficiencyCollector {
    client: Client,
    base_url: String,
}

impl EfficiencyCollector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: Client::new(), base_url: base_url.into() }
    }
}

#[async_trait]
impl Collector for EfficiencyCollector {
    fn key(&self) -> &'static str {
        "efficiency"
    }

    async fn fetch(&self, request: &CollectorRequest) -> Result<serde_json::Value, CoreError> {
        let game_id = request.get("game_id").ok_or_else(|| CoreError::Config("efficiency request missing game_id".into()))?;

        let url = format!("{}/efficiency", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("game_id", game_id)])
            .send()
            .await
            .map_err(|e| CoreError::TransientSource { source: "efficiency".into(), message: e.to_string() })?;

        if !response.status().is_success() {
            return Err(CoreError::PermanentSource { source: "efficiency".into(), message: response.status().to_string() });
        }

        let teams: Vec<TeamEfficiency> = response
            .json()
            .await
            .map_err(|e| CoreError::PermanentSource { source: "efficiency".into(), message: e.to_string() })?;

        serde_json::to_value(teams).map_err(|e| CoreError::PermanentSource { source: "efficiency".into(), message: e.to_string() })
    }

    fn ttl(&self, _request: &CollectorRequest) -> Duration {
        Duration::hours(24)
    }
}
