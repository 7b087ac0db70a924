//! Referee collector (§6): historical per-official aggregates — home-team
//! win rate, penalty rate, total-points tendency — resolved by `game_id`
//! (the assigned official for a game is looked up server-side; this crate
//! has no official-assignment data of its own). Low refresh cadence; these
//! aggregates only move as the official works more games.

use async_trait::async_trait;
use chrono::Duration;
use reqwest::Client;
use serde::Deserialize;

use super::{Collector, CollectorRequest};
use crate::types::CoreError;

#[derive(Debug, Deserialize, serde::Serialize)]
pub struct RefereeAggregate {
    pub official: String,
    pub home_win_rate: f64,
    pub penalty_rate: f64,
    pub total_points_tendency: f64,
}

pub struct RefereeCollector {
    client: Client,
    base_url: String,
}

impl RefereeCollector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: Client::new(), base_url: base_url.into() }
    }
}

#[async_trait]
impl Collector for RefereeCollector {
    fn key(&self) -> &'static str {
        "referee"
    }

    async fn fetch(&self, request: &CollectorRequest) -> Result<serde_json::Value, CoreError> {
        let game_id = request.get("game_id").ok_or_else(|| CoreError::Config("referee request missing game_id".into()))?;

        // The assigned official isn't known to this crate (no such field on
        // `Game`/`types.rs`) — the service resolves game_id -> official ->
        // aggregate server-side, the same way `odds`/`efficiency` resolve
        // their own per-game lookups.
        let url = format!("{}/referees", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("game_id", game_id)])
            .send()
            .await
            .map_err(|e| CoreError::TransientSource { source: "referee".into(), message: e.to_string() })?;

        if !response.status().is_success() {
            return Err(CoreError::PermanentSource { source: "referee".into(), message: response.status().to_string() });
        }

        let aggregate: RefereeAggregate = response
            .json()
            .await
            .map_err(|e| CoreError::PermanentSource { source: "referee".into(), message: e.to_string() })?;

        serde_json::to_value(aggregate).map_err(|e| CoreError::PermanentSource { source: "referee".into(), message: e.to_string() })
    }

    fn ttl(&self, _request: &CollectorRequest) -> Duration {
        Duration::days(7)
    }
}
