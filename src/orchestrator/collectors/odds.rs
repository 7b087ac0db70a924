//! Odds collector (§6): one or more `{book, market, side, american_odds,
//! decimal_odds, observed_at}` tuples per upcoming game. Multi-book
//! aggregation is required upstream for best-line selection; this collector
//! only returns the raw per-book table.

use async_trait::async_trait;
use chrono::Duration;
use reqwest::Client;
use serde::Deserialize;

use super::{Collector, CollectorRequest};
use crate::types::CoreError;

#[derive(Debug, Deserialize, serde::Serialize)]
pub struct OddsTuple {
    pub book: String,
    pub market: String,
    pub side: String,
    pub american_odds: i32,
    pub decimal_odds: f64,
    pub observed_at: String,
}

pub struct OddsCollector {
    client: Client,
    base_url: String,
}

impl OddsCollector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: Client::new(), base_url: base_url.into() }
    }
}

#[async_trait]
impl Collector for OddsCollector {
    fn key(&self) -> &'static str {
        "odds"
    }

    async fn fetch(&self, request: &CollectorRequest) -> Result<serde_json::Value, CoreError> {
        let game_id = request.get("game_id").ok_or_else(|| CoreError::Config("odds request missing game_id".into()))?;

        let url = format!("{}/odds", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("game_id", game_id)])
            .send()
            .await
            .map_err(|e| CoreError::TransientSource { source: "odds".into(), message: e.to_string() })?;

        if !response.status().is_success() {
            return Err(CoreError::PermanentSource { source: "odds".into(), message: response.status().to_string() });
        }

        let quotes: Vec<OddsTuple> = response
            .json()
            .await
            .map_err(|e| CoreError::PermanentSource { source: "odds".into(), message: e.to_string() })?;

        serde_json::to_value(quotes).map_err(|e| CoreError::PermanentSource { source: "odds".into(), message: e.to_string() })
    }

    fn ttl(&self, request: &CollectorRequest) -> Duration {
        crate::orchestrator::cache::dynamic_ttl(60, 15, 2, request.minutes_to_kickoff())
    }
}
