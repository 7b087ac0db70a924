//! Weather collector (§6): forecast at `(lat, lon, target_time)`.
//!
//! Uses the free Open-Meteo API, same as the teacher's `data::weather`
//! provider — no key required, generous rate limit, and it supports the
//! historical archive endpoint the Backtester needs for `as_of` replay.

use async_trait::async_trait;
use chrono::Duration;
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use super::{Collector, CollectorRequest};
use crate::types::CoreError;

const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";
const ARCHIVE_URL: &str = "https://archive-api.open-meteo.com/v1/archive";

#[derive(Debug, Deserialize, serde::Serialize)]
struct OpenMeteoHourly {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    wind_speed_10m: Vec<f64>,
    #[serde(default)]
    wind_gusts_10m: Vec<f64>,
    #[serde(default)]
    temperature_2m: Vec<f64>,
    #[serde(default)]
    precipitation_probability: Vec<f64>,
    #[serde(default)]
    visibility: Vec<f64>,
    #[serde(default)]
    cloud_cover: Vec<f64>,
}

#[derive(Debug, Deserialize, serde::Serialize)]
struct OpenMeteoResponse {
    #[serde(default)]
    hourly: Option<OpenMeteoHourly>,
}

pub struct WeatherCollector {
    client: Client,
}

impl WeatherCollector {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }
}

impl Default for WeatherCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Collector for WeatherCollector {
    fn key(&self) -> &'static str {
        "weather"
    }

    async fn fetch(&self, request: &CollectorRequest) -> Result<serde_json::Value, CoreError> {
        let lat = request.get("lat").ok_or_else(|| CoreError::Config("weather request missing lat".into()))?;
        let lon = request.get("lon").ok_or_else(|| CoreError::Config("weather request missing lon".into()))?;
        let target_time = request.get("target_time");
        let historical = request.get("historical").map(|v| v == "true").unwrap_or(false);

        let url = if historical { ARCHIVE_URL } else { FORECAST_URL };
        let mut query = vec![
            ("latitude".to_string(), lat.to_string()),
            ("longitude".to_string(), lon.to_string()),
            (
                "hourly".to_string(),
                "wind_speed_10m,wind_gusts_10m,temperature_2m,precipitation_probability,visibility,cloud_cover".to_string(),
            ),
            ("temperature_unit".to_string(), "fahrenheit".to_string()),
            ("wind_speed_unit".to_string(), "mph".to_string()),
        ];
        if let Some(date) = target_time.and_then(|t| t.split('T').next()) {
            query.push(("start_date".to_string(), date.to_string()));
            query.push(("end_date".to_string(), date.to_string()));
        }

        let response = self.client.get(url).query(&query).send().await.map_err(|e| CoreError::TransientSource {
            source: "weather".into(),
            message: e.to_string(),
        })?;

        if !response.status().is_success() {
            return Err(CoreError::PermanentSource { source: "weather".into(), message: response.status().to_string() });
        }

        let parsed: OpenMeteoResponse = response
            .json()
            .await
            .map_err(|e| CoreError::PermanentSource { source: "weather".into(), message: e.to_string() })?;

        let hourly = parsed.hourly.unwrap_or(OpenMeteoHourly {
            time: vec![],
            wind_speed_10m: vec![],
            wind_gusts_10m: vec![],
            temperature_2m: vec![],
            precipitation_probability: vec![],
            visibility: vec![],
            cloud_cover: vec![],
        });

        let idx = target_time
            .and_then(|t| hourly.time.iter().position(|h| h.starts_with(&t[..13.min(t.len())])))
            .unwrap_or(0);

        if idx >= hourly.time.len() {
            warn!(lat, lon, "weather response had no matching hour, using midnight default");
        }

        let at = |series: &[f64]| series.get(idx).copied().unwrap_or(0.0);

        Ok(serde_json::json!({
            "surface_wind_mph": at(&hourly.wind_speed_10m),
            "gust_mph": at(&hourly.wind_gusts_10m),
            "temp_f": at(&hourly.temperature_2m),
            "precip_prob": at(&hourly.precipitation_probability) / 100.0,
            "visibility": at(&hourly.visibility),
            "cloud_cover": at(&hourly.cloud_cover),
            "as_of": chrono::Utc::now().to_rfc3339(),
        }))
    }

    fn ttl(&self, request: &CollectorRequest) -> Duration {
        crate::orchestrator::cache::dynamic_ttl(60, 60, 15, request.minutes_to_kickoff())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_missing_lat_is_config_error() {
        let collector = WeatherCollector::new();
        let request = CollectorRequest::new().with("lon", "-94.48");
        let result = tokio_test::block_on(collector.fetch(&request));
        assert!(matches!(result, Err(CoreError::Config(_))));
    }

    #[test]
    fn test_ttl_defaults_to_far_window_without_kickoff_hint() {
        let collector = WeatherCollector::new();
        let request = CollectorRequest::new();
        assert_eq!(collector.ttl(&request), Duration::minutes(60));
    }
}
