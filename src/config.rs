//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs, one
//! nested struct per subsystem. Every tunable named in the spec (min_sample,
//! min_confidence, min_edge, Kelly fraction base, TTLs, circuit-breaker
//! thresholds, retry budgets, priority-wait thresholds, lead time before
//! kickoff, discovery cadence, walk-forward windows) lives here — none of
//! them are literals in code. Secrets (API keys) are referenced by env-var
//! name and resolved at runtime via `AppConfig::resolve_env`, exactly as the
//! teacher's `config.rs` does it.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub core: CoreConfig,
    pub catalog: CatalogConfig,
    pub discovery: DiscoveryConfig,
    pub orchestrator: OrchestratorConfig,
    pub engine: EngineConfig,
    pub backtest: BacktestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CoreConfig {
    pub name: String,
    pub database_url: String,
    pub initial_bankroll: f64,
    pub currency: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            name: "pregame-core".to_string(),
            database_url: "sqlite::memory:".to_string(),
            initial_bankroll: 10_000.0,
            currency: "USD".to_string(),
        }
    }
}

/// Edge Catalog tunables (§4.1).
#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    /// Predicate similarity at/above which two edges are considered the
    /// same hypothesis.
    pub similarity_threshold: f64,
    /// Minimum win-rate/ROI improvement (percentage points, as a fraction)
    /// a near-duplicate candidate must show to trigger a version bump.
    pub min_improvement_pp: f64,
    /// Minimum sample-size ratio (candidate / incumbent) required for a
    /// version bump.
    pub min_sample_multiplier: f64,
    /// Minimum sample size for an edge to ever become active.
    pub min_sample: u32,
    /// Maximum p-value for activation.
    pub max_p_value: f64,
    /// Recent win rate must not fall below `break_even(-110) - decay_margin`.
    pub decay_margin: f64,
    /// Trailing-window size (observation count) used for `recent_stats` and
    /// decay detection.
    pub recent_window_size: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            min_improvement_pp: 0.05,
            min_sample_multiplier: 1.5,
            min_sample: 100,
            max_p_value: 0.01,
            decay_margin: 0.02,
            recent_window_size: 150,
        }
    }
}

/// Edge Discoverer tunables (§4.2).
#[derive(Debug, Deserialize, Clone)]
pub struct DiscoveryConfig {
    pub start_season_lookback: u32,
    pub min_sample: u32,
    pub max_p_value: f64,
    pub holdout_seasons: u32,
    pub min_interaction_support: u32,
    pub cadence_days: u32,
    pub ai_proposer_enabled: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            start_season_lookback: 8,
            min_sample: 100,
            max_p_value: 0.01,
            holdout_seasons: 2,
            min_interaction_support: 100,
            cadence_days: 7,
            ai_proposer_enabled: false,
        }
    }
}

/// Per-collector rate-limit/TTL/timeout sub-table.
#[derive(Debug, Deserialize, Clone)]
pub struct CollectorConfig {
    pub capacity: f64,
    pub refill_per_day: f64,
    pub ttl_far_mins: u64,
    pub ttl_near_mins: u64,
    pub ttl_imminent_mins: u64,
    pub timeout_secs: u64,
    pub max_parallel: usize,
}

impl CollectorConfig {
    pub fn defaults_for(capacity: f64) -> Self {
        Self {
            capacity,
            refill_per_day: capacity,
            ttl_far_mins: 60,
            ttl_near_mins: 15,
            ttl_imminent_mins: 2,
            timeout_secs: 10,
            max_parallel: 4,
        }
    }
}

/// Intelligence Orchestrator tunables (§4.3).
#[derive(Debug, Deserialize, Clone)]
pub struct OrchestratorConfig {
    pub collectors: HashMap<String, CollectorConfig>,
    pub circuit_failure_threshold: u32,
    pub circuit_cooloff_secs: u64,
    pub circuit_half_open_successes: u32,
    pub priority_wait_low_secs: u64,
    pub priority_wait_normal_secs: u64,
    pub priority_wait_high_secs: u64,
    pub max_retries: u32,
    pub retry_base_backoff_ms: u64,
    pub hot_cache_capacity: usize,
    pub file_cache_dir: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        let mut collectors = HashMap::new();
        collectors.insert("schedule".to_string(), CollectorConfig::defaults_for(200.0));
        collectors.insert("efficiency".to_string(), CollectorConfig::defaults_for(200.0));
        collectors.insert("odds".to_string(), CollectorConfig::defaults_for(500.0));
        collectors.insert("weather".to_string(), CollectorConfig::defaults_for(300.0));
        collectors.insert("injury".to_string(), CollectorConfig::defaults_for(150.0));
        collectors.insert("referee".to_string(), CollectorConfig::defaults_for(50.0));
        collectors.insert("ai_reasoning".to_string(), CollectorConfig::defaults_for(20.0));
        Self {
            collectors,
            circuit_failure_threshold: 5,
            circuit_cooloff_secs: 60,
            circuit_half_open_successes: 2,
            priority_wait_low_secs: 120,
            priority_wait_normal_secs: 60,
            priority_wait_high_secs: 30,
            max_retries: 3,
            retry_base_backoff_ms: 1_000,
            hot_cache_capacity: 4_096,
            file_cache_dir: "cache".to_string(),
        }
    }
}

impl OrchestratorConfig {
    /// Conservative default applied to a collector key with no declared
    /// sub-table (spec §4.3.3: "unknown collectors receive a conservative
    /// default").
    pub fn collector_or_default(&self, key: &str) -> CollectorConfig {
        self.collectors.get(key).cloned().unwrap_or_else(|| CollectorConfig::defaults_for(100.0))
    }
}

/// Decision Engine tunables (§4.4).
#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    pub min_edge_no_match: f64,
    pub min_edge_with_match: f64,
    pub min_confidence: f64,
    pub kelly_fraction_base: f64,
    pub stake_cap_pct: f64,
    pub stake_floor_pct: f64,
    pub lead_time_mins: i64,
    pub rolling_window: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_edge_no_match: 0.03,
            min_edge_with_match: 0.02,
            min_confidence: 0.55,
            kelly_fraction_base: 0.25,
            stake_cap_pct: 0.10,
            stake_floor_pct: 0.001,
            lead_time_mins: 10,
            rolling_window: 50,
        }
    }
}

/// Walk-Forward Backtester tunables (§4.5).
#[derive(Debug, Deserialize, Clone)]
pub struct BacktestConfig {
    pub train_years: i32,
    pub validate_years: i32,
    pub pattern_min_sample: u32,
    pub pattern_min_lift_pp: f64,
    pub pattern_max_p_value: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            train_years: 5,
            validate_years: 1,
            pattern_min_sample: 20,
            pattern_min_lift_pp: 0.03,
            pattern_max_p_value: 0.01,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            core: CoreConfig::default(),
            catalog: CatalogConfig::default(),
            discovery: DiscoveryConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            engine: EngineConfig::default(),
            backtest: BacktestConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value. Used for secrets
    /// referenced in the config by name (e.g. odds provider API keys).
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config() {
        // This test requires config.toml to be in the working directory.
        // In CI, copy config.toml to the test working dir.
        let result = AppConfig::load("config.toml");
        if let Ok(cfg) = result {
            assert!(cfg.core.initial_bankroll > 0.0);
            assert!(cfg.catalog.similarity_threshold > 0.0 && cfg.catalog.similarity_threshold <= 1.0);
            assert!(cfg.engine.kelly_fraction_base > 0.0 && cfg.engine.kelly_fraction_base <= 1.0);
        }
        // If config.toml isn't found, that's acceptable in some test environments.
    }

    #[test]
    fn test_default_catalog_config_matches_spec_thresholds() {
        let cfg = CatalogConfig::default();
        assert_eq!(cfg.similarity_threshold, 0.85);
        assert_eq!(cfg.min_sample, 100);
        assert_eq!(cfg.max_p_value, 0.01);
    }

    #[test]
    fn test_collector_or_default_falls_back_for_unknown_key() {
        let cfg = OrchestratorConfig::default();
        let unknown = cfg.collector_or_default("some_new_source");
        assert_eq!(unknown.capacity, 100.0);
        let known = cfg.collector_or_default("odds");
        assert_eq!(known.capacity, 500.0);
    }

    #[test]
    fn test_engine_config_clamp_bounds() {
        let cfg = EngineConfig::default();
        assert!(cfg.stake_cap_pct <= 0.10 + f64::EPSILON);
        assert!(cfg.min_edge_with_match < cfg.min_edge_no_match);
    }
}
