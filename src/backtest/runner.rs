//! Walk-Forward Backtester (C5, §4.5): replays history through the Decision
//! Engine's own procedure under strict no-look-ahead discipline, settles
//! each reconstructed Recommendation against the actual result, and
//! aggregates performance metrics.
//!
//! Grounded on the teacher's `backtest::runner::Backtester` for the
//! bankroll-walk/trade-log/Sharpe/drawdown shape; per-trade sizing is now
//! delegated to `engine::{features,fusion,staking}` so a backtest run and a
//! live run share the exact same procedure, rather than reimplementing
//! Kelly sizing inline as the teacher's version did.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::warn;

use crate::catalog::EdgeCatalog;
use crate::config::{BacktestConfig, EngineConfig};
use crate::discovery::HistoricalObservation;
use crate::engine::features::{self, GatheredInputs, OddsLine};
use crate::engine::{fusion, staking, Classifier};
use crate::orchestrator::dedup::Deduplicator;
use crate::storage::history_store::HistoryStore;
use crate::types::{BankrollState, Game, GameId, Stadium, Team, WagerSide};

/// Produces a trained classifier from a training window's observations —
/// `retrain(train_window)` in the walk-forward loop.
pub trait ClassifierTrainer: Send + Sync {
    fn train(&self, training_set: &[HistoricalObservation]) -> Arc<dyn Classifier>;
}

/// One game's reconstructed, settled outcome from a backtest run.
#[derive(Debug, Clone)]
pub struct SettledTrade {
    pub game_id: GameId,
    pub stake_amount: Decimal,
    pub profit: Decimal,
    pub clv: f64,
    pub won: bool,
    pub week_index: u32,
}

#[derive(Debug, Clone)]
pub struct BacktestReport {
    pub initial_bankroll: Decimal,
    pub final_bankroll: Decimal,
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub roi: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown_pct: f64,
    pub average_clv: f64,
    pub trade_log: Vec<SettledTrade>,
}

/// Reconstructs the exact inputs the live Decision Engine would have
/// gathered as of a past instant, by replaying the append-only history
/// tier instead of dispatching live fetches (§4.5: "line quotes consulted
/// are the quotes observed at t"). Request keys are derived the same way
/// the live Orchestrator derives them, so a replayed lookup hits exactly
/// the record a live dispatch would have written.
pub struct ReplaySource<'a> {
    history: &'a HistoryStore,
}

impl<'a> ReplaySource<'a> {
    pub fn new(history: &'a HistoryStore) -> Self {
        Self { history }
    }

    async fn lookup(&self, collector_key: &str, params: &[(&str, String)], as_of: DateTime<Utc>) -> Option<serde_json::Value> {
        let mut map = std::collections::BTreeMap::new();
        for (k, v) in params {
            map.insert((*k).to_string(), v.clone());
        }
        let request_key = Deduplicator::canonicalize(collector_key, &map);
        match self.history.as_of(collector_key, &request_key, as_of).await {
            Ok(Some(record)) => Some(record.value),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, collector_key, "history replay lookup failed");
                None
            }
        }
    }

    pub async fn gather_inputs(&self, game: &Game, stadium: &Stadium, as_of: DateTime<Utc>) -> GatheredInputs {
        let home = game.id.home.clone();
        let away = game.id.away.clone();
        let game_id = game.id.to_string();
        let mut inputs = GatheredInputs::default();

        if let Some(value) = self.lookup("efficiency", &[("game_id", game_id.clone()), ("team", home.clone())], as_of).await {
            if let Ok(teams) = serde_json::from_value::<Vec<crate::orchestrator::collectors::efficiency::TeamEfficiency>>(value) {
                if let Some(team) = teams.into_iter().find(|t| t.team == home) {
                    inputs.home_efficiency = Some((team, as_of));
                }
            }
        }
        if let Some(value) = self.lookup("efficiency", &[("game_id", game_id.clone()), ("team", away.clone())], as_of).await {
            if let Ok(teams) = serde_json::from_value::<Vec<crate::orchestrator::collectors::efficiency::TeamEfficiency>>(value) {
                if let Some(team) = teams.into_iter().find(|t| t.team == away) {
                    inputs.away_efficiency = Some((team, as_of));
                }
            }
        }
        if let Some(value) = self
            .lookup(
                "weather",
                &[("lat", stadium.lat.to_string()), ("lon", stadium.lon.to_string()), ("target_time", game.kickoff_utc.to_rfc3339())],
                as_of,
            )
            .await
        {
            if let (Some(wind), Some(temp), Some(precip)) =
                (value.get("surface_wind_mph").and_then(|x| x.as_f64()), value.get("temp_f").and_then(|x| x.as_f64()), value.get("precip_prob").and_then(|x| x.as_f64()))
            {
                inputs.weather = Some((wind, temp, precip, as_of));
            }
        }
        if let Some(value) = self.lookup("injury", &[("team", home.clone())], as_of).await {
            if let Ok(entries) = serde_json::from_value(value) {
                inputs.home_injuries = Some((entries, as_of));
            }
        }
        if let Some(value) = self.lookup("injury", &[("team", away.clone())], as_of).await {
            if let Ok(entries) = serde_json::from_value(value) {
                inputs.away_injuries = Some((entries, as_of));
            }
        }
        if let Some(value) = self.lookup("referee", &[("game_id", game_id.clone())], as_of).await {
            if let Ok(aggregate) = serde_json::from_value(value) {
                inputs.referee = Some((aggregate, as_of));
            }
        }
        if let Some(value) = self.lookup("odds", &[("game_id", game_id)], as_of).await {
            if let Ok(tuples) = serde_json::from_value::<Vec<crate::orchestrator::collectors::odds::OddsTuple>>(value) {
                inputs.odds = tuples.into_iter().filter_map(parse_odds_line).collect();
            }
        }

        inputs
    }

    /// Closing-line odds for one side: the latest quote on record as of
    /// kickoff, used for the CLV calculation.
    pub async fn closing_line(&self, game: &Game, side: WagerSide) -> Option<OddsLine> {
        let value = self.lookup("odds", &[("game_id", game.id.to_string())], game.kickoff_utc).await?;
        let tuples: Vec<crate::orchestrator::collectors::odds::OddsTuple> = serde_json::from_value(value).ok()?;
        tuples
            .into_iter()
            .filter_map(parse_odds_line)
            .filter(|l| l.side == side)
            .min_by(|a, b| a.implied_probability().partial_cmp(&b.implied_probability()).unwrap())
    }
}

fn parse_odds_line(tuple: crate::orchestrator::collectors::odds::OddsTuple) -> Option<OddsLine> {
    let side = match tuple.side.to_lowercase().as_str() {
        "home" => WagerSide::Home,
        "away" => WagerSide::Away,
        "over" => WagerSide::Over,
        "under" => WagerSide::Under,
        _ => return None,
    };
    let observed_at = DateTime::parse_from_rfc3339(&tuple.observed_at).ok()?.with_timezone(&Utc);
    Some(OddsLine { side, book: tuple.book, american_odds: tuple.american_odds, observed_at })
}

pub struct WalkForwardRunner<'a> {
    pub config: BacktestConfig,
    pub engine_config: EngineConfig,
    pub catalog: Arc<EdgeCatalog>,
    pub trainer: Arc<dyn ClassifierTrainer>,
    pub replay: ReplaySource<'a>,
}

impl<'a> WalkForwardRunner<'a> {
    /// Run the walk-forward loop over `games` (any order) and `history`
    /// (one `HistoricalObservation` per completed game, used to carve the
    /// `train_window` for each retrain). `teams` is mutated in place: each
    /// completed game updates both teams' Elo via `Team::apply_result`
    /// before the next chronological game reads it, so the classifier's
    /// Elo-derived features evolve across the replay the same way they
    /// would under live schedule ingestion (spec.md:38/201).
    pub async fn run(
        &self,
        games: &[Game],
        stadiums: &HashMap<String, Stadium>,
        teams: &mut HashMap<String, Team>,
        history: &[HistoricalObservation],
        initial_bankroll: Decimal,
        cutoff: Duration,
    ) -> Result<BacktestReport> {
        let mut bankroll = BankrollState::new(initial_bankroll, 50);
        let mut trade_log: Vec<SettledTrade> = Vec::new();
        let mut max_dd = 0.0_f64;

        let mut sorted_games: Vec<&Game> = games.iter().collect();
        sorted_games.sort_by_key(|g| g.kickoff_utc);

        let window_start = match sorted_games.first() {
            Some(g) => g.kickoff_utc,
            None => return Ok(summarize(initial_bankroll, initial_bankroll, trade_log, 0.0)),
        };
        let window_end = sorted_games.last().unwrap().kickoff_utc;

        let train_span = Duration::days(365 * self.config.train_years as i64);
        let validate_span = Duration::days(365 * self.config.validate_years as i64);

        let mut t = window_start;
        while t <= window_end {
            let train_window_start = t - train_span;
            let validate_window_end = t + validate_span;

            let training_set: Vec<HistoricalObservation> =
                history.iter().filter(|h| h.game.kickoff_utc >= train_window_start && h.game.kickoff_utc < t).cloned().collect();
            let classifier = self.trainer.train(&training_set);

            let validate_games: Vec<&&Game> = sorted_games.iter().filter(|g| g.kickoff_utc >= t && g.kickoff_utc < validate_window_end).collect();

            for game in validate_games {
                let game: &Game = game;
                let Some(stadium) = stadiums.get(&game.id.home) else { continue };
                if !game.is_completed() {
                    continue;
                }
                let (Some(home_elo), Some(away_elo)) = (teams.get(&game.id.home).map(|t| t.elo), teams.get(&game.id.away).map(|t| t.elo)) else {
                    continue;
                };

                // Apply this game's Elo update before anything else reads
                // `teams`, so every later game in this chronological pass
                // sees the post-game rating, not the pre-game one just used
                // to build this game's own feature vector.
                let margin = game.result().expect("is_completed() implies final_score is Some");
                if let Some(home_team) = teams.get_mut(&game.id.home) {
                    home_team.apply_result(away_elo, margin, true);
                }
                if let Some(away_team) = teams.get_mut(&game.id.away) {
                    away_team.apply_result(home_elo, margin, false);
                }

                let as_of = game.kickoff_utc - cutoff;

                let inputs = self.replay.gather_inputs(game, stadium, as_of).await;
                let fv = match features::build_feature_vector(game, stadium, home_elo, away_elo, 7, 7, as_of, &inputs) {
                    Ok(fv) => fv,
                    Err(e) => {
                        warn!(game_id = %game.id, error = %e, "look-ahead violation during replay, skipping game");
                        continue;
                    }
                };

                let model_prob = match classifier.predict(&fv).await {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(game_id = %game.id, error = %e, "classifier failed during replay, skipping game");
                        continue;
                    }
                };

                let Some((model_side, best_line, side_model_prob, raw_edge)) = features::pick_side(model_prob, &inputs.odds) else { continue };

                let matched = self.catalog.matching_active(&fv, game).await?;
                let base_confidence = (0.5 + raw_edge.abs() * 2.0).min(1.0);
                let fused = fusion::fuse(&matched, model_side, base_confidence);

                let min_edge = if fused.matched_edges.is_empty() { self.engine_config.min_edge_no_match } else { self.engine_config.min_edge_with_match };
                if raw_edge < min_edge || fused.confidence < self.engine_config.min_confidence {
                    continue;
                }

                let sized = staking::size_stake(&self.engine_config, side_model_prob, best_line.american_odds, fused.confidence, fused.max_historical_edge, &bankroll, weekly_sharpe(&trade_log));
                if sized.stake_fraction <= Decimal::ZERO {
                    continue;
                }

                let won = match fused.side {
                    WagerSide::Home => margin > 0,
                    WagerSide::Away => margin < 0,
                    WagerSide::Over | WagerSide::Under => continue,
                };

                let payout_ratio = if best_line.american_odds > 0 {
                    best_line.american_odds as f64 / 100.0
                } else {
                    100.0 / (best_line.american_odds.unsigned_abs() as f64)
                };
                let profit = if won { sized.stake_amount * Decimal::from_f64(payout_ratio).unwrap_or(dec!(0)) } else { -sized.stake_amount };

                let clv = match self.replay.closing_line(game, fused.side).await {
                    Some(closing) => best_line.implied_probability() - closing.implied_probability(),
                    None => 0.0,
                };

                bankroll.record_settlement(won, profit);
                let dd = bankroll.drawdown();
                if dd > max_dd {
                    max_dd = dd;
                }

                trade_log.push(SettledTrade {
                    game_id: game.id.clone(),
                    stake_amount: sized.stake_amount,
                    profit,
                    clv,
                    won,
                    week_index: game.id.season as u32 * 100 + game.id.week as u32,
                });
            }

            t += validate_span;
        }

        Ok(summarize(initial_bankroll, bankroll.balance, trade_log, max_dd))
    }
}

/// Sharpe ratio over weekly return buckets (§4.5: "Sharpe using weekly
/// return buckets"), rather than per-trade returns — pooling same-week
/// trades before computing the return series avoids inflating the ratio
/// with correlated same-slate bets.
fn weekly_sharpe(trade_log: &[SettledTrade]) -> f64 {
    if trade_log.len() < 2 {
        return 0.0;
    }

    let mut by_week: HashMap<u32, (Decimal, Decimal)> = HashMap::new();
    for trade in trade_log {
        let entry = by_week.entry(trade.week_index).or_insert((Decimal::ZERO, Decimal::ZERO));
        entry.0 += trade.profit;
        entry.1 += trade.stake_amount;
    }

    let weekly_returns: Vec<f64> =
        by_week.values().filter(|(_, staked)| *staked > Decimal::ZERO).map(|(profit, staked)| (*profit / *staked).to_f64().unwrap_or(0.0)).collect();

    if weekly_returns.len() < 2 {
        return 0.0;
    }

    let n = weekly_returns.len() as f64;
    let mean = weekly_returns.iter().sum::<f64>() / n;
    let variance = weekly_returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std_dev = variance.sqrt();
    if std_dev < 1e-10 {
        return 0.0;
    }
    (mean / std_dev) * 17.0_f64.sqrt()
}

fn summarize(initial_bankroll: Decimal, final_bankroll: Decimal, trade_log: Vec<SettledTrade>, max_dd: f64) -> BacktestReport {
    let total_trades = trade_log.len();
    let wins = trade_log.iter().filter(|t| t.won).count();
    let losses = total_trades - wins;
    let win_rate = if total_trades > 0 { wins as f64 / total_trades as f64 } else { 0.0 };
    let total_staked: Decimal = trade_log.iter().map(|t| t.stake_amount).sum();
    let total_profit: Decimal = trade_log.iter().map(|t| t.profit).sum();
    let roi = if total_staked > Decimal::ZERO { (total_profit / total_staked).to_f64().unwrap_or(0.0) } else { 0.0 };
    let average_clv = if total_trades > 0 { trade_log.iter().map(|t| t.clv).sum::<f64>() / total_trades as f64 } else { 0.0 };
    let sharpe_ratio = weekly_sharpe(&trade_log);

    BacktestReport { initial_bankroll, final_bankroll, total_trades, wins, losses, win_rate, roi, sharpe_ratio, max_drawdown_pct: max_dd * 100.0, average_clv, trade_log }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weekly_sharpe_zero_returns_zero() {
        assert_eq!(weekly_sharpe(&[]), 0.0);
    }

    #[test]
    fn test_weekly_sharpe_pools_same_week_trades() {
        let trades = vec![
            SettledTrade { game_id: GameId { season: 2024, week: 1, home: "A".into(), away: "B".into() }, stake_amount: dec!(100), profit: dec!(90), clv: 0.01, won: true, week_index: 202401 },
            SettledTrade { game_id: GameId { season: 2024, week: 1, home: "C".into(), away: "D".into() }, stake_amount: dec!(100), profit: dec!(-100), clv: -0.01, won: false, week_index: 202401 },
            SettledTrade { game_id: GameId { season: 2024, week: 2, home: "E".into(), away: "F".into() }, stake_amount: dec!(100), profit: dec!(80), clv: 0.02, won: true, week_index: 202402 },
        ];
        // two weekly buckets -> a defined (not NaN) sharpe
        let sharpe = weekly_sharpe(&trades);
        assert!(sharpe.is_finite());
    }

    #[test]
    fn test_summarize_empty_trade_log() {
        let report = summarize(dec!(1000), dec!(1000), vec![], 0.0);
        assert_eq!(report.total_trades, 0);
        assert_eq!(report.win_rate, 0.0);
        assert_eq!(report.roi, 0.0);
    }

    #[test]
    fn test_summarize_computes_roi_and_win_rate() {
        let trades = vec![
            SettledTrade { game_id: GameId { season: 2024, week: 1, home: "A".into(), away: "B".into() }, stake_amount: dec!(100), profit: dec!(90), clv: 0.0, won: true, week_index: 1 },
            SettledTrade { game_id: GameId { season: 2024, week: 2, home: "C".into(), away: "D".into() }, stake_amount: dec!(100), profit: dec!(-100), clv: 0.0, won: false, week_index: 2 },
        ];
        let report = summarize(dec!(1000), dec!(990), trades, 0.01);
        assert_eq!(report.total_trades, 2);
        assert_eq!(report.wins, 1);
        assert_eq!(report.losses, 1);
        assert!((report.win_rate - 0.5).abs() < 1e-9);
        assert!((report.roi + 0.05).abs() < 1e-9); // (-10)/200 = -0.05
    }
}
