//! Pregame Decision Engine (C4, §4.4): the per-game procedure that turns
//! an Orchestrator's raw collector outputs into a staked `Recommendation`,
//! or a documented no-op (skip, stale-flagged proceed, or hard error).
//!
//! Concurrent-fetch-then-barrier is grounded on
//! `engine::scanner::MarketRouter::scan_all`'s `tokio::join!` fan-out;
//! catalog fusion is grounded on `strategy::edge::EdgeDetector`'s
//! category-threshold gate; staking is grounded on
//! `strategy::kelly::KellyCalculator`.

pub mod baseline;
pub mod emitter;
pub mod features;
pub mod fusion;
pub mod staking;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::catalog::EdgeCatalog;
use crate::config::EngineConfig;
use crate::orchestrator::collectors::CollectorRequest;
use crate::orchestrator::priority_queue::Priority;
use crate::orchestrator::Orchestrator;
use crate::types::{BankrollState, CoreError, FeatureVector, Game, Recommendation, Stadium, Team, WagerSide};
use features::{GatheredInputs, OddsLine};

/// Opaque prediction artifact: `p_home_win = classifier.predict(features)`.
/// The core ships no particular model; any implementation conforming to
/// this trait plugs in unchanged.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn predict(&self, features: &FeatureVector) -> Result<f64, CoreError>;
}

pub struct DecisionEngine {
    orchestrator: Arc<Orchestrator>,
    catalog: Arc<EdgeCatalog>,
    classifier: Arc<dyn Classifier>,
    config: EngineConfig,
}

impl DecisionEngine {
    pub fn new(orchestrator: Arc<Orchestrator>, catalog: Arc<EdgeCatalog>, classifier: Arc<dyn Classifier>, config: EngineConfig) -> Self {
        Self { orchestrator, catalog, classifier, config }
    }

    /// Deadline after which a mid-flight computation is aborted rather than
    /// emitted (§4.4 cancellation): kickoff minus the configured lead time.
    fn deadline(&self, kickoff_utc: DateTime<Utc>) -> DateTime<Utc> {
        kickoff_utc - Duration::minutes(self.config.lead_time_mins)
    }

    /// Run the full per-game procedure. `Ok(None)` covers every documented
    /// skip path; `Err` covers the two failure modes the spec marks fatal:
    /// a look-ahead violation in the built FeatureVector, and a classifier
    /// failure.
    #[allow(clippy::too_many_arguments)]
    pub async fn run_game(
        &self,
        game: &Game,
        stadium: &Stadium,
        home_team: &Team,
        away_team: &Team,
        home_rest_days: i64,
        away_rest_days: i64,
        bankroll: &BankrollState,
        recent_sharpe: f64,
        as_of: DateTime<Utc>,
    ) -> Result<Option<Recommendation>> {
        let deadline = self.deadline(game.kickoff_utc);
        if Utc::now() > deadline {
            info!(game_id = %game.id, "past decision deadline, skipping");
            return Ok(None);
        }

        let (inputs, stale_inputs) = self.gather_inputs(game, stadium, as_of).await;

        if Utc::now() > deadline {
            info!(game_id = %game.id, "deadline passed mid-computation, aborting");
            return Ok(None);
        }

        let fv = features::build_feature_vector(
            game,
            stadium,
            home_team.elo,
            away_team.elo,
            home_rest_days,
            away_rest_days,
            as_of,
            &inputs,
        )?; // LookAheadViolation is always fatal, never swallowed

        let model_prob = self.classifier.predict(&fv).await?; // classifier failure is a hard error for the run

        let Some((model_side, best_line, side_model_prob, raw_edge)) = features::pick_side(model_prob, &inputs.odds) else {
            info!(game_id = %game.id, "no odds source reporting either side, skipping");
            return Ok(None);
        };

        let matched = self.catalog.matching_active(&fv, game).await?;
        let fused = fusion::fuse(&matched, model_side, confidence_from_edge(raw_edge));

        let min_edge = if fused.matched_edges.is_empty() { self.config.min_edge_no_match } else { self.config.min_edge_with_match };
        if raw_edge < min_edge || fused.confidence < self.config.min_confidence {
            info!(game_id = %game.id, raw_edge, confidence = fused.confidence, "below edge/confidence threshold, skipping");
            return Ok(None);
        }

        let sized = staking::size_stake(&self.config, side_model_prob, best_line.american_odds, fused.confidence, fused.max_historical_edge, bankroll, recent_sharpe);
        if sized.stake_fraction <= rust_decimal::Decimal::ZERO {
            return Ok(None);
        }

        let recommendation = emitter::build_recommendation(
            game.id.clone(),
            game.kickoff_utc,
            fused.side,
            sized.stake_fraction,
            sized.stake_amount,
            side_model_prob,
            best_line.implied_probability(),
            raw_edge,
            fused.matched_edges,
            fused.confidence,
            best_line.book.clone(),
            best_line.american_odds,
            Utc::now(),
            &fv,
            stale_inputs,
        );

        Ok(Some(recommendation))
    }

    /// Concurrent dispatch with a barrier (§4.4 step 2, §5): every
    /// collector is fetched at once and joined before the FeatureVector is
    /// assembled. Each collaborator's failure is logged and leaves its
    /// corresponding field at the neutral default rather than aborting the
    /// whole fetch — `build_feature_vector` is the single place that
    /// decides whether the resulting vector is fit to classify.
    async fn gather_inputs(&self, game: &Game, stadium: &Stadium, as_of: DateTime<Utc>) -> (GatheredInputs, Vec<String>) {
        let home = &game.id.home;
        let away = &game.id.away;

        let (home_eff, away_eff, weather, home_inj, away_inj, referee, odds) = tokio::join!(
            self.orchestrator.dispatch("efficiency", CollectorRequest::new().with("game_id", game.id.to_string()).with("team", home), Priority::Normal),
            self.orchestrator.dispatch("efficiency", CollectorRequest::new().with("game_id", game.id.to_string()).with("team", away), Priority::Normal),
            self.orchestrator.dispatch(
                "weather",
                CollectorRequest::new().with("lat", stadium.lat).with("lon", stadium.lon).with("target_time", game.kickoff_utc.to_rfc3339()),
                Priority::Normal,
            ),
            self.orchestrator.dispatch("injury", CollectorRequest::new().with("team", home), Priority::High),
            self.orchestrator.dispatch("injury", CollectorRequest::new().with("team", away), Priority::High),
            self.orchestrator.dispatch("referee", CollectorRequest::new().with("game_id", game.id.to_string()), Priority::Low),
            self.orchestrator.dispatch("odds", CollectorRequest::new().with("game_id", game.id.to_string()), Priority::Critical),
        );

        let mut stale_inputs = Vec::new();
        let mut inputs = GatheredInputs::default();

        match home_eff {
            Ok(outcome) => {
                if outcome.stale {
                    stale_inputs.push("efficiency:home".to_string());
                }
                if let Ok(teams) = serde_json::from_value::<Vec<crate::orchestrator::collectors::efficiency::TeamEfficiency>>(outcome.value) {
                    if let Some(team) = teams.into_iter().find(|t| &t.team == home) {
                        inputs.home_efficiency = Some((team, as_of));
                    }
                }
            }
            Err(e) => warn!(error = %e, "home efficiency fetch failed"),
        }

        match away_eff {
            Ok(outcome) => {
                if outcome.stale {
                    stale_inputs.push("efficiency:away".to_string());
                }
                if let Ok(teams) = serde_json::from_value::<Vec<crate::orchestrator::collectors::efficiency::TeamEfficiency>>(outcome.value) {
                    if let Some(team) = teams.into_iter().find(|t| &t.team == away) {
                        inputs.away_efficiency = Some((team, as_of));
                    }
                }
            }
            Err(e) => warn!(error = %e, "away efficiency fetch failed"),
        }

        match weather {
            Ok(outcome) => {
                if outcome.stale {
                    stale_inputs.push("weather".to_string());
                }
                let v = &outcome.value;
                if let (Some(wind), Some(temp), Some(precip)) =
                    (v.get("surface_wind_mph").and_then(|x| x.as_f64()), v.get("temp_f").and_then(|x| x.as_f64()), v.get("precip_prob").and_then(|x| x.as_f64()))
                {
                    inputs.weather = Some((wind, temp, precip, as_of));
                }
            }
            Err(e) => warn!(error = %e, "weather fetch failed"),
        }

        match home_inj {
            Ok(outcome) => {
                if outcome.stale {
                    stale_inputs.push("injury:home".to_string());
                }
                if let Ok(entries) = serde_json::from_value(outcome.value) {
                    inputs.home_injuries = Some((entries, as_of));
                }
            }
            Err(e) => warn!(error = %e, "home injury fetch failed"),
        }

        match away_inj {
            Ok(outcome) => {
                if outcome.stale {
                    stale_inputs.push("injury:away".to_string());
                }
                if let Ok(entries) = serde_json::from_value(outcome.value) {
                    inputs.away_injuries = Some((entries, as_of));
                }
            }
            Err(e) => warn!(error = %e, "away injury fetch failed"),
        }

        match referee {
            Ok(outcome) => {
                if outcome.stale {
                    stale_inputs.push("referee".to_string());
                }
                if let Ok(aggregate) = serde_json::from_value(outcome.value) {
                    inputs.referee = Some((aggregate, as_of));
                }
            }
            Err(e) => warn!(error = %e, "referee fetch failed"),
        }

        match odds {
            Ok(outcome) => {
                if outcome.stale {
                    stale_inputs.push("odds".to_string());
                }
                if let Ok(tuples) = serde_json::from_value::<Vec<crate::orchestrator::collectors::odds::OddsTuple>>(outcome.value) {
                    inputs.odds = tuples.into_iter().filter_map(to_odds_line).collect();
                }
            }
            Err(e) => warn!(error = %e, "odds fetch failed"),
        }

        (inputs, stale_inputs)
    }
}

fn to_odds_line(tuple: crate::orchestrator::collectors::odds::OddsTuple) -> Option<OddsLine> {
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

/// A coarse confidence proxy derived from raw edge magnitude before any
/// catalog fusion is applied — fusion then scales this up or down per
/// matched Edge. The classifier's probability is the authoritative signal;
/// this only maps edge size onto [0.5, 1.0] for the fusion/staking
/// multipliers to consume.
fn confidence_from_edge(raw_edge: f64) -> f64 {
    (0.5 + raw_edge.abs() * 2.0).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_from_edge_is_bounded() {
        assert!(confidence_from_edge(0.5) <= 1.0);
        assert!(confidence_from_edge(0.0) >= 0.5);
    }

    #[test]
    fn test_to_odds_line_accepts_total_sides() {
        let tuple = crate::orchestrator::collectors::odds::OddsTuple {
            book: "b".into(),
            market: "total".into(),
            side: "over".into(),
            american_odds: -110,
            decimal_odds: 1.9,
            observed_at: Utc::now().to_rfc3339(),
        };
        let line = to_odds_line(tuple).unwrap();
        assert_eq!(line.side, WagerSide::Over);
    }

    #[test]
    fn test_to_odds_line_rejects_malformed_timestamp() {
        let tuple = crate::orchestrator::collectors::odds::OddsTuple {
            book: "b".into(),
            market: "moneyline".into(),
            side: "home".into(),
            american_odds: -110,
            decimal_odds: 1.9,
            observed_at: "not-a-timestamp".into(),
        };
        assert!(to_odds_line(tuple).is_none());
    }
}
