//! Statistical Edge Discovery, Edge Discoverer half (C2, §4.2): generates
//! hypotheses from a template sweep, pairwise/triple interaction mining, and
//! an optional AI proposer, validates each against history, and registers
//! survivors with the Edge Catalog (C1).
//!
//! Grounded on `engine::scanner`'s sweep-and-score loop, generalized from a
//! single fixed scan to the three hypothesis sources in §4.2.

pub mod ai_proposer;
pub mod templates;
pub mod validation;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::catalog::predicate::Predicate;
use crate::catalog::{new_candidate, EdgeCatalog, RegisterOutcome};
use crate::config::DiscoveryConfig;
use crate::orchestrator::Orchestrator;
use crate::types::{EdgeStats, FeatureVector, Game, WagerSide};
use templates::generate_templates;
use validation::{validate, Observation, ValidationResult};

/// One completed game's feature snapshot, paired with its outcome, as fed to
/// the discovery pipeline. `feature_vector.as_of` must be strictly before
/// kickoff per the no-look-ahead invariant shared with the Decision Engine.
#[derive(Debug, Clone)]
pub struct HistoricalObservation {
    pub feature_vector: FeatureVector,
    pub game: Game,
}

/// Whether `side` covers, given a completed game's final score. `None` for
/// sides this history representation cannot resolve (totals require a
/// closing total line, which completed-game history alone does not carry).
fn side_won(side: WagerSide, game: &Game) -> Option<bool> {
    let margin = game.result()?;
    match side {
        WagerSide::Home => Some(margin > 0),
        WagerSide::Away => Some(margin < 0),
        WagerSide::Over | WagerSide::Under => None,
    }
}

/// Tally of one discovery run, for the discovery log (§4.2, "Scheduling").
#[derive(Debug, Clone, Default)]
pub struct DiscoveryRunReport {
    pub candidates_considered: usize,
    pub accepted: usize,
    pub version_bumped: usize,
    pub duplicates: usize,
    pub discarded_insufficient_sample: usize,
    pub discarded_not_significant: usize,
    pub discarded_failed_holdout: usize,
    pub discarded_unresolvable_side: usize,
}

pub struct EdgeDiscoverer {
    catalog: EdgeCatalog,
    config: DiscoveryConfig,
    orchestrator: Option<Arc<Orchestrator>>,
}

impl EdgeDiscoverer {
    pub fn new(catalog: EdgeCatalog, config: DiscoveryConfig, orchestrator: Option<Arc<Orchestrator>>) -> Self {
        Self { catalog, config, orchestrator }
    }

    /// Pairwise and triple conjunctions of template predicates, filtered by
    /// `min_interaction_support`: a conjunction with fewer than that many
    /// historical matches cannot possibly clear `min_sample` downstream, so
    /// it is pruned before validation rather than after.
    fn mine_interactions(history: &[HistoricalObservation], min_support: u32) -> Vec<(String, Predicate, WagerSide)> {
        let base = generate_templates();
        let mut out = Vec::new();

        for i in 0..base.len() {
            for j in (i + 1)..base.len() {
                let a = &base[i];
                let b = &base[j];
                let combined = a.predicate.and(&b.predicate);
                let support = history.iter().filter(|o| combined.evaluate(&o.feature_vector, &o.game)).count();
                if support as u32 >= min_support {
                    out.push((format!("{} AND {}", a.name, b.name), combined, a.side));
                }
            }
        }

        out
    }

    /// Validate one (predicate, side) hypothesis against `history` and, if
    /// it passes, register it with the catalog.
    async fn validate_and_register(
        &self,
        predicate: &Predicate,
        side: WagerSide,
        history: &[HistoricalObservation],
        report: &mut DiscoveryRunReport,
    ) -> Result<()> {
        report.candidates_considered += 1;

        let mut matched: Vec<&HistoricalObservation> = history.iter().filter(|o| predicate.evaluate(&o.feature_vector, &o.game)).collect();
        matched.sort_by_key(|o| o.game.kickoff_utc);

        let mut observations = Vec::with_capacity(matched.len());
        for obs in &matched {
            match side_won(side, &obs.game) {
                Some(won) => observations.push(Observation { won }),
                None => {
                    report.discarded_unresolvable_side += 1;
                    return Ok(());
                }
            }
        }

        if observations.len() < self.config.min_sample as usize {
            report.discarded_insufficient_sample += 1;
            return Ok(());
        }

        let holdout_fraction = holdout_fraction_for(&matched, self.config.holdout_seasons);
        let result: ValidationResult = validate(&observations, holdout_fraction, self.config.min_sample, self.config.max_p_value);

        if !result.passes {
            if result.p_value >= self.config.max_p_value {
                report.discarded_not_significant += 1;
            } else {
                report.discarded_failed_holdout += 1;
            }
            return Ok(());
        }

        let stats = EdgeStats {
            sample_size: result.sample_size,
            wins: (result.sample_size as f64 * result.win_rate).round() as u32,
            win_rate: result.win_rate,
            roi: result.roi,
            p_value: result.p_value,
            effect_size: result.win_rate - 0.5,
        };
        let candidate = new_candidate(predicate.clone(), side, stats);
        let (outcome, edge) = self.catalog.register(candidate).await?;
        match outcome {
            RegisterOutcome::Accepted => {
                report.accepted += 1;
                info!(edge_id = %edge.edge_id, win_rate = result.win_rate, p_value = result.p_value, "discovery accepted new candidate");
            }
            RegisterOutcome::VersionBump => {
                report.version_bumped += 1;
                info!(edge_id = %edge.edge_id, version = edge.version, "discovery version-bumped an existing edge");
            }
            RegisterOutcome::Duplicate => report.duplicates += 1,
        }
        Ok(())
    }

    /// Run one discovery pass: template sweep, interaction mining, and
    /// (if enabled) an AI-proposed candidate, each validated against
    /// `history` and registered with the catalog on success. A single
    /// template or interaction raising an error is logged and skipped; the
    /// run continues rather than aborting (§4.2, "Failure semantics").
    pub async fn run(&self, history: &[HistoricalObservation]) -> Result<DiscoveryRunReport> {
        let mut report = DiscoveryRunReport::default();

        for candidate in generate_templates() {
            if let Err(e) = self.validate_and_register(&candidate.predicate, candidate.side, history, &mut report).await {
                warn!(template = %candidate.name, error = %e, "discovery template raised, skipping");
            }
        }

        for (name, predicate, side) in Self::mine_interactions(history, self.config.min_interaction_support) {
            if let Err(e) = self.validate_and_register(&predicate, side, history, &mut report).await {
                warn!(interaction = %name, error = %e, "discovery interaction raised, skipping");
            }
        }

        if self.config.ai_proposer_enabled {
            if let Some(orchestrator) = &self.orchestrator {
                let summary = summarize_training_set(history);
                if let Some(predicate) = ai_proposer::propose(orchestrator, &summary).await {
                    for side in [WagerSide::Home, WagerSide::Away] {
                        if let Err(e) = self.validate_and_register(&predicate, side, history, &mut report).await {
                            warn!(error = %e, "ai-proposed candidate raised, skipping");
                        }
                    }
                }
            }
        }

        Ok(report)
    }
}

/// Holdout fraction derived from the configured number of holdout seasons
/// relative to the distinct seasons actually present in the matched sample.
/// Falls back to a fifth of the sample when season coverage can't be
/// determined (a single season, or an empty match set).
fn holdout_fraction_for(matched: &[&HistoricalObservation], holdout_seasons: u32) -> f64 {
    let mut seasons: Vec<i32> = matched.iter().map(|o| o.game.id.season).collect();
    seasons.sort_unstable();
    seasons.dedup();
    if seasons.len() <= 1 {
        return 0.2;
    }
    (holdout_seasons as f64 / seasons.len() as f64).clamp(0.05, 0.5)
}

fn summarize_training_set(history: &[HistoricalObservation]) -> String {
    let mut seasons: Vec<i32> = history.iter().map(|o| o.game.id.season).collect();
    seasons.sort_unstable();
    seasons.dedup();
    let completed = history.iter().filter(|o| o.game.is_completed()).count();
    format!(
        "Training set spans seasons {:?} with {} completed games. Propose a structured predicate likely to carry a sustained edge.",
        seasons, completed
    )
}

/// Per-collector interaction counts, exposed for diagnostics/tests on how
/// much support each mined conjunction found.
pub fn interaction_support_counts(history: &[HistoricalObservation]) -> HashMap<String, usize> {
    generate_templates()
        .iter()
        .map(|c| (c.name.clone(), history.iter().filter(|o| c.predicate.evaluate(&o.feature_vector, &o.game)).count()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::predicate::{Comparison, Field, Operator};
    use crate::catalog::store::CatalogStore;
    use crate::config::CatalogConfig;
    use crate::types::{FinalScore, GameId, GameStatus, RoofType};
    use chrono::{Duration, TimeZone, Utc};

    fn make_observation(season: i32, week: u8, index: i64, elo_diff: f64, home_won: bool) -> HistoricalObservation {
        let kickoff = Utc.with_ymd_and_hms(2020 + season - 2020, 9, 1, 18, 0, 0).unwrap() + Duration::days(index * 7);
        let game = Game {
            id: GameId { season, week, away: "AWY".to_string(), home: "HME".to_string() },
            kickoff_utc: kickoff,
            stadium: "Stadium".to_string(),
            status: GameStatus::Completed,
            final_score: Some(if home_won { FinalScore { home: 27, away: 13 } } else { FinalScore { home: 13, away: 27 } }),
        };
        let feature_vector = FeatureVector {
            game_id: game.id.clone(),
            as_of: kickoff - Duration::hours(1),
            elo_diff_home_minus_away: elo_diff,
            home_off_efficiency: 0.0,
            home_def_efficiency: 0.0,
            away_off_efficiency: 0.0,
            away_def_efficiency: 0.0,
            home_rest_days: 7,
            away_rest_days: 7,
            roof: RoofType::Outdoor,
            surface: "grass".to_string(),
            forecast_wind_mph: 5.0,
            forecast_temp_f: 65.0,
            forecast_precip_prob: 0.0,
            referee_home_win_rate: 0.5,
            home_injury_impact: 0.0,
            away_injury_impact: 0.0,
            source_timestamps: vec![],
        };
        HistoricalObservation { feature_vector, game }
    }

    async fn test_discoverer() -> EdgeDiscoverer {
        let store = CatalogStore::connect("sqlite::memory:").await.unwrap();
        let catalog = EdgeCatalog::new(store, CatalogConfig::default());
        EdgeDiscoverer::new(catalog, DiscoveryConfig::default(), None)
    }

    fn strong_home_favorite_history() -> Vec<HistoricalObservation> {
        // Elo diff > 100 should hold for all of these; home wins 75% of the
        // time, comfortably above break-even and statistically significant
        // at n=200.
        (0..200).map(|i| make_observation(2020, 5, i, 150.0, i % 4 != 0)).collect()
    }

    #[tokio::test]
    async fn test_run_accepts_a_strong_template_candidate() {
        let discoverer = test_discoverer().await;
        let history = strong_home_favorite_history();
        let report = discoverer.run(&history).await.unwrap();
        assert!(report.accepted > 0, "expected at least one accepted candidate: {report:?}");
    }

    #[tokio::test]
    async fn test_run_is_idempotent_on_rerun() {
        let discoverer = test_discoverer().await;
        let history = strong_home_favorite_history();
        let first = discoverer.run(&history).await.unwrap();
        let second = discoverer.run(&history).await.unwrap();
        assert!(first.accepted > 0);
        assert_eq!(second.accepted, 0, "rerunning over identical history should not re-accept");
        assert!(second.duplicates > 0);
    }

    #[tokio::test]
    async fn test_weak_signal_history_is_discarded() {
        let discoverer = test_discoverer().await;
        let history: Vec<HistoricalObservation> = (0..150).map(|i| make_observation(2020, 5, i, 150.0, i % 2 == 0)).collect();
        let report = discoverer.run(&history).await.unwrap();
        assert_eq!(report.accepted, 0);
        assert!(report.discarded_not_significant > 0 || report.discarded_failed_holdout > 0);
    }

    #[test]
    fn test_mine_interactions_filters_by_support() {
        let history = strong_home_favorite_history();
        let mined = EdgeDiscoverer::mine_interactions(&history, 100);
        for (_, predicate, _) in &mined {
            let support = history.iter().filter(|o| predicate.evaluate(&o.feature_vector, &o.game)).count();
            assert!(support >= 100);
        }
    }

    #[test]
    fn test_side_won_resolves_home_and_away() {
        let obs = make_observation(2020, 1, 0, 0.0, true);
        assert_eq!(side_won(WagerSide::Home, &obs.game), Some(true));
        assert_eq!(side_won(WagerSide::Away, &obs.game), Some(false));
    }

    #[test]
    fn test_side_won_unresolvable_for_totals() {
        let obs = make_observation(2020, 1, 0, 0.0, true);
        assert_eq!(side_won(WagerSide::Over, &obs.game), None);
    }

    #[test]
    fn test_predicate_always_true_matches_everything() {
        let history = strong_home_favorite_history();
        let predicate = Predicate::new(vec![Comparison { field: Field::Week, operator: Operator::Gte, value: 0.0 }]);
        let matched = history.iter().filter(|o| predicate.evaluate(&o.feature_vector, &o.game)).count();
        assert_eq!(matched, history.len());
    }
}
