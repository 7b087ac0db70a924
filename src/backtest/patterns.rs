//! Pattern-discovery feedback loop (§4.5): slice settled backtest trades
//! along several independent dimensions and emit any slice that clears the
//! discovery bar as a candidate Edge, fed back to the Discoverer for the
//! same full validation a live-mined candidate would undergo. No slice is
//! ever auto-promoted to Active from here.

use crate::catalog::predicate::{Comparison, Field, Operator, Predicate};
use crate::catalog::{new_candidate, EdgeCatalog};
use crate::discovery::validation::binomial_p_value;
use crate::discovery::HistoricalObservation;
use crate::types::{Edge, EdgeStats, WagerSide};

/// One candidate surfaced by slicing the settled trade log, paired with the
/// dimension it was sliced on for operator review.
#[derive(Debug, Clone)]
pub struct PatternCandidate {
    pub dimension: String,
    pub edge: Edge,
    pub lift_pp: f64,
    pub sample_size: u32,
    pub p_value: f64,
}

struct Slice {
    dimension: String,
    predicate: Predicate,
    side: WagerSide,
    wins: u32,
    total: u32,
}

/// Slice the observation set by feature bands (one dimension at a time —
/// elo differential, wind, referee tendency) crossed with which side won,
/// holding everything else fixed. Each band tests as its own candidate
/// predicate.
fn slice_by_feature_band(observations: &[HistoricalObservation]) -> Vec<Slice> {
    let bands: Vec<(&str, Field, Operator, f64)> = vec![
        ("elo_diff_gt_100", Field::EloDiffHomeMinusAway, Operator::Gt, 100.0),
        ("elo_diff_lt_neg_100", Field::EloDiffHomeMinusAway, Operator::Lt, -100.0),
        ("high_wind", Field::ForecastWindMph, Operator::Gt, 15.0),
        ("ref_home_lean", Field::RefereeHomeWinRate, Operator::Gt, 0.55),
        ("home_injury_heavy", Field::HomeInjuryImpact, Operator::Gt, 0.4),
        ("away_injury_heavy", Field::AwayInjuryImpact, Operator::Gt, 0.4),
    ];

    let mut slices = Vec::new();
    for (name, field, operator, value) in bands {
        let comparison = Comparison { field, operator, value };
        let predicate = Predicate::new(vec![comparison]);

        let matching: Vec<&HistoricalObservation> = observations.iter().filter(|o| predicate.evaluate(&o.feature_vector, &o.game)).collect();
        if matching.is_empty() {
            continue;
        }

        let home_favored = matches!(field, Field::EloDiffHomeMinusAway) && value > 0.0;
        let side = if home_favored { WagerSide::Home } else { WagerSide::Away };

        let wins = matching
            .iter()
            .filter_map(|o| o.game.result())
            .filter(|&margin| if side == WagerSide::Home { margin > 0 } else { margin < 0 })
            .count() as u32;
        let total = matching.iter().filter(|o| o.game.result().is_some()).count() as u32;

        slices.push(Slice { dimension: format!("feature_band:{name}"), predicate, side, wins, total });
    }
    slices
}

/// Slice by week-of-season bucket: early season (weeks 1-4), mid (5-13),
/// and late/playoff push (14+), since model edges often drift as the
/// sample of games a team has played grows within a season.
fn slice_by_week_bucket(observations: &[HistoricalObservation]) -> Vec<Slice> {
    let buckets: Vec<(&str, u8, u8)> = vec![("early_season", 1, 4), ("mid_season", 5, 13), ("late_season", 14, 22)];

    let mut slices = Vec::new();
    for (name, lo, hi) in buckets {
        let matching: Vec<&HistoricalObservation> = observations.iter().filter(|o| o.game.id.week >= lo && o.game.id.week <= hi).collect();
        if matching.is_empty() {
            continue;
        }
        let predicate = Predicate::new(vec![Comparison { field: Field::Week, operator: Operator::Gte, value: lo as f64 }]);
        let wins = matching.iter().filter_map(|o| o.game.result()).filter(|&m| m > 0).count() as u32;
        let total = matching.iter().filter(|o| o.game.result().is_some()).count() as u32;
        slices.push(Slice { dimension: format!("week_bucket:{name}"), predicate, side: WagerSide::Home, wins, total });
    }
    slices
}

/// Evaluate every slice against the discovery bar (§4.5: win rate at least
/// base+3pp, sample >= 20, one-sided p < 0.01) and build a Candidate Edge
/// for each survivor. `base_win_rate` is the trade log's overall win rate,
/// used as the baseline the slice must beat.
pub fn discover_candidates(
    observations: &[HistoricalObservation],
    base_win_rate: f64,
    min_sample: u32,
    min_lift_pp: f64,
    max_p_value: f64,
) -> Vec<PatternCandidate> {
    let mut slices = slice_by_feature_band(observations);
    slices.extend(slice_by_week_bucket(observations));

    let mut candidates = Vec::new();
    for slice in slices {
        if slice.total < min_sample {
            continue;
        }
        let win_rate = slice.wins as f64 / slice.total as f64;
        let lift_pp = (win_rate - base_win_rate) * 100.0;
        if lift_pp < min_lift_pp {
            continue;
        }

        let two_sided = binomial_p_value(slice.wins, slice.total);
        let one_sided = if win_rate > 0.5 { two_sided / 2.0 } else { 1.0 - two_sided / 2.0 };
        if one_sided >= max_p_value {
            continue;
        }

        let stats = EdgeStats {
            sample_size: slice.total,
            wins: slice.wins,
            win_rate,
            roi: crate::discovery::validation::roi_at_standard_odds(win_rate),
            p_value: one_sided,
            effect_size: lift_pp / 100.0,
        };
        let edge = new_candidate(slice.predicate, slice.side, stats);

        candidates.push(PatternCandidate { dimension: slice.dimension, edge, lift_pp, sample_size: slice.total, p_value: one_sided });
    }

    candidates
}

/// Register every discovered candidate with the catalog as a Candidate
/// Edge (never Active) so the normal activation invariant gate still
/// applies before any of these ever influences a live recommendation.
pub async fn feed_to_discoverer(catalog: &EdgeCatalog, candidates: Vec<PatternCandidate>) -> anyhow::Result<usize> {
    let mut registered = 0;
    for candidate in candidates {
        let (_outcome, _edge) = catalog.register(candidate.edge).await?;
        registered += 1;
    }
    Ok(registered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FeatureVector, FinalScore, Game, GameId, GameStatus, RoofType};
    use chrono::Utc;

    fn obs(week: u8, elo_diff: f64, home_margin: i32) -> HistoricalObservation {
        let game = Game {
            id: GameId { season: 2024, week, away: "AWY".into(), home: "HME".into() },
            kickoff_utc: Utc::now(),
            stadium: "Stadium".into(),
            status: GameStatus::Completed,
            final_score: Some(FinalScore { home: 24 + home_margin.max(0), away: 24 + (-home_margin).max(0) }),
        };
        let fv = FeatureVector {
            game_id: game.id.clone(),
            as_of: Utc::now(),
            elo_diff_home_minus_away: elo_diff,
            home_off_efficiency: 0.0,
            home_def_efficiency: 0.0,
            away_off_efficiency: 0.0,
            away_def_efficiency: 0.0,
            home_rest_days: 7,
            away_rest_days: 7,
            roof: RoofType::Outdoor,
            surface: "grass".into(),
            forecast_wind_mph: 5.0,
            forecast_temp_f: 60.0,
            forecast_precip_prob: 0.0,
            referee_home_win_rate: 0.5,
            home_injury_impact: 0.0,
            away_injury_impact: 0.0,
            source_timestamps: Vec::new(),
        };
        HistoricalObservation { feature_vector: fv, game }
    }

    #[test]
    fn test_discover_candidates_requires_minimum_sample() {
        let observations: Vec<_> = (0..5).map(|i| obs(5, 150.0, 7 + i)).collect();
        let candidates = discover_candidates(&observations, 0.5, 20, 3.0, 0.01);
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_discover_candidates_finds_lifted_slice() {
        let mut observations: Vec<HistoricalObservation> = (0..30).map(|i| obs(5, 150.0, 7 + (i % 3))).collect();
        observations.extend((0..30).map(|i| obs(5, -150.0, 7 + (i % 3))));
        let candidates = discover_candidates(&observations, 0.5, 20, 3.0, 0.05);
        assert!(candidates.iter().any(|c| c.dimension.starts_with("feature_band:elo_diff_gt_100")));
    }

    #[test]
    fn test_discover_candidates_rejects_below_lift_threshold() {
        let observations: Vec<HistoricalObservation> = (0..40).map(|i| obs(5, 150.0, if i % 2 == 0 { 3 } else { -3 })).collect();
        let candidates = discover_candidates(&observations, 0.5, 20, 3.0, 0.01);
        assert!(candidates.iter().all(|c| c.dimension != "feature_band:elo_diff_gt_100"));
    }
}
