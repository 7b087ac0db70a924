//! FeatureVector construction (§4.4 step 3) and best-line odds selection
//! (step 5). Every value folded into the FeatureVector carries its source
//! timestamp so `FeatureVector::validate_no_look_ahead` can catch a stale
//! fetch that accidentally observed the future.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::orchestrator::collectors::efficiency::TeamEfficiency;
use crate::orchestrator::collectors::injury::InjuryReportEntry;
use crate::orchestrator::collectors::referee::RefereeAggregate;
use crate::types::{break_even_for_odds, CoreError, FeatureVector, Game, OddsQuote, Stadium, WagerSide};

/// One book's quoted American odds for one side of the game's moneyline,
/// parsed from the orchestrator's raw odds collector response.
#[derive(Debug, Clone)]
pub struct OddsLine {
    pub side: WagerSide,
    pub book: String,
    pub american_odds: i32,
    pub observed_at: DateTime<Utc>,
}

impl OddsLine {
    pub fn implied_probability(&self) -> f64 {
        OddsQuote { american_odds: self.american_odds, decimal_odds: 0.0, observed_at: self.observed_at }.implied_probability()
    }
}

/// Everything the Decision Engine gathered from the Orchestrator for one
/// game, already parsed into domain types but not yet folded into a
/// FeatureVector.
#[derive(Debug, Clone, Default)]
pub struct GatheredInputs {
    pub home_efficiency: Option<(TeamEfficiency, DateTime<Utc>)>,
    pub away_efficiency: Option<(TeamEfficiency, DateTime<Utc>)>,
    pub weather: Option<(f64, f64, f64, DateTime<Utc>)>,
    pub home_injuries: Option<(Vec<InjuryReportEntry>, DateTime<Utc>)>,
    pub away_injuries: Option<(Vec<InjuryReportEntry>, DateTime<Utc>)>,
    pub referee: Option<(RefereeAggregate, DateTime<Utc>)>,
    pub odds: Vec<OddsLine>,
}

/// Severity-weighted injury impact in [0, 1]. Heavier weight for entries
/// ruled `out`, lighter for `probable`; unrecognized severities contribute
/// nothing rather than failing the run.
fn injury_impact(entries: &[InjuryReportEntry]) -> f64 {
    let weight = |severity: &str| -> f64 {
        match severity.to_lowercase().as_str() {
            "out" => 1.0,
            "doubtful" => 0.5,
            "questionable" => 0.25,
            "probable" => 0.1,
            _ => 0.0,
        }
    };
    let total: f64 = entries.iter().map(|e| weight(&e.severity)).sum();
    (total / 5.0).min(1.0)
}

/// Build the FeatureVector for one (game, as-of) pair, enforcing the
/// no-look-ahead invariant before returning. Missing optional inputs fall
/// back to neutral values (0.5 win rate, 0 wind/impact) rather than
/// blocking the run — callers that need a required input to be present
/// check `GatheredInputs` directly before calling this.
pub fn build_feature_vector(
    game: &Game,
    stadium: &Stadium,
    home_elo: f64,
    away_elo: f64,
    home_rest_days: i64,
    away_rest_days: i64,
    as_of: DateTime<Utc>,
    inputs: &GatheredInputs,
) -> Result<FeatureVector, CoreError> {
    let mut source_timestamps = Vec::new();

    let (home_off, home_def) = match &inputs.home_efficiency {
        Some((eff, ts)) => {
            source_timestamps.push(("home_efficiency".to_string(), *ts));
            (eff.off_efficiency, eff.def_efficiency)
        }
        None => (0.0, 0.0),
    };
    let (away_off, away_def) = match &inputs.away_efficiency {
        Some((eff, ts)) => {
            source_timestamps.push(("away_efficiency".to_string(), *ts));
            (eff.off_efficiency, eff.def_efficiency)
        }
        None => (0.0, 0.0),
    };

    let (wind, temp, precip) = match &inputs.weather {
        Some((wind, temp, precip, ts)) => {
            source_timestamps.push(("weather".to_string(), *ts));
            (*wind, *temp, *precip)
        }
        None => (0.0, 60.0, 0.0),
    };

    let home_injury_impact = match &inputs.home_injuries {
        Some((entries, ts)) => {
            source_timestamps.push(("home_injury".to_string(), *ts));
            injury_impact(entries)
        }
        None => 0.0,
    };
    let away_injury_impact = match &inputs.away_injuries {
        Some((entries, ts)) => {
            source_timestamps.push(("away_injury".to_string(), *ts));
            injury_impact(entries)
        }
        None => 0.0,
    };

    let referee_home_win_rate = match &inputs.referee {
        Some((aggregate, ts)) => {
            source_timestamps.push(("referee".to_string(), *ts));
            aggregate.home_win_rate
        }
        None => 0.5,
    };

    let fv = FeatureVector {
        game_id: game.id.clone(),
        as_of,
        elo_diff_home_minus_away: home_elo - away_elo,
        home_off_efficiency: home_off,
        home_def_efficiency: home_def,
        away_off_efficiency: away_off,
        away_def_efficiency: away_def,
        home_rest_days,
        away_rest_days,
        roof: stadium.roof,
        surface: stadium.surface.clone(),
        forecast_wind_mph: wind,
        forecast_temp_f: temp,
        forecast_precip_prob: precip,
        referee_home_win_rate,
        home_injury_impact,
        away_injury_impact,
        source_timestamps,
    };

    if let Err(field) = fv.validate_no_look_ahead() {
        let source_ts = fv.source_timestamps.iter().find(|(f, _)| *f == field).map(|(_, ts)| *ts).unwrap_or(as_of);
        return Err(CoreError::LookAheadViolation { field, source_ts, as_of });
    }

    Ok(fv)
}

/// The best (lowest implied-probability) quote per side, across every book
/// that reported a line (§4.4 step 5).
pub fn best_lines(odds: &[OddsLine]) -> HashMap<WagerSide, OddsLine> {
    let mut best: HashMap<WagerSide, OddsLine> = HashMap::new();
    for line in odds {
        match best.get(&line.side) {
            Some(current) if current.implied_probability() <= line.implied_probability() => {}
            _ => {
                best.insert(line.side, line.clone());
            }
        }
    }
    best
}

/// Pick the side and best line maximizing model edge over the market,
/// given `p_home_win`. Returns `None` when no book reported either side
/// (§4.4 step 8: "no odds source reporting").
pub fn pick_side(p_home_win: f64, odds: &[OddsLine]) -> Option<(WagerSide, OddsLine, f64, f64)> {
    let lines = best_lines(odds);
    let mut best_choice: Option<(WagerSide, OddsLine, f64, f64)> = None;

    for (side, line) in lines {
        let model_prob = match side {
            WagerSide::Home => p_home_win,
            WagerSide::Away => 1.0 - p_home_win,
            WagerSide::Over | WagerSide::Under => continue,
        };
        let implied = line.implied_probability();
        let edge = model_prob - implied;
        if best_choice.as_ref().map(|(_, _, _, best_edge)| edge > *best_edge).unwrap_or(true) {
            best_choice = Some((side, line, model_prob, edge));
        }
    }

    best_choice
}

/// Reference break-even probability at standard vig, used by callers that
/// need a baseline without a specific book's line.
pub fn standard_break_even() -> f64 {
    break_even_for_odds(-110)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GameId, GameStatus, RoofType};
    use chrono::Duration;

    fn sample_game() -> Game {
        Game {
            id: GameId { season: 2024, week: 5, away: "BUF".into(), home: "KC".into() },
            kickoff_utc: Utc::now() + Duration::hours(2),
            stadium: "Arrowhead".into(),
            status: GameStatus::Scheduled,
            final_score: None,
        }
    }

    fn sample_stadium() -> Stadium {
        Stadium {
            name: "Arrowhead".into(),
            lat: 39.0,
            lon: -94.5,
            elevation_ft: 750.0,
            roof: RoofType::Outdoor,
            surface: "grass".into(),
            timezone: "America/Chicago".into(),
            prevailing_wind_mph: 8.0,
            wind_tunnel: false,
            swirling_winds: false,
        }
    }

    #[test]
    fn test_build_feature_vector_with_no_inputs_uses_neutral_defaults() {
        let game = sample_game();
        let stadium = sample_stadium();
        let as_of = game.kickoff_utc - Duration::hours(1);
        let fv = build_feature_vector(&game, &stadium, 1550.0, 1500.0, 7, 7, as_of, &GatheredInputs::default()).unwrap();
        assert_eq!(fv.elo_diff_home_minus_away, 50.0);
        assert_eq!(fv.referee_home_win_rate, 0.5);
        assert!(fv.source_timestamps.is_empty());
    }

    #[test]
    fn test_build_feature_vector_rejects_future_source_timestamp() {
        let game = sample_game();
        let stadium = sample_stadium();
        let as_of = game.kickoff_utc - Duration::hours(1);
        let mut inputs = GatheredInputs::default();
        inputs.referee = Some((
            RefereeAggregate { official: "ref".into(), home_win_rate: 0.55, penalty_rate: 0.1, total_points_tendency: 45.0 },
            as_of + Duration::minutes(5),
        ));
        let result = build_feature_vector(&game, &stadium, 1500.0, 1500.0, 7, 7, as_of, &inputs);
        assert!(matches!(result, Err(CoreError::LookAheadViolation { .. })));
    }

    #[test]
    fn test_best_lines_picks_lowest_implied_probability() {
        let odds = vec![
            OddsLine { side: WagerSide::Home, book: "a".into(), american_odds: -120, observed_at: Utc::now() },
            OddsLine { side: WagerSide::Home, book: "b".into(), american_odds: -105, observed_at: Utc::now() },
        ];
        let best = best_lines(&odds);
        assert_eq!(best.get(&WagerSide::Home).unwrap().book, "b");
    }

    #[test]
    fn test_pick_side_prefers_higher_model_edge() {
        let odds = vec![
            OddsLine { side: WagerSide::Home, book: "a".into(), american_odds: -110, observed_at: Utc::now() },
            OddsLine { side: WagerSide::Away, book: "a".into(), american_odds: -110, observed_at: Utc::now() },
        ];
        let (side, _, _, edge) = pick_side(0.65, &odds).unwrap();
        assert_eq!(side, WagerSide::Home);
        assert!(edge > 0.0);
    }

    #[test]
    fn test_pick_side_none_without_odds() {
        assert!(pick_side(0.65, &[]).is_none());
    }
}
