//! Structured predicate grammar.
//!
//! Replaces dynamic-typed/arbitrary-string filters with a closed AST: a
//! conjunction of comparison triples `(field, operator, value)` over a fixed
//! feature namespace. Every predicate is guaranteed parseable and
//! similarity-comparable because the namespace is closed — there is no
//! free-form expression evaluator here.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{FeatureVector, Game, RoofType};

/// The closed set of fields a predicate may compare against. Adding a field
/// here is the only way to extend what predicates can express.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Field {
    EloDiffHomeMinusAway,
    HomeOffEfficiency,
    HomeDefEfficiency,
    AwayOffEfficiency,
    AwayDefEfficiency,
    HomeRestDays,
    AwayRestDays,
    ForecastWindMph,
    ForecastTempF,
    ForecastPrecipProb,
    RefereeHomeWinRate,
    HomeInjuryImpact,
    AwayInjuryImpact,
    IsOutdoor,
    Week,
}

impl Field {
    fn canonical_name(&self) -> &'static str {
        match self {
            Field::EloDiffHomeMinusAway => "elo_diff",
            Field::HomeOffEfficiency => "home_off_eff",
            Field::HomeDefEfficiency => "home_def_eff",
            Field::AwayOffEfficiency => "away_off_eff",
            Field::AwayDefEfficiency => "away_def_eff",
            Field::HomeRestDays => "home_rest_days",
            Field::AwayRestDays => "away_rest_days",
            Field::ForecastWindMph => "wind_mph",
            Field::ForecastTempF => "temp_f",
            Field::ForecastPrecipProb => "precip_prob",
            Field::RefereeHomeWinRate => "ref_home_win_rate",
            Field::HomeInjuryImpact => "home_injury",
            Field::AwayInjuryImpact => "away_injury",
            Field::IsOutdoor => "is_outdoor",
            Field::Week => "week",
        }
    }

    /// Extract this field's numeric value from a (FeatureVector, Game) pair.
    /// Boolean fields are represented as 0.0/1.0.
    fn extract(&self, fv: &FeatureVector, game: &Game) -> f64 {
        match self {
            Field::EloDiffHomeMinusAway => fv.elo_diff_home_minus_away,
            Field::HomeOffEfficiency => fv.home_off_efficiency,
            Field::HomeDefEfficiency => fv.home_def_efficiency,
            Field::AwayOffEfficiency => fv.away_off_efficiency,
            Field::AwayDefEfficiency => fv.away_def_efficiency,
            Field::HomeRestDays => fv.home_rest_days as f64,
            Field::AwayRestDays => fv.away_rest_days as f64,
            Field::ForecastWindMph => fv.forecast_wind_mph,
            Field::ForecastTempF => fv.forecast_temp_f,
            Field::ForecastPrecipProb => fv.forecast_precip_prob,
            Field::RefereeHomeWinRate => fv.referee_home_win_rate,
            Field::HomeInjuryImpact => fv.home_injury_impact,
            Field::AwayInjuryImpact => fv.away_injury_impact,
            Field::IsOutdoor => {
                if matches!(fv.roof, RoofType::Outdoor) {
                    1.0
                } else {
                    0.0
                }
            }
            Field::Week => game.id.week as f64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Ne,
}

impl Operator {
    fn canonical_symbol(&self) -> &'static str {
        match self {
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Eq => "==",
            Operator::Ne => "!=",
        }
    }

    fn apply(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Operator::Gt => lhs > rhs,
            Operator::Gte => lhs >= rhs,
            Operator::Lt => lhs < rhs,
            Operator::Lte => lhs <= rhs,
            Operator::Eq => (lhs - rhs).abs() < f64::EPSILON,
            Operator::Ne => (lhs - rhs).abs() >= f64::EPSILON,
        }
    }
}

/// A single `field OP value` comparison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub field: Field,
    pub operator: Operator,
    pub value: f64,
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field.canonical_name(), self.operator.canonical_symbol(), self.value)
    }
}

/// A predicate: a conjunction of comparisons. All must hold for the
/// predicate to evaluate true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub comparisons: Vec<Comparison>,
}

impl Predicate {
    pub fn new(comparisons: Vec<Comparison>) -> Self {
        Self { comparisons }
    }

    /// The empty conjunction: always true. Used as a placeholder in tests
    /// and as the base case for interaction mining.
    pub fn always_true() -> Self {
        Self { comparisons: Vec::new() }
    }

    pub fn evaluate(&self, fv: &FeatureVector, game: &Game) -> bool {
        self.comparisons
            .iter()
            .all(|c| c.operator.apply(c.field.extract(fv, game), c.value))
    }

    /// Canonical string form used for similarity comparison and hashing:
    /// lowercased, whitespace-collapsed, operators standardized, joined with
    /// a fixed conjunction token. Comparisons are rendered in declaration
    /// order — callers that mine interactions are expected to declare
    /// sub-predicates in a stable order so equivalent hypotheses compare
    /// equal.
    pub fn canonical_form(&self) -> String {
        if self.comparisons.is_empty() {
            return "true".to_string();
        }
        self.comparisons
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(" and ")
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Conjoin another predicate's comparisons onto this one (used by
    /// interaction mining to build pairwise/triple combinations).
    pub fn and(&self, other: &Predicate) -> Predicate {
        let mut comparisons = self.comparisons.clone();
        comparisons.extend(other.comparisons.iter().copied());
        Predicate::new(comparisons)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical_form())
    }
}

/// Attempt to parse a predicate proposed by an external collaborator
/// (AI reasoning provider) in structured JSON form. Returns `None` on any
/// parse failure — per §4.2, ungrounded proposals are discarded silently,
/// never surfaced as an error.
pub fn parse_proposed(value: &serde_json::Value) -> Option<Predicate> {
    serde_json::from_value::<Predicate>(value.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GameId, GameStatus};
    use chrono::Utc;

    fn sample_game() -> Game {
        Game {
            id: GameId { season: 2024, week: 7, away: "BUF".into(), home: "KC".into() },
            kickoff_utc: Utc::now(),
            stadium: "Arrowhead Stadium".into(),
            status: GameStatus::Scheduled,
            final_score: None,
        }
    }

    fn sample_fv(elo_diff: f64, wind: f64, roof: RoofType) -> FeatureVector {
        FeatureVector {
            game_id: sample_game().id,
            as_of: Utc::now(),
            elo_diff_home_minus_away: elo_diff,
            home_off_efficiency: 0.05,
            home_def_efficiency: 0.0,
            away_off_efficiency: 0.0,
            away_def_efficiency: 0.0,
            home_rest_days: 7,
            away_rest_days: 7,
            roof,
            surface: "grass".into(),
            forecast_wind_mph: wind,
            forecast_temp_f: 60.0,
            forecast_precip_prob: 0.0,
            referee_home_win_rate: 0.5,
            home_injury_impact: 0.0,
            away_injury_impact: 0.0,
            source_timestamps: vec![],
        }
    }

    #[test]
    fn test_single_comparison_evaluates() {
        let p = Predicate::new(vec![Comparison { field: Field::EloDiffHomeMinusAway, operator: Operator::Gt, value: 100.0 }]);
        assert!(p.evaluate(&sample_fv(150.0, 5.0, RoofType::Outdoor), &sample_game()));
        assert!(!p.evaluate(&sample_fv(50.0, 5.0, RoofType::Outdoor), &sample_game()));
    }

    #[test]
    fn test_conjunction_requires_all_true() {
        let p = Predicate::new(vec![
            Comparison { field: Field::EloDiffHomeMinusAway, operator: Operator::Gt, value: 100.0 },
            Comparison { field: Field::ForecastWindMph, operator: Operator::Gt, value: 15.0 },
        ]);
        assert!(!p.evaluate(&sample_fv(150.0, 5.0, RoofType::Outdoor), &sample_game()));
        assert!(p.evaluate(&sample_fv(150.0, 20.0, RoofType::Outdoor), &sample_game()));
    }

    #[test]
    fn test_is_outdoor_boolean_field() {
        let p = Predicate::new(vec![Comparison { field: Field::IsOutdoor, operator: Operator::Eq, value: 1.0 }]);
        assert!(p.evaluate(&sample_fv(0.0, 0.0, RoofType::Outdoor), &sample_game()));
        assert!(!p.evaluate(&sample_fv(0.0, 0.0, RoofType::Dome), &sample_game()));
    }

    #[test]
    fn test_always_true_has_no_comparisons() {
        assert!(Predicate::always_true().evaluate(&sample_fv(0.0, 0.0, RoofType::Dome), &sample_game()));
        assert_eq!(Predicate::always_true().canonical_form(), "true");
    }

    #[test]
    fn test_canonical_form_is_lowercased_and_whitespace_collapsed() {
        let p = Predicate::new(vec![Comparison { field: Field::EloDiffHomeMinusAway, operator: Operator::Gt, value: 100.0 }]);
        assert_eq!(p.canonical_form(), "elo_diff > 100");
    }

    #[test]
    fn test_and_combines_comparisons() {
        let a = Predicate::new(vec![Comparison { field: Field::Week, operator: Operator::Gt, value: 10.0 }]);
        let b = Predicate::new(vec![Comparison { field: Field::IsOutdoor, operator: Operator::Eq, value: 1.0 }]);
        let combined = a.and(&b);
        assert_eq!(combined.comparisons.len(), 2);
    }

    #[test]
    fn test_parse_proposed_rejects_unknown_field() {
        let value = serde_json::json!({
            "comparisons": [{"field": "not_a_real_field", "operator": "Gt", "value": 1.0}]
        });
        assert!(parse_proposed(&value).is_none());
    }

    #[test]
    fn test_parse_proposed_accepts_valid_structure() {
        let value = serde_json::json!({
            "comparisons": [{"field": "EloDiffHomeMinusAway", "operator": "Gt", "value": 100.0}]
        });
        assert!(parse_proposed(&value).is_some());
    }
}
