//! Template sweep (§4.2.1): a fixed catalog of parameterized predicate
//! templates swept over a coarse grid, e.g. "home favorite with Elo gap in
//! [low, high]", "outdoor total with wind above k mph". Each template
//! expands to several concrete `Predicate`s, one per grid point, each paired
//! with the wager side it hypothesizes about.

use crate::catalog::predicate::{Comparison, Field, Operator, Predicate};
use crate::types::WagerSide;

/// A named, concrete candidate predicate produced by the template sweep.
/// The name is descriptive only — it has no bearing on similarity
/// comparison, which operates on `predicate.canonical_form()`.
#[derive(Debug, Clone)]
pub struct TemplateCandidate {
    pub name: String,
    pub predicate: Predicate,
    pub side: WagerSide,
}

fn comparison(field: Field, operator: Operator, value: f64) -> Comparison {
    Comparison { field, operator, value }
}

fn candidate(name: impl Into<String>, comparisons: Vec<Comparison>, side: WagerSide) -> TemplateCandidate {
    TemplateCandidate { name: name.into(), predicate: Predicate::new(comparisons), side }
}

/// Sweep a single field against a grid of thresholds with the given
/// operator, naming each candidate `{label} {op} {value}`.
fn sweep_threshold(label: &str, field: Field, operator: Operator, grid: &[f64], side: WagerSide) -> Vec<TemplateCandidate> {
    grid.iter()
        .map(|&v| candidate(format!("{label} {} {v}", operator_word(operator)), vec![comparison(field, operator, v)], side))
        .collect()
}

fn operator_word(operator: Operator) -> &'static str {
    match operator {
        Operator::Gt => ">",
        Operator::Gte => ">=",
        Operator::Lt => "<",
        Operator::Lte => "<=",
        Operator::Eq => "==",
        Operator::Ne => "!=",
    }
}

/// Generate the full fixed template catalog. Every candidate here is a
/// hypothesis to be validated against history, not an activated Edge —
/// validation (`discovery::validation`) and catalog registration happen
/// downstream.
pub fn generate_templates() -> Vec<TemplateCandidate> {
    let mut out = Vec::new();

    // Home favorite by Elo gap, at increasingly strict thresholds.
    out.extend(sweep_threshold(
        "home favorite, elo diff",
        Field::EloDiffHomeMinusAway,
        Operator::Gt,
        &[25.0, 50.0, 75.0, 100.0, 150.0],
        WagerSide::Home,
    ));
    // Road favorite / home underdog, symmetric grid.
    out.extend(sweep_threshold(
        "home underdog, elo diff",
        Field::EloDiffHomeMinusAway,
        Operator::Lt,
        &[-25.0, -50.0, -75.0, -100.0, -150.0],
        WagerSide::Away,
    ));

    // Efficiency mismatches.
    out.extend(sweep_threshold("home offense strongly better", Field::HomeOffEfficiency, Operator::Gt, &[0.05, 0.10, 0.15], WagerSide::Home));
    out.extend(sweep_threshold("away defense strongly better", Field::AwayDefEfficiency, Operator::Gt, &[0.05, 0.10, 0.15], WagerSide::Away));

    // Rest-day mismatches (short week, bye-week advantage).
    out.push(candidate("home on short rest", vec![comparison(Field::HomeRestDays, Operator::Lte, 5.0)], WagerSide::Away));
    out.push(candidate("away on short rest", vec![comparison(Field::AwayRestDays, Operator::Lte, 5.0)], WagerSide::Home));
    out.push(candidate(
        "home rest advantage",
        vec![comparison(Field::HomeRestDays, Operator::Gt, 3.0), comparison(Field::AwayRestDays, Operator::Lte, 6.0)],
        WagerSide::Home,
    ));

    // Weather: outdoor totals under wind/precipitation favor the under.
    out.extend(
        sweep_threshold("outdoor, wind above", Field::ForecastWindMph, Operator::Gt, &[10.0, 15.0, 20.0, 25.0], WagerSide::Under)
            .into_iter()
            .map(|mut c| {
                c.predicate.comparisons.insert(0, comparison(Field::IsOutdoor, Operator::Eq, 1.0));
                c
            }),
    );
    out.push(candidate(
        "outdoor, heavy precipitation likely",
        vec![comparison(Field::IsOutdoor, Operator::Eq, 1.0), comparison(Field::ForecastPrecipProb, Operator::Gt, 0.5)],
        WagerSide::Under,
    ));
    out.push(candidate(
        "outdoor, extreme cold",
        vec![comparison(Field::IsOutdoor, Operator::Eq, 1.0), comparison(Field::ForecastTempF, Operator::Lt, 25.0)],
        WagerSide::Under,
    ));

    // Referee tendency.
    out.extend(sweep_threshold("referee favors home", Field::RefereeHomeWinRate, Operator::Gt, &[0.55, 0.58, 0.62], WagerSide::Home));

    // Injury-impact mismatches.
    out.extend(sweep_threshold("away injury impact high", Field::AwayInjuryImpact, Operator::Gt, &[0.10, 0.20, 0.30], WagerSide::Home));
    out.extend(sweep_threshold("home injury impact high", Field::HomeInjuryImpact, Operator::Gt, &[0.10, 0.20, 0.30], WagerSide::Away));

    // Season-timing: late-season / playoff-adjacent weeks.
    out.extend(sweep_threshold("late season, home", Field::Week, Operator::Gte, &[14.0, 16.0, 17.0], WagerSide::Home));

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generates_at_least_thirty_templates() {
        let templates = generate_templates();
        assert!(templates.len() >= 30, "expected a broad template sweep, got {}", templates.len());
    }

    #[test]
    fn test_every_candidate_has_at_least_one_comparison() {
        for candidate in generate_templates() {
            assert!(!candidate.predicate.comparisons.is_empty(), "{} produced an empty predicate", candidate.name);
        }
    }

    #[test]
    fn test_canonical_forms_are_unique() {
        let templates = generate_templates();
        let mut forms: Vec<String> = templates.iter().map(|c| c.predicate.canonical_form()).collect();
        forms.sort();
        let before = forms.len();
        forms.dedup();
        assert_eq!(forms.len(), before, "template sweep produced duplicate predicates");
    }

    #[test]
    fn test_outdoor_wind_templates_require_outdoor() {
        let templates = generate_templates();
        let wind_templates: Vec<_> = templates.iter().filter(|c| c.name.starts_with("outdoor, wind above")).collect();
        assert!(!wind_templates.is_empty());
        for candidate in wind_templates {
            assert!(candidate.predicate.comparisons.iter().any(|c| c.field == Field::IsOutdoor));
        }
    }
}
