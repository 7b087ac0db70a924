//! Statistical validation for candidate predicates (§4.2.2–4.2.3):
//! two-sided binomial test against p=0.5, ROI at standard odds, and a
//! train/holdout split so a candidate must clear both the training sample
//! and an independent holdout before it reaches the catalog.

use crate::types::break_even_for_odds;

/// Standard deviation-normalized normal CDF via the Abramowitz & Stegun
/// 7.1.26 rational approximation (max error ~1.5e-7). No stats crate is in
/// the dependency stack, so this is hand-rolled rather than pulled in.
fn standard_normal_cdf(z: f64) -> f64 {
    let sign = if z < 0.0 { -1.0 } else { 1.0 };
    let x = z.abs() / std::f64::consts::SQRT_2;

    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let t = 1.0 / (1.0 + p * x);
    let poly = ((((a5 * t + a4) * t + a3) * t + a2) * t + a1) * t;
    let erf = 1.0 - poly * (-x * x).exp();

    0.5 * (1.0 + sign * erf)
}

/// Two-sided p-value for observing `wins` out of `sample_size` trials
/// against the null hypothesis p=0.5, using the continuity-corrected
/// normal approximation to the binomial distribution.
pub fn binomial_p_value(wins: u32, sample_size: u32) -> f64 {
    if sample_size == 0 {
        return 1.0;
    }
    let n = sample_size as f64;
    let x = wins as f64;
    let expected = n * 0.5;
    let std_dev = (n * 0.5 * 0.5).sqrt();
    if std_dev < 1e-12 {
        return 1.0;
    }
    let z = ((x - expected).abs() - 0.5).max(0.0) / std_dev;
    2.0 * (1.0 - standard_normal_cdf(z))
}

/// ROI per dollar staked at standard -110 odds, given a win rate.
pub fn roi_at_standard_odds(win_rate: f64) -> f64 {
    let payout = 1.0 / break_even_for_odds(-110) - 1.0;
    win_rate * payout - (1.0 - win_rate)
}

/// One observed (won, value) pair used for a train/holdout split.
#[derive(Debug, Clone, Copy)]
pub struct Observation {
    pub won: bool,
}

/// Outcome of validating a candidate predicate's historical sample (§4.2.2).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationResult {
    pub sample_size: u32,
    pub win_rate: f64,
    pub roi: f64,
    pub p_value: f64,
    pub holdout_sample_size: u32,
    pub holdout_win_rate: f64,
    pub passes: bool,
}

/// Validate a candidate predicate's matched-game sample per the Edge
/// Discoverer algorithm: require the full sample to clear `min_sample` and
/// `max_p_value`, and require the most-recent holdout slice to clear
/// break-even at standard odds. `observations` must be chronological — the
/// holdout is a straight suffix cut, not a reshuffle, so no holdout game
/// ever precedes a training game.
pub fn validate(observations: &[Observation], holdout_fraction: f64, min_sample: u32, max_p_value: f64) -> ValidationResult {
    let sample_size = observations.len() as u32;
    let wins = observations.iter().filter(|o| o.won).count() as u32;
    let win_rate = if sample_size > 0 { wins as f64 / sample_size as f64 } else { 0.0 };
    let p_value = binomial_p_value(wins, sample_size);
    let roi = roi_at_standard_odds(win_rate);

    let split_at = ((observations.len() as f64) * (1.0 - holdout_fraction)).round() as usize;
    let (_, holdout) = observations.split_at(split_at.min(observations.len()));
    let holdout_wins = holdout.iter().filter(|o| o.won).count() as u32;
    let holdout_sample_size = holdout.len() as u32;
    let holdout_win_rate = if holdout_sample_size > 0 { holdout_wins as f64 / holdout_sample_size as f64 } else { 0.0 };

    let passes = sample_size >= min_sample
        && p_value < max_p_value
        && holdout_sample_size > 0
        && holdout_win_rate >= break_even_for_odds(-110);

    ValidationResult { sample_size, win_rate, roi, p_value, holdout_sample_size, holdout_win_rate, passes }
}
