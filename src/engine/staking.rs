//! Quarter-Kelly position sizing (§4.4 step 9), adapted from the fractional
//! Kelly pattern to single-side American-odds betting: rather than a
//! YES/NO market price, the payout ratio `b` is derived from the book's
//! American odds on the recommended side.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::config::EngineConfig;
use crate::types::BankrollState;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizedStake {
    pub kelly_fraction: f64,
    pub stake_fraction: Decimal,
    pub stake_amount: Decimal,
}

/// Net payout ratio per dollar risked, from American odds.
fn payout_ratio(american_odds: i32) -> f64 {
    if american_odds > 0 {
        american_odds as f64 / 100.0
    } else {
        100.0 / (american_odds.unsigned_abs() as f64)
    }
}

/// f(confidence): the classifier's own confidence in the matched (model
/// probability, side) pair scales the base Kelly stake up for strong calls
/// and down for marginal ones.
fn confidence_multiplier(confidence: f64) -> f64 {
    if confidence > 0.75 {
        2.0
    } else if confidence > 0.70 {
        1.5
    } else if confidence > 0.65 {
        1.0
    } else {
        0.5
    }
}

/// g(matched edge): a strong historical Edge backing this recommendation
/// raises conviction independent of the classifier's own confidence.
fn matched_edge_multiplier(max_historical_edge: f64) -> f64 {
    if max_historical_edge > 0.10 {
        1.5
    } else if max_historical_edge > 0.05 {
        1.2
    } else {
        1.0
    }
}

/// h(bankroll regime): throttle sizing when the recent record is weak,
/// lean in when it's strong. Mirrors the drawdown-adjusted multiplier
/// pattern but keyed on rolling win rate and Sharpe rather than drawdown
/// alone, since the bankroll here carries no open-position exposure model.
fn bankroll_regime_multiplier(rolling_win_rate: f64, recent_sharpe: f64) -> f64 {
    if rolling_win_rate < 0.52 {
        0.5
    } else if recent_sharpe < 1.0 {
        0.7
    } else if rolling_win_rate > 0.58 {
        1.3
    } else {
        1.0
    }
}

/// Quarter-Kelly stake for a recommended side at `model_prob`, priced at
/// `american_odds`, scaled by confidence, matched-edge strength, and
/// bankroll regime, then clamped to the configured floor and cap.
pub fn size_stake(
    config: &EngineConfig,
    model_prob: f64,
    american_odds: i32,
    confidence: f64,
    max_historical_edge: f64,
    bankroll: &BankrollState,
    recent_sharpe: f64,
) -> SizedStake {
    let b = payout_ratio(american_odds);
    let p = model_prob;
    let q = 1.0 - p;
    let kelly_fraction = (b * p - q) / b;

    if kelly_fraction <= 0.0 {
        debug!(kelly_fraction, "non-positive kelly fraction, no stake");
        return SizedStake { kelly_fraction, stake_fraction: Decimal::ZERO, stake_amount: Decimal::ZERO };
    }

    let scaled = kelly_fraction
        * config.kelly_fraction_base
        * confidence_multiplier(confidence)
        * matched_edge_multiplier(max_historical_edge)
        * bankroll_regime_multiplier(bankroll.rolling_win_rate(), recent_sharpe);

    let clamped = scaled.clamp(config.stake_floor_pct, config.stake_cap_pct);

    let stake_fraction = Decimal::from_f64(clamped).unwrap_or(dec!(0));
    let stake_amount = (stake_fraction * bankroll.balance).round_dp(2);

    SizedStake { kelly_fraction, stake_fraction, stake_amount }
}
