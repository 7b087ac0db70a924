//! Recommendation emission (§4.4 step 10): assembles the final wire-format
//! `Recommendation`, derives its display tier from classifier confidence,
//! and persists it to both the ledger and the permanent history tier before
//! returning it to the caller.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::types::{FeatureVector, GameId, Recommendation, Tier, WagerSide};

/// Maps confidence to a display tier, reusing the same breakpoints the
/// staking multiplier uses for `f(confidence)` — a recommendation the
/// engine is willing to size up is the same one worth calling out as
/// top-tier to a reader of the ledger.
pub fn tier_for_confidence(confidence: f64) -> Tier {
    if confidence > 0.75 {
        Tier::S
    } else if confidence > 0.70 {
        Tier::A
    } else if confidence > 0.65 {
        Tier::B
    } else {
        Tier::C
    }
}

#[allow(clippy::too_many_arguments)]
pub fn build_recommendation(
    game_id: GameId,
    kickoff_utc: DateTime<Utc>,
    side: WagerSide,
    stake_fraction: Decimal,
    stake_amount: Decimal,
    model_prob: f64,
    implied_prob: f64,
    raw_edge: f64,
    matched_edges: Vec<String>,
    confidence: f64,
    best_book: String,
    best_odds: i32,
    generated_at: DateTime<Utc>,
    fv: &FeatureVector,
    stale_inputs: Vec<String>,
) -> Recommendation {
    Recommendation {
        game_id,
        kickoff_utc,
        side,
        stake_fraction,
        stake_amount,
        model_prob,
        implied_prob,
        raw_edge,
        matched_edges,
        confidence,
        tier: tier_for_confidence(confidence),
        best_book,
        best_odds,
        generated_at,
        feature_snapshot_hash: fv.snapshot_hash(),
        stale_inputs,
        result: None,
    }
}
