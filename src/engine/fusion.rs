//! Matched-Edge fusion (§4.4 step 7): folds every active catalog Edge whose
//! predicate matched this game's FeatureVector into the raw classifier
//! confidence, and applies the unanimous-override rule for wager side.

use crate::types::{Edge, WagerSide};

#[derive(Debug, Clone)]
pub struct FusionResult {
    pub side: WagerSide,
    pub confidence: f64,
    pub matched_edges: Vec<String>,
    pub max_historical_edge: f64,
}

/// Fold `matched` into the classifier's raw (side, confidence) pair.
///
/// Side override: if every matched Edge recommends the same side and it
/// disagrees with `model_side`, the catalog wins — a catalog Edge only
/// reaches Active status after clearing the full discovery validation bar,
/// so unanimous historical agreement outweighs a single model call. A split
/// catalog (Edges disagreeing with each other) is not unanimous and leaves
/// `model_side` untouched.
///
/// Confidence bump: each matched Edge multiplies confidence by
/// `1 + max(0, recent_win_rate - 0.5)`, clamped to 1.0. Edges with a
/// recent win rate at or below coin-flip contribute no bump.
pub fn fuse(matched: &[Edge], model_side: WagerSide, base_confidence: f64) -> FusionResult {
    if matched.is_empty() {
        return FusionResult { side: model_side, confidence: base_confidence, matched_edges: Vec::new(), max_historical_edge: 0.0 };
    }

    let unanimous_side = matched.iter().map(|e| e.recommended_side).all(|s| s == matched[0].recommended_side).then_some(matched[0].recommended_side);
    let side = unanimous_side.unwrap_or(model_side);

    let mut confidence = base_confidence;
    for edge in matched {
        let bump = 1.0 + (edge.recent_stats.win_rate - 0.5).max(0.0);
        confidence = (confidence * bump).min(1.0);
    }

    let max_historical_edge = matched.iter().map(|e| e.discovery_stats.effect_size).fold(0.0_f64, f64::max);

    FusionResult { side, confidence, matched_edges: matched.iter().map(|e| e.edge_id.clone()).collect(), max_historical_edge }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::predicate::{Comparison, Field, Operator, Predicate};
    use crate::types::{EdgeStats, EdgeStatus};
    use chrono::Utc;

    fn make_edge(side: WagerSide, recent_win_rate: f64, effect_size: f64) -> Edge {
        let predicate = Predicate::new(vec![Comparison { field: Field::EloDiffHomeMinusAway, operator: Operator::Gt, value: 50.0 }]);
        Edge {
            edge_id: format!("edge-{recent_win_rate}-{effect_size}"),
            predicate,
            recommended_side: side,
            status: EdgeStatus::Active,
            discovery_stats: EdgeStats { effect_size, ..EdgeStats::zero() },
            recent_stats: EdgeStats { win_rate: recent_win_rate, ..EdgeStats::zero() },
            version: 1,
            created_at: Utc::now(),
            promoted_at: Some(Utc::now()),
            retired_at: None,
        }
    }

    #[test]
    fn test_fuse_with_no_matches_passes_through_unchanged() {
        let result = fuse(&[], WagerSide::Home, 0.6);
        assert_eq!(result.side, WagerSide::Home);
        assert_eq!(result.confidence, 0.6);
        assert!(result.matched_edges.is_empty());
    }

    #[test]
    fn test_fuse_bumps_confidence_multiplicatively() {
        let edges = vec![make_edge(WagerSide::Home, 0.60, 0.08), make_edge(WagerSide::Home, 0.55, 0.04)];
        let result = fuse(&edges, WagerSide::Home, 0.5);
        assert!(result.confidence > 0.5 * 1.1 * 1.05 - 1e-9);
        assert_eq!(result.matched_edges.len(), 2);
        assert!((result.max_historical_edge - 0.08).abs() < 1e-9);
    }

    #[test]
    fn test_fuse_overrides_side_when_unanimous_and_disagreeing() {
        let edges = vec![make_edge(WagerSide::Away, 0.60, 0.08), make_edge(WagerSide::Away, 0.58, 0.07)];
        let result = fuse(&edges, WagerSide::Home, 0.55);
        assert_eq!(result.side, WagerSide::Away);
    }

    #[test]
    fn test_fuse_leaves_side_untouched_when_catalog_split() {
        let edges = vec![make_edge(WagerSide::Away, 0.60, 0.08), make_edge(WagerSide::Home, 0.58, 0.07)];
        let result = fuse(&edges, WagerSide::Home, 0.55);
        assert_eq!(result.side, WagerSide::Home);
    }

    #[test]
    fn test_fuse_confidence_clamped_to_one() {
        let edges = vec![make_edge(WagerSide::Home, 0.90, 0.3), make_edge(WagerSide::Home, 0.85, 0.25)];
        let result = fuse(&edges, WagerSide::Home, 0.9);
        assert!(result.confidence <= 1.0);
    }
}
