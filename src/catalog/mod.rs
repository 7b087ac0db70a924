//! Edge Catalog (C1): durable, queryable registry of every hypothesis the
//! system has ever considered, along with its lifecycle and metrics.
//!
//! Grounded on the teacher's `strategy::edge` (threshold/match shape) for
//! the gate logic and `storage::mod` for the persistence-wrapper shape,
//! now backed by `catalog::store`'s sqlite store instead of flat JSON.

pub mod predicate;
pub mod similarity;
pub mod store;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::CatalogConfig;
use crate::types::{CoreError, Edge, EdgeStats, EdgeStatus, WagerSide};
use predicate::Predicate;
use similarity::predicate_similarity;
use store::CatalogStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Accepted,
    Duplicate,
    VersionBump,
}

pub struct EdgeCatalog {
    store: CatalogStore,
    config: CatalogConfig,
}

impl EdgeCatalog {
    pub fn new(store: CatalogStore, config: CatalogConfig) -> Self {
        Self { store, config }
    }

    /// Register a freshly discovered candidate edge. Computes similarity
    /// against every existing edge's predicate; `>= similarity_threshold`
    /// triggers either a version bump (candidate materially better) or a
    /// duplicate rejection.
    pub async fn register(&self, mut candidate: Edge) -> Result<(RegisterOutcome, Edge)> {
        let existing = self.store.list_all_latest().await?;
        let candidate_canon = candidate.predicate.canonical_form();

        let mut best_match: Option<&Edge> = None;
        let mut best_sim = 0.0;
        for edge in &existing {
            let sim = predicate_similarity(&candidate_canon, &edge.predicate.canonical_form());
            if sim >= self.config.similarity_threshold
                && (sim > best_sim || (sim == best_sim && is_older(edge, best_match)))
            {
                best_sim = sim;
                best_match = Some(edge);
            }
        }

        let Some(incumbent) = best_match else {
            candidate.edge_id = Edge::compute_id(&candidate.predicate, candidate.version);
            self.store.upsert(&candidate).await?;
            info!(edge_id = %candidate.edge_id, "new candidate edge registered");
            return Ok((RegisterOutcome::Accepted, candidate));
        };

        let win_rate_gain = candidate.discovery_stats.win_rate - incumbent.discovery_stats.win_rate;
        let roi_gain = candidate.discovery_stats.roi - incumbent.discovery_stats.roi;
        let improves = win_rate_gain >= self.config.min_improvement_pp || roi_gain >= self.config.min_improvement_pp;
        let enough_sample = (candidate.discovery_stats.sample_size as f64)
            >= self.config.min_sample_multiplier * incumbent.discovery_stats.sample_size as f64;

        if improves && enough_sample {
            let mut retired_incumbent = incumbent.clone();
            retired_incumbent.status = EdgeStatus::Retired;
            retired_incumbent.retired_at = Some(Utc::now());
            self.store.upsert(&retired_incumbent).await?;

            candidate.version = incumbent.version + 1;
            candidate.edge_id = incumbent.edge_id.clone();
            candidate.status = EdgeStatus::Candidate;
            self.store.upsert(&candidate).await?;
            info!(edge_id = %candidate.edge_id, version = candidate.version, "version bump accepted");
            Ok((RegisterOutcome::VersionBump, candidate))
        } else {
            debug!(edge_id = %incumbent.edge_id, similarity = best_sim, "candidate rejected as duplicate");
            Ok((RegisterOutcome::Duplicate, incumbent.clone()))
        }
    }

    /// Move `candidate` -> `active` iff the activation invariant holds.
    /// Idempotent: promoting an already-active edge is a no-op success.
    pub async fn promote(&self, edge_id: &str) -> Result<Edge> {
        let mut edge = self
            .store
            .get_latest(edge_id)
            .await?
            .ok_or_else(|| CoreError::CatalogWriteConflict(format!("no such edge: {edge_id}")))?;

        if edge.status == EdgeStatus::Active {
            return Ok(edge);
        }

        if !edge.meets_activation_invariant() {
            return Err(CoreError::InsufficientData {
                sample_size: edge.discovery_stats.sample_size,
                required: self.config.min_sample,
            }
            .into());
        }

        edge.status = EdgeStatus::Active;
        edge.promoted_at = Some(Utc::now());
        self.store.upsert(&edge).await?;
        info!(edge_id = %edge.edge_id, "edge promoted to active");
        Ok(edge)
    }

    pub async fn list_active(&self) -> Result<Vec<Edge>> {
        self.store.list_by_status(EdgeStatus::Active).await
    }

    /// Append a settled outcome to the trailing window used by
    /// `recent_stats`; retire automatically if the decay threshold is
    /// crossed for a full monitoring window.
    pub async fn record_observation(&self, edge_id: &str, won: bool, payout_multiple: f64) -> Result<Edge> {
        let mut edge = self
            .store
            .get_latest(edge_id)
            .await?
            .ok_or_else(|| CoreError::CatalogWriteConflict(format!("no such edge: {edge_id}")))?;

        let stats = &mut edge.recent_stats;
        stats.sample_size += 1;
        if won {
            stats.wins += 1;
        }
        stats.win_rate = stats.wins as f64 / stats.sample_size as f64;
        let profit_this = if won { payout_multiple - 1.0 } else { -1.0 };
        stats.roi = ((stats.roi * (stats.sample_size - 1) as f64) + profit_this) / stats.sample_size as f64;

        let decay_threshold = crate::types::break_even_for_odds(-110) - self.config.decay_margin;
        let window_full = stats.sample_size as usize >= self.config.recent_window_size;

        self.store.upsert(&edge).await?;

        if window_full && stats.win_rate < decay_threshold && edge.status != EdgeStatus::Retired {
            warn!(edge_id = %edge.edge_id, win_rate = stats.win_rate, "edge decayed below threshold, retiring");
            edge = self.retire(edge_id, "decay threshold crossed").await?;
        }

        Ok(edge)
    }

    /// Move an edge to `retired`. Frozen except for metadata; reversible
    /// only via a subsequent version bump through `register`.
    pub async fn retire(&self, edge_id: &str, reason: &str) -> Result<Edge> {
        let mut edge = self
            .store
            .get_latest(edge_id)
            .await?
            .ok_or_else(|| CoreError::CatalogWriteConflict(format!("no such edge: {edge_id}")))?;
        edge.status = EdgeStatus::Retired;
        edge.retired_at = Some(Utc::now());
        self.store.upsert(&edge).await?;
        info!(edge_id = %edge.edge_id, reason, "edge retired");
        Ok(edge)
    }

    /// Edges currently active whose predicate matches the given
    /// (FeatureVector, Game), for C4's edge-fusion step.
    pub async fn matching_active(
        &self,
        fv: &crate::types::FeatureVector,
        game: &crate::types::Game,
    ) -> Result<Vec<Edge>> {
        let active = self.list_active().await?;
        Ok(active.into_iter().filter(|e| e.predicate.evaluate(fv, game)).collect())
    }
}

fn is_older(candidate: &Edge, current_best: Option<&Edge>) -> bool {
    match current_best {
        None => true,
        Some(best) => candidate.created_at < best.created_at,
    }
}

/// Construct a fresh candidate Edge ready for `EdgeCatalog::register`.
pub fn new_candidate(predicate: Predicate, side: WagerSide, stats: EdgeStats) -> Edge {
    let version = 1;
    Edge {
        edge_id: Edge::compute_id(&predicate, version),
        predicate,
        recommended_side: side,
        status: EdgeStatus::Candidate,
        discovery_stats: stats,
        recent_stats: EdgeStats::zero(),
        version,
        created_at: Utc::now(),
        promoted_at: None,
        retired_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::predicate::{Comparison, Field, Operator};
    use crate::config::CatalogConfig;

    async fn test_catalog() -> EdgeCatalog {
        let store = CatalogStore::connect("sqlite::memory:").await.unwrap();
        EdgeCatalog::new(store, CatalogConfig::default())
    }

    fn stats(sample_size: u32, win_rate: f64, p_value: f64) -> EdgeStats {
        EdgeStats {
            sample_size,
            wins: (sample_size as f64 * win_rate).round() as u32,
            win_rate,
            roi: (win_rate - 0.5) * 2.0,
            p_value,
            effect_size: win_rate - 0.5,
        }
    }

    fn elo_gap_predicate(threshold: f64) -> Predicate {
        Predicate::new(vec![Comparison { field: Field::EloDiffHomeMinusAway, operator: Operator::Gt, value: threshold }])
    }

    #[tokio::test]
    async fn test_register_new_non_similar_candidate_accepted() {
        let catalog = test_catalog().await;
        let candidate = new_candidate(elo_gap_predicate(100.0), WagerSide::Home, stats(400, 0.70, 0.0001));
        let (outcome, _) = catalog.register(candidate).await.unwrap();
        assert_eq!(outcome, RegisterOutcome::Accepted);
    }

    #[tokio::test]
    async fn test_register_exact_duplicate_rejected() {
        let catalog = test_catalog().await;
        let first = new_candidate(elo_gap_predicate(100.0), WagerSide::Home, stats(400, 0.70, 0.0001));
        catalog.register(first).await.unwrap();

        let second = new_candidate(elo_gap_predicate(100.0), WagerSide::Home, stats(400, 0.70, 0.0001));
        let (outcome, _) = catalog.register(second).await.unwrap();
        assert_eq!(outcome, RegisterOutcome::Duplicate);
    }

    #[tokio::test]
    async fn test_register_idempotent_on_literal_rerun() {
        let catalog = test_catalog().await;
        let edge = new_candidate(elo_gap_predicate(100.0), WagerSide::Home, stats(400, 0.70, 0.0001));
        catalog.register(edge.clone()).await.unwrap();
        let active_before = catalog.store.list_all_latest().await.unwrap().len();
        catalog.register(edge).await.unwrap();
        let active_after = catalog.store.list_all_latest().await.unwrap().len();
        assert_eq!(active_before, active_after, "catalog must be unchanged on duplicate re-register");
    }

    #[tokio::test]
    async fn test_register_similar_but_superior_candidate_version_bumps() {
        let catalog = test_catalog().await;
        let incumbent = new_candidate(elo_gap_predicate(100.0), WagerSide::Home, stats(400, 0.70, 0.0001));
        catalog.register(incumbent).await.unwrap();

        // Nearly identical predicate (threshold nudged by 5), materially better metrics and sample.
        let better = new_candidate(elo_gap_predicate(105.0), WagerSide::Home, stats(800, 0.76, 0.00001));
        let (outcome, edge) = catalog.register(better).await.unwrap();
        assert_eq!(outcome, RegisterOutcome::VersionBump);
        assert_eq!(edge.version, 2);
    }

    #[tokio::test]
    async fn test_promote_fails_below_min_sample() {
        let catalog = test_catalog().await;
        let edge = new_candidate(elo_gap_predicate(100.0), WagerSide::Home, stats(50, 0.70, 0.0001));
        let (_, edge) = catalog.register(edge).await.unwrap();
        let result = catalog.promote(&edge.edge_id).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_promote_succeeds_and_is_idempotent() {
        let catalog = test_catalog().await;
        let edge = new_candidate(elo_gap_predicate(100.0), WagerSide::Home, stats(400, 0.70, 0.0001));
        let (_, edge) = catalog.register(edge).await.unwrap();

        let promoted = catalog.promote(&edge.edge_id).await.unwrap();
        assert_eq!(promoted.status, EdgeStatus::Active);

        let promoted_again = catalog.promote(&edge.edge_id).await.unwrap();
        assert_eq!(promoted_again.status, EdgeStatus::Active);
    }

    #[tokio::test]
    async fn test_list_active_only_returns_active() {
        let catalog = test_catalog().await;
        let edge = new_candidate(elo_gap_predicate(100.0), WagerSide::Home, stats(400, 0.70, 0.0001));
        let (_, edge) = catalog.register(edge).await.unwrap();
        assert!(catalog.list_active().await.unwrap().is_empty());
        catalog.promote(&edge.edge_id).await.unwrap();
        assert_eq!(catalog.list_active().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_record_observation_decay_retires_edge() {
        let mut config = CatalogConfig::default();
        config.recent_window_size = 5;
        let store = CatalogStore::connect("sqlite::memory:").await.unwrap();
        let catalog = EdgeCatalog::new(store, config);

        let edge = new_candidate(elo_gap_predicate(100.0), WagerSide::Home, stats(400, 0.70, 0.0001));
        let (_, edge) = catalog.register(edge).await.unwrap();
        catalog.promote(&edge.edge_id).await.unwrap();

        // Feed a losing trailing window (win rate well below break-even).
        for _ in 0..5 {
            catalog.record_observation(&edge.edge_id, false, 0.0).await.unwrap();
        }

        let stored = catalog.store.get_latest(&edge.edge_id).await.unwrap().unwrap();
        assert_eq!(stored.status, EdgeStatus::Retired);
        assert!(stored.retired_at.is_some());
    }

    #[tokio::test]
    async fn test_retired_edge_never_matches() {
        let catalog = test_catalog().await;
        let edge = new_candidate(elo_gap_predicate(100.0), WagerSide::Home, stats(400, 0.70, 0.0001));
        let (_, edge) = catalog.register(edge).await.unwrap();
        catalog.promote(&edge.edge_id).await.unwrap();
        catalog.retire(&edge.edge_id, "manual test retirement").await.unwrap();
        assert!(catalog.list_active().await.unwrap().is_empty());
    }
}
