//! A minimal reference `Classifier` so the CLI has something runnable out
//! of the box. The core makes no claim this is a good predictor — any
//! Elo-logistic-based classifier is a standard starting point for win
//! probability, grounded on the same `elo_diff_home_minus_away` field the
//! catalog's predicates already key off of. Production deployments are
//! expected to swap this for a trained model behind the same trait.

use async_trait::async_trait;

use crate::types::{CoreError, FeatureVector};

use super::Classifier;

/// `p_home_win = 1 / (1 + 10^(-(elo_diff + home_field_advantage) / 400))`,
/// the standard Elo win-probability logistic with a fixed home-field bump.
pub struct EloLogisticClassifier {
    pub home_field_advantage: f64,
}

impl Default for EloLogisticClassifier {
    fn default() -> Self {
        Self { home_field_advantage: 55.0 }
    }
}

#[async_trait]
impl Classifier for EloLogisticClassifier {
    async fn predict(&self, features: &FeatureVector) -> Result<f64, CoreError> {
        let adjusted_diff = features.elo_diff_home_minus_away + self.home_field_advantage;
        Ok(1.0 / (1.0 + 10f64.powf(-adjusted_diff / 400.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GameId, RoofType};
    use chrono::Utc;

    fn fv(elo_diff: f64) -> FeatureVector {
        FeatureVector {
            game_id: GameId { season: 2024, week: 1, away: "AWY".into(), home: "HME".into() },
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
            forecast_wind_mph: 0.0,
            forecast_temp_f: 60.0,
            forecast_precip_prob: 0.0,
            referee_home_win_rate: 0.5,
            home_injury_impact: 0.0,
            away_injury_impact: 0.0,
            source_timestamps: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_even_elo_favors_home_slightly() {
        let classifier = EloLogisticClassifier::default();
        let p = classifier.predict(&fv(0.0)).await.unwrap();
        assert!(p > 0.5);
    }

    #[tokio::test]
    async fn test_large_elo_edge_dominates_home_field() {
        let classifier = EloLogisticClassifier::default();
        let p = classifier.predict(&fv(-400.0)).await.unwrap();
        assert!(p < 0.3);
    }
}
