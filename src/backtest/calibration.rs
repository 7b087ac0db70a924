//! Classifier calibration tracking (§4.5 ambient tooling): measures how well
//! `Classifier::predict`'s probability estimates match reality across a
//! backtest or live run. Computes calibration curves, Brier scores per
//! season, and a coarse over/under-confidence diagnosis.

use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Calibration data
// ---------------------------------------------------------------------------

/// A single prediction-outcome pair: the classifier's `model_prob` for the
/// side that was recommended, and whether that side actually won.
#[derive(Debug, Clone)]
pub struct CalibrationPoint {
    pub game_id: String,
    pub season: i32,
    pub estimated_probability: f64,
    pub resolved_won: bool,
}

/// Calibration analysis results.
#[derive(Debug, Clone)]
pub struct CalibrationReport {
    pub total_predictions: usize,
    pub overall_brier: f64,
    /// Brier score per season.
    pub season_brier: HashMap<i32, f64>,
    /// Calibration buckets: for each 10% bin, the predicted vs actual rate.
    pub calibration_curve: Vec<CalibrationBucket>,
    /// Whether the classifier is over-confident, under-confident, or well-calibrated.
    pub diagnosis: CalibrationDiagnosis,
}

/// A bucket in the calibration curve (e.g., all predictions between 0.60-0.70).
#[derive(Debug, Clone)]
pub struct CalibrationBucket {
    pub bin_start: f64,
    pub bin_end: f64,
    pub mean_predicted: f64,
    pub actual_rate: f64,
    pub count: usize,
    /// Absolute deviation: |mean_predicted - actual_rate|
    pub deviation: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationDiagnosis {
    WellCalibrated,
    OverConfident,    // Predicted probabilities too extreme
    UnderConfident,   // Predicted probabilities too central
    InsufficientData, // Not enough predictions to diagnose
}

// ---------------------------------------------------------------------------
// Calibrator
// ---------------------------------------------------------------------------

pub struct Calibrator {
    points: Vec<CalibrationPoint>,
    /// Number of bins for the calibration curve.
    num_bins: usize,
}

impl Default for Calibrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Calibrator {
    pub fn new() -> Self {
        Self { points: Vec::new(), num_bins: 10 }
    }

    /// Add a resolved prediction.
    pub fn add_point(&mut self, point: CalibrationPoint) {
        self.points.push(point);
    }

    /// Add multiple resolved predictions.
    pub fn add_points(&mut self, points: Vec<CalibrationPoint>) {
        self.points.extend(points);
    }

    /// Number of tracked predictions.
    pub fn count(&self) -> usize {
        self.points.len()
    }

    /// Generate a full calibration report.
    pub fn report(&self) -> CalibrationReport {
        if self.points.is_empty() {
            return CalibrationReport {
                total_predictions: 0,
                overall_brier: 0.0,
                season_brier: HashMap::new(),
                calibration_curve: Vec::new(),
                diagnosis: CalibrationDiagnosis::InsufficientData,
            };
        }

        let overall_brier = Self::compute_brier(&self.points);
        let season_brier = self.compute_season_brier();
        let calibration_curve = self.compute_calibration_curve();
        let diagnosis = self.diagnose(&calibration_curve);

        CalibrationReport { total_predictions: self.points.len(), overall_brier, season_brier, calibration_curve, diagnosis }
    }

    /// Compute Brier score for a set of predictions.
    /// Brier = (1/N) * Σ(predicted - outcome)²
    /// Lower is better. 0.0 = perfect, 0.25 = random at 50/50.
    fn compute_brier(points: &[CalibrationPoint]) -> f64 {
        if points.is_empty() {
            return 0.0;
        }
        let sum: f64 = points
            .iter()
            .map(|p| {
                let outcome = if p.resolved_won { 1.0 } else { 0.0 };
                (p.estimated_probability - outcome).powi(2)
            })
            .sum();
        sum / points.len() as f64
    }

    /// Compute Brier score broken down by season.
    fn compute_season_brier(&self) -> HashMap<i32, f64> {
        let mut by_season: HashMap<i32, Vec<&CalibrationPoint>> = HashMap::new();
        for p in &self.points {
            by_season.entry(p.season).or_default().push(p);
        }

        by_season
            .into_iter()
            .map(|(season, points)| {
                let sum: f64 = points
                    .iter()
                    .map(|p| {
                        let outcome = if p.resolved_won { 1.0 } else { 0.0 };
                        (p.estimated_probability - outcome).powi(2)
                    })
                    .sum();
                (season, sum / points.len() as f64)
            })
            .collect()
    }

    /// Compute the calibration curve — bin predictions and compare to actual rates.
    fn compute_calibration_curve(&self) -> Vec<CalibrationBucket> {
        let bin_width = 1.0 / self.num_bins as f64;
        let mut buckets = Vec::with_capacity(self.num_bins);

        for i in 0..self.num_bins {
            let bin_start = i as f64 * bin_width;
            let bin_end = bin_start + bin_width;

            let in_bin: Vec<&CalibrationPoint> = self
                .points
                .iter()
                .filter(|p| p.estimated_probability >= bin_start && (p.estimated_probability < bin_end || (i == self.num_bins - 1 && p.estimated_probability <= bin_end)))
                .collect();

            if in_bin.is_empty() {
                buckets.push(CalibrationBucket { bin_start, bin_end, mean_predicted: (bin_start + bin_end) / 2.0, actual_rate: 0.0, count: 0, deviation: 0.0 });
                continue;
            }

            let count = in_bin.len();
            let mean_predicted = in_bin.iter().map(|p| p.estimated_probability).sum::<f64>() / count as f64;
            let actual_rate = in_bin.iter().filter(|p| p.resolved_won).count() as f64 / count as f64;
            let deviation = (mean_predicted - actual_rate).abs();

            buckets.push(CalibrationBucket { bin_start, bin_end, mean_predicted, actual_rate, count, deviation });
        }

        buckets
    }

    /// Diagnose overall calibration quality.
    fn diagnose(&self, curve: &[CalibrationBucket]) -> CalibrationDiagnosis {
        let populated: Vec<&CalibrationBucket> = curve.iter().filter(|b| b.count >= 3).collect();

        if populated.len() < 3 || self.points.len() < 20 {
            return CalibrationDiagnosis::InsufficientData;
        }

        let mut overconfident_signals = 0;
        let mut underconfident_signals = 0;

        for bucket in &populated {
            if bucket.deviation < 0.05 {
                continue;
            }

            let mid = (bucket.bin_start + bucket.bin_end) / 2.0;

            if mid < 0.3 {
                if bucket.actual_rate > bucket.mean_predicted {
                    overconfident_signals += 1;
                } else {
                    underconfident_signals += 1;
                }
            } else if mid > 0.7 {
                if bucket.actual_rate < bucket.mean_predicted {
                    overconfident_signals += 1;
                } else {
                    underconfident_signals += 1;
                }
            }
        }

        if overconfident_signals > underconfident_signals + 1 {
            CalibrationDiagnosis::OverConfident
        } else if underconfident_signals > overconfident_signals + 1 {
            CalibrationDiagnosis::UnderConfident
        } else {
            CalibrationDiagnosis::WellCalibrated
        }
    }

    /// Generate a prompt snippet for retraining/self-improvement review.
    pub fn prompt_snippet(&self) -> String {
        let report = self.report();
        let mut parts = Vec::new();

        parts.push(format!("CALIBRATION DATA ({} resolved predictions):", report.total_predictions));
        parts.push(format!("Overall Brier score: {:.3}", report.overall_brier));

        let mut seasons: Vec<&i32> = report.season_brier.keys().collect();
        seasons.sort();
        for season in seasons {
            parts.push(format!("  {season} Brier: {:.3}", report.season_brier[season]));
        }

        match &report.diagnosis {
            CalibrationDiagnosis::OverConfident => parts.push("DIAGNOSIS: Classifier has been OVERCONFIDENT. Pull estimates toward 50%.".into()),
            CalibrationDiagnosis::UnderConfident => parts.push("DIAGNOSIS: Classifier has been UNDERCONFIDENT. Estimates could be more decisive.".into()),
            CalibrationDiagnosis::WellCalibrated => parts.push("DIAGNOSIS: Calibration is good. Maintain current approach.".into()),
            CalibrationDiagnosis::InsufficientData => parts.push("DIAGNOSIS: Not enough data yet for calibration feedback.".into()),
        }

        parts.join("\n")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
