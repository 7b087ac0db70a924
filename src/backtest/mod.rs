//! Walk-Forward Backtest & Self-Improvement Loop (C5, §4.5): replays
//! history through the same procedure the live Decision Engine runs,
//! settles each reconstructed Recommendation, tracks classifier
//! calibration over the run, and feeds any statistically-sound slice of
//! the settled trade log back to the Edge Catalog as an unvalidated
//! candidate.

pub mod calibration;
pub mod patterns;
pub mod runner;

pub use calibration::{CalibrationPoint, CalibrationReport, Calibrator};
pub use patterns::{discover_candidates, feed_to_discoverer, PatternCandidate};
pub use runner::{BacktestReport, ClassifierTrainer, ReplaySource, SettledTrade, WalkForwardRunner};
