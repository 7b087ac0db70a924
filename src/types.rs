//! Shared data model for the pregame decision core.
//!
//! These types are depended on by every other module (catalog, discovery,
//! orchestrator, engine, backtest) and are kept free of subsystem-specific
//! logic so they can be imported without pulling in a whole subsystem.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::catalog::predicate::Predicate;

// ---------------------------------------------------------------------------
// Game identity & schedule
// ---------------------------------------------------------------------------

/// Composite primary key for a Game: season, week, away team, home team.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameId {
    pub season: i32,
    pub week: u8,
    pub away: String,
    pub home: String,
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{}-{}-{}", self.season, self.week, self.away, self.home)
    }
}

/// Scheduled/actual lifecycle status of a Game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameStatus {
    Scheduled,
    InProgress,
    Completed,
    Postponed,
    Cancelled,
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameStatus::Scheduled => write!(f, "scheduled"),
            GameStatus::InProgress => write!(f, "in_progress"),
            GameStatus::Completed => write!(f, "completed"),
            GameStatus::Postponed => write!(f, "postponed"),
            GameStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Final score pair for a completed Game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalScore {
    pub home: i32,
    pub away: i32,
}

impl FinalScore {
    /// Home margin: positive means the home team won by this many points.
    pub fn home_margin(&self) -> i32 {
        self.home - self.away
    }
}

/// A scheduled or completed NFL game. Immutable once `status == Completed`,
/// except for the attachment of `final_score` at completion time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub kickoff_utc: DateTime<Utc>,
    pub stadium: String,
    pub status: GameStatus,
    pub final_score: Option<FinalScore>,
}

impl Game {
    /// Home margin once the game has completed, else `None`.
    pub fn result(&self) -> Option<i32> {
        self.final_score.map(|s| s.home_margin())
    }

    pub fn is_completed(&self) -> bool {
        self.status == GameStatus::Completed && self.final_score.is_some()
    }

    /// Attach a final outcome to a scheduled/in-progress game. The sole
    /// permitted mutation of a Game once play begins.
    pub fn complete(&mut self, score: FinalScore) {
        self.final_score = Some(score);
        self.status = GameStatus::Completed;
    }
}

// ---------------------------------------------------------------------------
// Stadium / Team reference data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoofType {
    Outdoor,
    Dome,
    Retractable,
}

/// Static reference data for a stadium, created once by schedule ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stadium {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub elevation_ft: f64,
    pub roof: RoofType,
    pub surface: String,
    pub timezone: String,
    pub prevailing_wind_mph: f64,
    pub wind_tunnel: bool,
    pub swirling_winds: bool,
}

/// A team's reference and rating state. `elo` is mutated by the Backtester
/// and by live schedule ingestion after each completed game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub code: String,
    pub conference: String,
    pub division: String,
    pub elo: f64,
}

impl Team {
    pub const DEFAULT_ELO: f64 = 1500.0;
    pub const ELO_K_FACTOR: f64 = 20.0;

    pub fn new(code: impl Into<String>, conference: impl Into<String>, division: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            conference: conference.into(),
            division: division.into(),
            elo: Self::DEFAULT_ELO,
        }
    }

    /// Standard logistic Elo update from one settled game's home margin.
    /// Called once per team per completed game, with the other team's
    /// pre-game rating as `opponent_elo` (the live schedule ingestion path
    /// and the walk-forward backtester are the only two callers — this is
    /// the one permitted way `elo` moves after construction).
    pub fn apply_result(&mut self, opponent_elo: f64, home_margin: i32, is_home: bool) {
        let (home_elo, away_elo) = if is_home { (self.elo, opponent_elo) } else { (opponent_elo, self.elo) };
        let expected_home = 1.0 / (1.0 + 10f64.powf(-(home_elo - away_elo) / 400.0));
        let actual_home = match home_margin.cmp(&0) {
            std::cmp::Ordering::Greater => 1.0,
            std::cmp::Ordering::Less => 0.0,
            std::cmp::Ordering::Equal => 0.5,
        };
        let delta = Self::ELO_K_FACTOR * (actual_home - expected_home);
        self.elo += if is_home { delta } else { -delta };
    }
}


// ---------------------------------------------------------------------------
// Feature vector
// ---------------------------------------------------------------------------

/// The inputs the classifier consumes for a single (Game, as-of) pair.
///
/// **Invariant:** every field must be derivable from information available
/// strictly before `as_of`. Violating this is always a
/// [`CoreError::LookAheadViolation`], never swallowed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureVector {
    pub game_id: GameId,
    pub as_of: DateTime<Utc>,
    pub elo_diff_home_minus_away: f64,
    pub home_off_efficiency: f64,
    pub home_def_efficiency: f64,
    pub away_off_efficiency: f64,
    pub away_def_efficiency: f64,
    pub home_rest_days: i64,
    pub away_rest_days: i64,
    pub roof: RoofType,
    pub surface: String,
    pub forecast_wind_mph: f64,
    pub forecast_temp_f: f64,
    pub forecast_precip_prob: f64,
    pub referee_home_win_rate: f64,
    pub home_injury_impact: f64,
    pub away_injury_impact: f64,
    /// Per-field source timestamps, used to enforce the no-look-ahead
    /// invariant. Every value here must be strictly less than `as_of`.
    pub source_timestamps: Vec<(String, DateTime<Utc>)>,
}

impl FeatureVector {
    /// Validate the no-look-ahead invariant. Returns the offending field name
    /// on violation.
    pub fn validate_no_look_ahead(&self) -> Result<(), String> {
        for (field, ts) in &self.source_timestamps {
            if *ts >= self.as_of {
                return Err(field.clone());
            }
        }
        Ok(())
    }

    /// Deterministic hash of the feature snapshot, used for reproducibility
    /// of emitted recommendations and backtest reruns.
    pub fn snapshot_hash(&self) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        self.game_id.to_string().hash(&mut hasher);
        self.as_of.timestamp_nanos_opt().unwrap_or_default().hash(&mut hasher);
        self.elo_diff_home_minus_away.to_bits().hash(&mut hasher);
        self.home_off_efficiency.to_bits().hash(&mut hasher);
        self.home_def_efficiency.to_bits().hash(&mut hasher);
        self.away_off_efficiency.to_bits().hash(&mut hasher);
        self.away_def_efficiency.to_bits().hash(&mut hasher);
        self.home_rest_days.hash(&mut hasher);
        self.away_rest_days.hash(&mut hasher);
        self.forecast_wind_mph.to_bits().hash(&mut hasher);
        self.forecast_temp_f.to_bits().hash(&mut hasher);
        self.forecast_precip_prob.to_bits().hash(&mut hasher);
        self.referee_home_win_rate.to_bits().hash(&mut hasher);
        self.home_injury_impact.to_bits().hash(&mut hasher);
        self.away_injury_impact.to_bits().hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }
}

// ---------------------------------------------------------------------------
// Edge (catalog entry)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WagerSide {
    Home,
    Away,
    Over,
    Under,
}

impl fmt::Display for WagerSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WagerSide::Home => write!(f, "home"),
            WagerSide::Away => write!(f, "away"),
            WagerSide::Over => write!(f, "over"),
            WagerSide::Under => write!(f, "under"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeStatus {
    Candidate,
    Active,
    Monitored,
    Retired,
}

impl fmt::Display for EdgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeStatus::Candidate => write!(f, "candidate"),
            EdgeStatus::Active => write!(f, "active"),
            EdgeStatus::Monitored => write!(f, "monitored"),
            EdgeStatus::Retired => write!(f, "retired"),
        }
    }
}

/// Win/ROI/significance statistics for an Edge, computed either over its
/// full discovery sample or a trailing monitoring window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeStats {
    pub sample_size: u32,
    pub wins: u32,
    pub win_rate: f64,
    pub roi: f64,
    pub p_value: f64,
    pub effect_size: f64,
}

impl EdgeStats {
    pub fn zero() -> Self {
        Self {
            sample_size: 0,
            wins: 0,
            win_rate: 0.0,
            roi: 0.0,
            p_value: 1.0,
            effect_size: 0.0,
        }
    }
}

/// A historically validated betting edge: predicate, lifecycle state, and
/// both full-sample and trailing-window statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub edge_id: String,
    pub predicate: Predicate,
    pub recommended_side: WagerSide,
    pub status: EdgeStatus,
    pub discovery_stats: EdgeStats,
    pub recent_stats: EdgeStats,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub promoted_at: Option<DateTime<Utc>>,
    pub retired_at: Option<DateTime<Utc>>,
}

impl Edge {
    /// Deterministic edge_id: a hash of the predicate's canonical form plus
    /// version.
    pub fn compute_id(predicate: &Predicate, version: u32) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        predicate.canonical_form().hash(&mut hasher);
        version.hash(&mut hasher);
        format!("edge-{:016x}", hasher.finish())
    }

    /// No Edge may hold `Active` status without sample_size >= 100 and
    /// p_value < 0.01.
    pub fn meets_activation_invariant(&self) -> bool {
        self.discovery_stats.sample_size >= 100 && self.discovery_stats.p_value < 0.01
    }
}

// ---------------------------------------------------------------------------
// Odds
// ---------------------------------------------------------------------------

/// A single book's quoted line for one side of a market.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OddsQuote {
    pub american_odds: i32,
    pub decimal_odds: f64,
    pub observed_at: DateTime<Utc>,
}

impl OddsQuote {
    /// Implied probability from American odds, vig included.
    pub fn implied_probability(&self) -> f64 {
        if self.american_odds > 0 {
            100.0 / (self.american_odds as f64 + 100.0)
        } else {
            (-self.american_odds) as f64 / ((-self.american_odds) as f64 + 100.0)
        }
    }
}

/// Break-even win probability required at the given American odds to show
/// zero expected profit.
pub fn break_even_for_odds(american_odds: i32) -> f64 {
    OddsQuote {
        american_odds,
        decimal_odds: 0.0,
        observed_at: Utc::now(),
    }
    .implied_probability()
}

// ---------------------------------------------------------------------------
// Recommendation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    S,
    A,
    B,
    C,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::S => write!(f, "S"),
            Tier::A => write!(f, "A"),
            Tier::B => write!(f, "B"),
            Tier::C => write!(f, "C"),
        }
    }
}

/// Outcome of a settled Recommendation, attached post-game.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SettlementResult {
    pub won: bool,
    pub profit: Decimal,
    pub clv: f64,
}

/// Emitted by the Decision Engine. Immutable once emitted — settlement
/// writes a paired outcome record rather than mutating this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub game_id: GameId,
    pub kickoff_utc: DateTime<Utc>,
    pub side: WagerSide,
    pub stake_fraction: Decimal,
    pub stake_amount: Decimal,
    pub model_prob: f64,
    pub implied_prob: f64,
    pub raw_edge: f64,
    pub matched_edges: Vec<String>,
    pub confidence: f64,
    pub tier: Tier,
    pub best_book: String,
    pub best_odds: i32,
    pub generated_at: DateTime<Utc>,
    pub feature_snapshot_hash: String,
    pub stale_inputs: Vec<String>,
    pub result: Option<SettlementResult>,
}

impl Recommendation {
    pub fn is_settled(&self) -> bool {
        self.result.is_some()
    }
}

// ---------------------------------------------------------------------------
// Bankroll state
// ---------------------------------------------------------------------------

/// Global singleton tracking bankroll, rolling performance, and the
/// aggression multiplier fed into staking's bankroll-regime term.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankrollState {
    pub balance: Decimal,
    pub peak_balance: Decimal,
    /// Settled results, most recent last — rolling win rate uses the last N.
    pub recent_results: Vec<bool>,
    pub rolling_window: usize,
}

impl BankrollState {
    pub fn new(initial_balance: Decimal, rolling_window: usize) -> Self {
        Self {
            balance: initial_balance,
            peak_balance: initial_balance,
            recent_results: Vec::new(),
            rolling_window,
        }
    }

    pub fn rolling_win_rate(&self) -> f64 {
        if self.recent_results.is_empty() {
            return 0.5;
        }
        let wins = self.recent_results.iter().filter(|w| **w).count();
        wins as f64 / self.recent_results.len() as f64
    }

    pub fn drawdown(&self) -> f64 {
        if self.peak_balance <= Decimal::ZERO {
            return 0.0;
        }
        let dd = Decimal::ONE - (self.balance / self.peak_balance);
        dd.to_string().parse::<f64>().unwrap_or(0.0).max(0.0)
    }

    /// Record a settlement's effect on the bankroll.
    pub fn record_settlement(&mut self, won: bool, profit: Decimal) {
        self.balance += profit;
        if self.balance > self.peak_balance {
            self.peak_balance = self.balance;
        }
        self.recent_results.push(won);
        if self.recent_results.len() > self.rolling_window {
            self.recent_results.remove(0);
        }
    }
}

// ---------------------------------------------------------------------------
// API usage ledger
// ---------------------------------------------------------------------------

/// Per-source rolling rate-limit / health counters (backs the token bucket
/// and circuit breaker in `orchestrator`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiUsage {
    pub collector_key: String,
    pub tokens_available: f64,
    pub capacity: f64,
    pub refill_per_sec: f64,
    pub last_refill: DateTime<Utc>,
    pub consecutive_failures: u32,
}

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("transient source error ({source}): {message}")]
    TransientSource { source: String, message: String },

    #[error("permanent source error ({source}): {message}")]
    PermanentSource { source: String, message: String },

    #[error("rate limit exceeded for collector: {0}")]
    RateLimitExceeded(String),

    #[error("circuit open for collector: {0}")]
    CircuitOpen(String),

    #[error("look-ahead violation: field {field} has source timestamp {source_ts} >= as-of {as_of}")]
    LookAheadViolation {
        field: String,
        source_ts: DateTime<Utc>,
        as_of: DateTime<Utc>,
    },

    #[error("catalog write conflict: {0}")]
    CatalogWriteConflict(String),

    #[error("insufficient data: sample size {sample_size} below minimum {required}")]
    InsufficientData { sample_size: u32, required: u32 },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("strategy error: {0}")]
    Strategy(String),

    #[error("classifier error: {0}")]
    Classifier(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
