//! Command-line surface (§6: External Interfaces, CLI entry points): one
//! subcommand per subsystem, wired by `main` to the same shared
//! Orchestrator/Catalog/Engine the live loop would use.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "pregame", about = "Edge-discovery and pregame decision core for NFL wagering research")]
pub struct Cli {
    #[arg(long, default_value = "config.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one Edge Discoverer pass (C2) against stored history and
    /// register any statistically-sound candidate with the catalog.
    Discover,
    /// Run the Decision Engine (C4) for every scheduled game within the
    /// configured lead time and print any emitted Recommendations.
    Recommend {
        #[arg(long)]
        season: i32,
        #[arg(long)]
        week: u8,
    },
    /// Run the walk-forward backtester (C5) over a season range and print
    /// the aggregate performance report.
    Backtest {
        #[arg(long)]
        start_season: i32,
        #[arg(long)]
        end_season: i32,
    },
    /// Print a classifier calibration report (Brier score, calibration
    /// curve, over/under-confidence diagnosis) from the recommendation
    /// ledger's settled history.
    Score,
}
