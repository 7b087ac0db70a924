//! Persistence layer: bankroll snapshot on disk, plus the SQLite-backed
//! collector history and recommendation ledger stores.

pub mod history_store;
pub mod ledger;

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

use crate::types::BankrollState;

const DEFAULT_STATE_FILE: &str = "pregame_bankroll.json";

/// Save bankroll state to a JSON file.
pub fn save_bankroll(state: &BankrollState, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);
    let json = serde_json::to_string_pretty(state).context("serializing bankroll state")?;
    std::fs::write(path, &json).context(format!("writing bankroll state to {path}"))?;
    debug!(path, balance = %state.balance, "bankroll state saved");
    Ok(())
}

/// Load bankroll state from a JSON file. Returns `None` if the file doesn't
/// exist (fresh start).
pub fn load_bankroll(path: Option<&str>) -> Result<Option<BankrollState>> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);

    if !Path::new(path).exists() {
        info!(path, "no saved bankroll state found, starting fresh");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path).context(format!("reading bankroll state from {path}"))?;
    let state: BankrollState = serde_json::from_str(&json).context(format!("parsing bankroll state from {path}"))?;
    info!(path, balance = %state.balance, "bankroll state loaded from disk");
    Ok(Some(state))
}

/// Delete the bankroll state file, if present.
pub fn delete_bankroll(path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);
    if Path::new(path).exists() {
        std::fs::remove_file(path).context(format!("deleting bankroll state file {path}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn temp_path() -> String {
        let mut p = std::env::temp_dir();
        p.push(format!("pregame_test_bankroll_{}.json", uuid::Uuid::new_v4()));
        p.to_string_lossy().to_string()
    }

    #[test]
    fn test_save_and_load_bankroll() {
        let path = temp_path();
        let state = BankrollState::new(dec!(1000.00), 50);
        save_bankroll(&state, Some(&path)).unwrap();

        let loaded = load_bankroll(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded.balance, dec!(1000.00));
        assert_eq!(loaded.rolling_window, 50);

        delete_bankroll(Some(&path)).unwrap();
    }

    #[test]
    fn test_load_nonexistent_returns_none() {
        let loaded = load_bankroll(Some("/tmp/pregame_nonexistent_bankroll_12345.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_save_preserves_recent_results() {
        let path = temp_path();
        let mut state = BankrollState::new(dec!(500.00), 10);
        state.record_settlement(true, dec!(25.00));
        state.record_settlement(false, dec!(-20.00));
        save_bankroll(&state, Some(&path)).unwrap();

        let loaded = load_bankroll(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded.recent_results, vec![true, false]);
        assert_eq!(loaded.balance, state.balance);

        delete_bankroll(Some(&path)).unwrap();
    }

    #[test]
    fn test_delete_nonexistent_is_ok() {
        let result = delete_bankroll(Some("/tmp/pregame_does_not_exist_xyz.json"));
        assert!(result.is_ok());
    }
}
