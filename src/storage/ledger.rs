//! Recommendation ledger (§4.4.5, §4.5): every emitted `Recommendation` is
//! recorded here, then updated in place once its game settles. This is the
//! audit trail CLV and ROI reporting reads from.
//!
//! Grounded on `catalog::store::CatalogStore` for the sqlx/SQLite shape.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use crate::types::{Recommendation, SettlementResult};

pub struct RecommendationLedger {
    pool: SqlitePool,
}

impl RecommendationLedger {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await
            .context("connecting to recommendation ledger")?;
        let ledger = Self { pool };
        ledger.init_schema().await?;
        Ok(ledger)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS recommendations (
                game_id TEXT NOT NULL,
                generated_at TEXT NOT NULL,
                body TEXT NOT NULL,
                PRIMARY KEY (game_id, generated_at)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("creating recommendations table")?;
        Ok(())
    }

    pub async fn record(&self, recommendation: &Recommendation) -> Result<()> {
        let body = serde_json::to_string(recommendation).context("serializing recommendation")?;
        sqlx::query(
            "INSERT INTO recommendations (game_id, generated_at, body) VALUES (?, ?, ?) \
             ON CONFLICT(game_id, generated_at) DO UPDATE SET body = excluded.body",
        )
        .bind(recommendation.game_id.to_string())
        .bind(recommendation.generated_at.to_rfc3339())
        .bind(body)
        .execute(&self.pool)
        .await
        .context("inserting recommendation")?;
        Ok(())
    }

    /// Attach a settlement outcome to every recorded recommendation for
    /// `game_id` and persist the update.
    pub async fn settle(&self, game_id: &str, result: SettlementResult) -> Result<Vec<Recommendation>> {
        let mut updated = Vec::new();
        for mut rec in self.list_for_game(game_id).await? {
            rec.result = Some(result.clone());
            self.record(&rec).await?;
            updated.push(rec);
        }
        Ok(updated)
    }

    pub async fn list_for_game(&self, game_id: &str) -> Result<Vec<Recommendation>> {
        let rows = sqlx::query("SELECT body FROM recommendations WHERE game_id = ?")
            .bind(game_id)
            .fetch_all(&self.pool)
            .await
            .context("listing recommendations for game")?;
        rows.iter().map(Self::decode).collect()
    }

    pub async fn list_unsettled(&self) -> Result<Vec<Recommendation>> {
        let rows = sqlx::query("SELECT body FROM recommendations")
            .fetch_all(&self.pool)
            .await
            .context("listing recommendations")?;
        let all: Result<Vec<Recommendation>> = rows.iter().map(Self::decode).collect();
        Ok(all?.into_iter().filter(|r| !r.is_settled()).collect())
    }

    pub async fn list_all(&self) -> Result<Vec<Recommendation>> {
        let rows = sqlx::query("SELECT body FROM recommendations")
            .fetch_all(&self.pool)
            .await
            .context("listing all recommendations")?;
        rows.iter().map(Self::decode).collect()
    }

    fn decode(row: &SqliteRow) -> Result<Recommendation> {
        let body: String = row.try_get("body").context("reading recommendation body")?;
        serde_json::from_str(&body).context("parsing recommendation body")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GameId, Tier, WagerSide};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn sample_recommendation() -> Recommendation {
        Recommendation {
            game_id: GameId { season: 2024, week: 5, away: "BUF".into(), home: "KC".into() },
            kickoff_utc: Utc::now(),
            side: WagerSide::Home,
            stake_fraction: dec!(0.02),
            stake_amount: dec!(20.00),
            model_prob: 0.58,
            implied_prob: 0.52,
            raw_edge: 0.06,
            matched_edges: vec![],
            confidence: 0.7,
            tier: Tier::B,
            best_book: "book-a".into(),
            best_odds: -110,
            generated_at: Utc::now(),
            feature_snapshot_hash: "hash".into(),
            stale_inputs: vec![],
            result: None,
        }
    }

    async fn test_ledger() -> RecommendationLedger {
        RecommendationLedger::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_record_then_list_for_game() {
        let ledger = test_ledger().await;
        let rec = sample_recommendation();
        let game_id_str = rec.game_id.to_string();
        ledger.record(&rec).await.unwrap();
        let found = ledger.list_for_game(&game_id_str).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].side, WagerSide::Home);
    }

    #[tokio::test]
    async fn test_settle_attaches_result() {
        let ledger = test_ledger().await;
        let rec = sample_recommendation();
        let game_id_str = rec.game_id.to_string();
        ledger.record(&rec).await.unwrap();

        let result = SettlementResult { won: true, profit: dec!(18.18), clv: 0.01 };
        ledger.settle(&game_id_str, result).await.unwrap();

        let found = ledger.list_for_game(&game_id_str).await.unwrap();
        assert!(found[0].is_settled());
        assert!(found[0].result.as_ref().unwrap().won);
    }

    #[tokio::test]
    async fn test_list_unsettled_excludes_settled() {
        let ledger = test_ledger().await;
        let rec = sample_recommendation();
        let game_id_str = rec.game_id.to_string();
        ledger.record(&rec).await.unwrap();
        assert_eq!(ledger.list_unsettled().await.unwrap().len(), 1);

        ledger.settle(&game_id_str, SettlementResult { won: false, profit: dec!(-20.00), clv: -0.02 }).await.unwrap();
        assert_eq!(ledger.list_unsettled().await.unwrap().len(), 0);
    }
}
