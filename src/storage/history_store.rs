//! Permanent history tier (§4.3.2, §5): every successfully fetched collector
//! response is appended here, keyed by collector and request, for the
//! Backtester to replay exactly what was seen at the time.
//!
//! Grounded on `catalog::store::CatalogStore` for the sqlx/SQLite shape
//! (pool + schema init + JSON body column).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub collector_key: String,
    pub request_key: String,
    pub value: serde_json::Value,
    pub observed_at: DateTime<Utc>,
}

pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await
            .context("connecting to history store")?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS collector_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                collector_key TEXT NOT NULL,
                request_key TEXT NOT NULL,
                observed_at TEXT NOT NULL,
                body TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("creating collector_history table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_collector_history_lookup ON collector_history (collector_key, request_key, observed_at)",
        )
        .execute(&self.pool)
        .await
        .context("creating collector_history index")?;

        Ok(())
    }

    /// Append an observed response. Never overwrites — the history tier is
    /// append-only so a later walk-forward run can see exactly what existed
    /// `as_of` any past instant.
    pub async fn append(&self, collector_key: &str, request_key: &str, value: &serde_json::Value) -> Result<()> {
        let observed_at = Utc::now();
        let body = serde_json::to_string(value).context("serializing history value")?;
        sqlx::query(
            "INSERT INTO collector_history (collector_key, request_key, observed_at, body) VALUES (?, ?, ?, ?)",
        )
        .bind(collector_key)
        .bind(request_key)
        .bind(observed_at.to_rfc3339())
        .bind(body)
        .execute(&self.pool)
        .await
        .context("inserting history record")?;
        Ok(())
    }

    /// The most recent record observed at or before `as_of`, for no-look-ahead
    /// replay during backtesting.
    pub async fn as_of(&self, collector_key: &str, request_key: &str, as_of: DateTime<Utc>) -> Result<Option<HistoryRecord>> {
        let row = sqlx::query(
            "SELECT collector_key, request_key, observed_at, body FROM collector_history \
             WHERE collector_key = ? AND request_key = ? AND observed_at <= ? \
             ORDER BY observed_at DESC LIMIT 1",
        )
        .bind(collector_key)
        .bind(request_key)
        .bind(as_of.to_rfc3339())
        .fetch_optional(&self.pool)
        .await
        .context("querying history as-of")?;

        row.map(|r| Self::decode(&r)).transpose()
    }

    fn decode(row: &SqliteRow) -> Result<HistoryRecord> {
        let observed_at: String = row.try_get("observed_at").context("reading observed_at")?;
        let body: String = row.try_get("body").context("reading body")?;
        Ok(HistoryRecord {
            collector_key: row.try_get("collector_key").context("reading collector_key")?,
            request_key: row.try_get("request_key").context("reading request_key")?,
            observed_at: DateTime::parse_from_rfc3339(&observed_at)
                .context("parsing observed_at")?
                .with_timezone(&Utc),
            value: serde_json::from_str(&body).context("parsing history body")?,
        })
    }
}
