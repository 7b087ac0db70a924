//! SQLite-backed persistence for the Edge Catalog.
//!
//! The teacher persists agent state as flat JSON files (`storage::mod`).
//! The catalog needs more than that can offer — ACID single-writer
//! semantics and queryable history — so this activates the `sqlx`/`sqlite`
//! dependency the teacher's `Cargo.toml` already declared but never used.
//! Each edge is stored as a row keyed by `edge_id`, carrying its full
//! serialized form plus a few indexed columns for cheap status queries.
//! Writes serialize through `write_lock`; reads use the pool directly and
//! never block behind it, matching §5's "single writer; readers lock-free
//! on a consistent snapshot."

use anyhow::{Context, Result};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;

use crate::types::{Edge, EdgeStatus};

pub struct CatalogStore {
    pool: SqlitePool,
    write_lock: Mutex<()>,
}

impl CatalogStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await
            .with_context(|| format!("connecting to catalog store at {database_url}"))?;
        let store = Self { pool, write_lock: Mutex::new(()) };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS edges (
                edge_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                body TEXT NOT NULL,
                PRIMARY KEY (edge_id, version)
            )",
        )
        .execute(&self.pool)
        .await
        .context("creating edges table")?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_edges_status ON edges(status)")
            .execute(&self.pool)
            .await
            .context("creating status index")?;
        Ok(())
    }

    /// Insert or replace the latest version row for an edge. Writes
    /// serialize through `write_lock` — single-writer discipline.
    pub async fn upsert(&self, edge: &Edge) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let body = serde_json::to_string(edge).context("serializing edge")?;
        sqlx::query(
            "INSERT INTO edges (edge_id, version, status, created_at, body)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(edge_id, version) DO UPDATE SET status = excluded.status, body = excluded.body",
        )
        .bind(&edge.edge_id)
        .bind(edge.version as i64)
        .bind(edge.status.to_string())
        .bind(edge.created_at.to_rfc3339())
        .bind(body)
        .execute(&self.pool)
        .await
        .context("upserting edge")?;
        Ok(())
    }

    /// Latest version row for each distinct `edge_id`, across all statuses.
    pub async fn list_all_latest(&self) -> Result<Vec<Edge>> {
        let rows = sqlx::query(
            "SELECT body FROM edges e
             WHERE version = (SELECT MAX(version) FROM edges WHERE edge_id = e.edge_id)",
        )
        .fetch_all(&self.pool)
        .await
        .context("listing edges")?;
        rows.iter().map(|r| self.decode(r)).collect()
    }

    pub async fn list_by_status(&self, status: EdgeStatus) -> Result<Vec<Edge>> {
        let rows = sqlx::query(
            "SELECT body FROM edges e
             WHERE status = ?1
             AND version = (SELECT MAX(version) FROM edges WHERE edge_id = e.edge_id)",
        )
        .bind(status.to_string())
        .fetch_all(&self.pool)
        .await
        .context("listing edges by status")?;
        rows.iter().map(|r| self.decode(r)).collect()
    }

    pub async fn get_latest(&self, edge_id: &str) -> Result<Option<Edge>> {
        let row = sqlx::query(
            "SELECT body FROM edges WHERE edge_id = ?1 ORDER BY version DESC LIMIT 1",
        )
        .bind(edge_id)
        .fetch_optional(&self.pool)
        .await
        .context("fetching edge")?;
        row.map(|r| self.decode(&r)).transpose()
    }

    fn decode(&self, row: &sqlx::sqlite::SqliteRow) -> Result<Edge> {
        let body: String = row.try_get("body").context("reading edge body column")?;
        serde_json::from_str(&body).context("deserializing edge")
    }
}
