//! Repository traits over the durable store, with Postgres and in-memory
//! implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::ledger::TableId;

/// Attempts made against optimistic version conflicts before giving up.
pub const SAVE_RETRY_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("table {0} not found")]
    TableNotFound(TableId),

    #[error("version conflict saving table {0}")]
    VersionConflict(TableId),
}

pub type DbResult<T> = Result<T, DbError>;

/// One completed hand, snapshotted for operator reconciliation.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GameRecord {
    pub game_id: Uuid,
    pub table_id: TableId,
    pub stake: i64,
    pub seats: Vec<String>,
    pub winners: Vec<usize>,
    pub win_type: String,
    pub round_scores: Vec<u32>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub final_state: serde_json::Value,
}

/// A table row in the durable store. The version column backs the
/// optimistic-concurrency retry around saves.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TableRow {
    pub table_id: TableId,
    pub stake: i64,
    pub status: String,
    pub dynamic: bool,
    pub version: i64,
}

#[async_trait]
pub trait GameRepository: Send + Sync {
    async fn record_game(&self, record: &GameRecord) -> DbResult<()>;
}

#[async_trait]
pub trait TableRepository: Send + Sync {
    async fn upsert_table(&self, row: &TableRow) -> DbResult<()>;

    async fn fetch_version(&self, table_id: TableId) -> DbResult<i64>;

    /// Compare-and-swap status update; fails with `VersionConflict` when
    /// another writer bumped the version in between.
    async fn save_status(
        &self,
        table_id: TableId,
        status: &str,
        expected_version: i64,
    ) -> DbResult<i64>;

    /// Persist the authoritative hand state after each applied action.
    async fn save_hand(&self, table_id: TableId, hand: &serde_json::Value) -> DbResult<()>;

    async fn delete_table(&self, table_id: TableId) -> DbResult<()>;
}

/// Save a table's status, retrying version conflicts from background sweeps.
pub async fn save_status_with_retry(
    repo: &dyn TableRepository,
    table_id: TableId,
    status: &str,
) -> DbResult<i64> {
    let mut last_err = DbError::VersionConflict(table_id);
    for attempt in 0..SAVE_RETRY_ATTEMPTS {
        let version = repo.fetch_version(table_id).await?;
        match repo.save_status(table_id, status, version).await {
            Ok(new_version) => return Ok(new_version),
            Err(DbError::VersionConflict(_)) => {
                log::debug!(
                    "version conflict saving table {table_id} (attempt {})",
                    attempt + 1
                );
                last_err = DbError::VersionConflict(table_id);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err)
}

// ---------------------------------------------------------------------------
// Postgres implementations
// ---------------------------------------------------------------------------

pub struct PgGameRepository {
    pool: Arc<PgPool>,
}

impl PgGameRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GameRepository for PgGameRepository {
    async fn record_game(&self, record: &GameRecord) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO games
                (game_id, table_id, stake, seats, winners, win_type,
                 round_scores, started_at, ended_at, final_state)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (game_id) DO NOTHING
            "#,
        )
        .bind(record.game_id)
        .bind(record.table_id)
        .bind(record.stake)
        .bind(serde_json::to_value(&record.seats).unwrap_or_default())
        .bind(serde_json::to_value(&record.winners).unwrap_or_default())
        .bind(&record.win_type)
        .bind(serde_json::to_value(&record.round_scores).unwrap_or_default())
        .bind(record.started_at.naive_utc())
        .bind(record.ended_at.naive_utc())
        .bind(&record.final_state)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }
}

pub struct PgTableRepository {
    pool: Arc<PgPool>,
}

impl PgTableRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TableRepository for PgTableRepository {
    async fn upsert_table(&self, row: &TableRow) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tables (id, stake, status, dynamic, version)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                version = tables.version + 1
            "#,
        )
        .bind(row.table_id)
        .bind(row.stake)
        .bind(&row.status)
        .bind(row.dynamic)
        .bind(row.version)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }

    async fn fetch_version(&self, table_id: TableId) -> DbResult<i64> {
        let row = sqlx::query("SELECT version FROM tables WHERE id = $1")
            .bind(table_id)
            .fetch_optional(self.pool.as_ref())
            .await?
            .ok_or(DbError::TableNotFound(table_id))?;
        Ok(row.get("version"))
    }

    async fn save_status(
        &self,
        table_id: TableId,
        status: &str,
        expected_version: i64,
    ) -> DbResult<i64> {
        let updated = sqlx::query(
            "UPDATE tables
             SET status = $1, version = version + 1
             WHERE id = $2 AND version = $3
             RETURNING version",
        )
        .bind(status)
        .bind(table_id)
        .bind(expected_version)
        .fetch_optional(self.pool.as_ref())
        .await?;

        match updated {
            Some(row) => Ok(row.get("version")),
            None => Err(DbError::VersionConflict(table_id)),
        }
    }

    async fn save_hand(&self, table_id: TableId, hand: &serde_json::Value) -> DbResult<()> {
        sqlx::query("UPDATE tables SET hand_state = $1 WHERE id = $2")
            .bind(hand)
            .bind(table_id)
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }

    async fn delete_table(&self, table_id: TableId) -> DbResult<()> {
        sqlx::query("DELETE FROM tables WHERE id = $1")
            .bind(table_id)
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory implementations (tests and local tooling)
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryGameRepository {
    games: Mutex<Vec<GameRecord>>,
}

impl MemoryGameRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn games(&self) -> Vec<GameRecord> {
        self.games.lock().await.clone()
    }
}

#[async_trait]
impl GameRepository for MemoryGameRepository {
    async fn record_game(&self, record: &GameRecord) -> DbResult<()> {
        let mut games = self.games.lock().await;
        if !games.iter().any(|g| g.game_id == record.game_id) {
            games.push(record.clone());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryTableRepository {
    rows: Mutex<HashMap<TableId, TableRow>>,
    hands: Mutex<HashMap<TableId, serde_json::Value>>,
}

impl MemoryTableRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn row(&self, table_id: TableId) -> Option<TableRow> {
        self.rows.lock().await.get(&table_id).cloned()
    }

    pub async fn hand(&self, table_id: TableId) -> Option<serde_json::Value> {
        self.hands.lock().await.get(&table_id).cloned()
    }
}

#[async_trait]
impl TableRepository for MemoryTableRepository {
    async fn upsert_table(&self, row: &TableRow) -> DbResult<()> {
        let mut rows = self.rows.lock().await;
        match rows.get_mut(&row.table_id) {
            Some(existing) => {
                existing.status = row.status.clone();
                existing.version += 1;
            }
            None => {
                rows.insert(row.table_id, row.clone());
            }
        }
        Ok(())
    }

    async fn fetch_version(&self, table_id: TableId) -> DbResult<i64> {
        let rows = self.rows.lock().await;
        rows.get(&table_id)
            .map(|r| r.version)
            .ok_or(DbError::TableNotFound(table_id))
    }

    async fn save_status(
        &self,
        table_id: TableId,
        status: &str,
        expected_version: i64,
    ) -> DbResult<i64> {
        let mut rows = self.rows.lock().await;
        let row = rows
            .get_mut(&table_id)
            .ok_or(DbError::TableNotFound(table_id))?;
        if row.version != expected_version {
            return Err(DbError::VersionConflict(table_id));
        }
        row.status = status.to_string();
        row.version += 1;
        Ok(row.version)
    }

    async fn save_hand(&self, table_id: TableId, hand: &serde_json::Value) -> DbResult<()> {
        self.hands.lock().await.insert(table_id, hand.clone());
        Ok(())
    }

    async fn delete_table(&self, table_id: TableId) -> DbResult<()> {
        self.rows.lock().await.remove(&table_id);
        self.hands.lock().await.remove(&table_id);
        Ok(())
    }
}
