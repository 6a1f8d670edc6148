//! SQLite-backed transfer record store.
//!
//! One table holds both transfer kinds; the kind column keeps the two id
//! spaces apart. Status masks are evaluated in SQL so "any of several
//! statuses" stays a single query.

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use super::{StoreError, TransferStore};
use crate::staging::context::SecurityContext;
use crate::staging::record::{TransferKind, TransferRecord, clip_message};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS transfers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    transfer_id TEXT,
    object_id TEXT NOT NULL,
    owner_id TEXT NOT NULL,
    group_id TEXT NOT NULL,
    status INTEGER NOT NULL,
    last_update INTEGER NOT NULL,
    expires_at INTEGER NOT NULL,
    staging_url TEXT,
    client_access_url TEXT,
    storage_url TEXT,
    access_point_id TEXT,
    error_message TEXT
)";

const COLUMNS: &str = "id, kind, transfer_id, object_id, owner_id, group_id, status, \
                       last_update, expires_at, staging_url, client_access_url, storage_url, \
                       access_point_id, error_message";

/// Row tuple matching [`COLUMNS`].
type TransferRow = (
    i64,
    String,
    Option<String>,
    String,
    String,
    String,
    i32,
    i64,
    i64,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

fn record_from_row(row: TransferRow) -> Result<TransferRecord, StoreError> {
    let kind = TransferKind::from_str(&row.1)
        .ok_or_else(|| StoreError::Backend(format!("unknown transfer kind '{}'", row.1)))?;
    Ok(TransferRecord {
        id: row.0,
        kind,
        transfer_id: row.2,
        object_id: row.3,
        owner_id: row.4,
        group_id: row.5,
        status: row.6,
        last_update: row.7,
        expires_at: row.8,
        staging_url: row.9,
        client_access_url: row.10,
        storage_url: row.11,
        access_point_id: row.12,
        error_message: row.13,
    })
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect and create the schema if necessary. Use
    /// `sqlite://path?mode=rwc` for a file-backed store or
    /// `sqlite::memory:` for a throwaway one.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        // a pooled :memory: database would give every connection its own
        // empty database, so those stay on a single connection
        let max_connections = if url.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl TransferStore for SqliteStore {
    async fn create(
        &self,
        mut record: TransferRecord,
        now_ms: i64,
        _ctx: &SecurityContext,
    ) -> Result<TransferRecord, StoreError> {
        record.touch(now_ms);
        let result = sqlx::query(
            "INSERT INTO transfers (kind, transfer_id, object_id, owner_id, group_id, status, \
             last_update, expires_at, staging_url, client_access_url, storage_url, \
             access_point_id, error_message) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.kind.as_str())
        .bind(record.transfer_id.as_deref())
        .bind(&record.object_id)
        .bind(&record.owner_id)
        .bind(&record.group_id)
        .bind(record.status)
        .bind(record.last_update)
        .bind(record.expires_at)
        .bind(record.staging_url.as_deref())
        .bind(record.client_access_url.as_deref())
        .bind(record.storage_url.as_deref())
        .bind(record.access_point_id.as_deref())
        .bind(record.error_message.as_deref())
        .execute(&self.pool)
        .await?;
        record.id = result.last_insert_rowid();
        Ok(record)
    }

    async fn find(
        &self,
        kind: TransferKind,
        id: i64,
        _ctx: &SecurityContext,
    ) -> Result<Option<TransferRecord>, StoreError> {
        let row: Option<TransferRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM transfers WHERE kind = ? AND id = ?"
        ))
        .bind(kind.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(record_from_row).transpose()
    }

    async fn update_status(
        &self,
        kind: TransferKind,
        id: i64,
        status: i32,
        message: Option<&str>,
        now_ms: i64,
        _ctx: &SecurityContext,
    ) -> Result<(), StoreError> {
        let message = message.map(clip_message);
        let result = sqlx::query(
            "UPDATE transfers SET status = ?, error_message = ?, last_update = ? \
             WHERE kind = ? AND id = ?",
        )
        .bind(status)
        .bind(message.as_deref())
        .bind(now_ms)
        .bind(kind.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn update_staging_url(
        &self,
        kind: TransferKind,
        id: i64,
        url: &str,
        now_ms: i64,
        _ctx: &SecurityContext,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE transfers SET staging_url = ?, last_update = ? WHERE kind = ? AND id = ?",
        )
        .bind(url)
        .bind(now_ms)
        .bind(kind.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn update_client_access_url(
        &self,
        kind: TransferKind,
        id: i64,
        url: &str,
        now_ms: i64,
        _ctx: &SecurityContext,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE transfers SET client_access_url = ?, last_update = ? WHERE kind = ? AND id = ?",
        )
        .bind(url)
        .bind(now_ms)
        .bind(kind.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn list_by_status(
        &self,
        kind: TransferKind,
        status_mask: i32,
        owner: Option<&str>,
        _ctx: &SecurityContext,
    ) -> Result<Vec<TransferRecord>, StoreError> {
        // mask 0 matches only the unknown status, any other mask is a bit test
        let base = format!(
            "SELECT {COLUMNS} FROM transfers WHERE kind = ? \
             AND ((? != 0 AND (status & ?) != 0) OR (? = 0 AND status = 0))"
        );
        let rows: Vec<TransferRow> = if let Some(owner) = owner {
            sqlx::query_as(&format!("{base} AND owner_id = ? ORDER BY id"))
                .bind(kind.as_str())
                .bind(status_mask)
                .bind(status_mask)
                .bind(status_mask)
                .bind(owner)
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query_as(&format!("{base} ORDER BY id"))
                .bind(kind.as_str())
                .bind(status_mask)
                .bind(status_mask)
                .bind(status_mask)
                .fetch_all(&self.pool)
                .await?
        };
        rows.into_iter().map(record_from_row).collect()
    }

    async fn delete(
        &self,
        kind: TransferKind,
        id: i64,
        _ctx: &SecurityContext,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM transfers WHERE kind = ? AND id = ?")
            .bind(kind.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }
}
