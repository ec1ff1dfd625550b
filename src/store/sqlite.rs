//! SQLite node store (self-hosted deployments).
//!
//! Same table shape as the Supabase deployment. Timestamps are stored as
//! unix microseconds so exact-match links behave like `timestamptz` equality.

use super::traits::*;
use crate::discord::traits::UserRef;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS node_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    node_id TEXT NOT NULL,
    discord_user_id TEXT,
    timestamp INTEGER NOT NULL,
    version TEXT,
    peer_count INTEGER
);
CREATE INDEX IF NOT EXISTS idx_node_records_node ON node_records (node_id, timestamp DESC);
CREATE INDEX IF NOT EXISTS idx_node_records_user ON node_records (discord_user_id, timestamp DESC);
"#;

type RecordRow = (String, Option<String>, i64, Option<String>, Option<i64>);

const RECORD_COLUMNS: &str = "node_id, discord_user_id, timestamp, version, peer_count";

/// sqlx-backed node store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database file at `path` and apply the schema.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(db_error)?;

        Self::with_pool(pool).await
    }

    /// Private in-memory database (one connection, so every query sees it).
    pub async fn open_in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::new().in_memory(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(db_error)?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> StoreResult<Self> {
        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .map_err(db_error)?;
        Ok(Self { pool })
    }

    /// Append a check-in, the way a node agent reports.
    pub async fn insert(&self, record: &NodeRecord) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO node_records (node_id, discord_user_id, timestamp, version, peer_count) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&record.node_id)
        .bind(&record.discord_user_id)
        .bind(record.timestamp.timestamp_micros())
        .bind(&record.version)
        .bind(record.peer_count)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn latest_where(&self, column: &str, value: &str) -> StoreResult<Option<NodeRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM node_records WHERE {column} = ? \
             ORDER BY timestamp DESC LIMIT 1"
        );

        let row: Option<RecordRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.map(into_record).transpose()
    }
}

fn db_error(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn into_record(row: RecordRow) -> StoreResult<NodeRecord> {
    let (node_id, discord_user_id, micros, version, peer_count) = row;
    let timestamp = DateTime::<Utc>::from_timestamp_micros(micros).ok_or_else(|| {
        StoreError::InvalidResponse(format!("timestamp out of range: {micros}"))
    })?;

    Ok(NodeRecord {
        node_id,
        discord_user_id,
        timestamp,
        version,
        peer_count,
    })
}

#[async_trait]
impl NodeStore for SqliteStore {
    async fn latest_for_node(&self, node_id: &str) -> StoreResult<Option<NodeRecord>> {
        self.latest_where("node_id", node_id).await
    }

    async fn latest_for_user(&self, user: &UserRef) -> StoreResult<Option<NodeRecord>> {
        self.latest_where("discord_user_id", &user.0).await
    }

    async fn linked_user_for_node(&self, node_id: &str) -> StoreResult<Option<UserRef>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT discord_user_id FROM node_records \
             WHERE node_id = ? AND discord_user_id IS NOT NULL LIMIT 1",
        )
        .bind(node_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(row.map(|(user,)| UserRef(user)))
    }

    async fn link_user(
        &self,
        node_id: &str,
        timestamp: DateTime<Utc>,
        user: &UserRef,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE node_records SET discord_user_id = ? WHERE node_id = ? AND timestamp = ?",
        )
        .bind(&user.0)
        .bind(node_id)
        .bind(timestamp.timestamp_micros())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_latest_for_node_orders_by_timestamp() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.insert(&NodeRecord::new("abc", at(100))).await.unwrap();
        store.insert(&NodeRecord::new("abc", at(300))).await.unwrap();
        store.insert(&NodeRecord::new("abc", at(200))).await.unwrap();

        let latest = store.latest_for_node("abc").await.unwrap().unwrap();
        assert_eq!(latest.timestamp, at(300));
        assert!(store.latest_for_node("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_link_round_trip() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let ts = Utc::now();
        let mut record = NodeRecord::new("abc-123", ts);
        record.version = Some("2.0.1".to_string());
        record.peer_count = Some(12);
        store.insert(&record).await.unwrap();

        let alice = UserRef("42".to_string());
        assert_eq!(store.linked_user_for_node("abc-123").await.unwrap(), None);

        let matched = store.link_user("abc-123", ts, &alice).await.unwrap();
        assert_eq!(matched, 1);

        assert_eq!(
            store.linked_user_for_node("abc-123").await.unwrap(),
            Some(alice.clone())
        );
        let linked = store.latest_for_user(&alice).await.unwrap().unwrap();
        assert_eq!(linked.node_id, "abc-123");
        assert_eq!(linked.version.as_deref(), Some("2.0.1"));
        assert_eq!(linked.peer_count, Some(12));
    }

    #[tokio::test]
    async fn test_link_with_stale_timestamp_matches_nothing() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let ts = at(1_000);
        store.insert(&NodeRecord::new("abc", ts)).await.unwrap();

        let matched = store
            .link_user("abc", ts - Duration::seconds(1), &UserRef("1".to_string()))
            .await
            .unwrap();
        assert_eq!(matched, 0);
    }

    #[tokio::test]
    async fn test_open_file_persists() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nodes.db");

        {
            let store = SqliteStore::open(&path).await.unwrap();
            store.insert(&NodeRecord::new("abc", at(5))).await.unwrap();
        }

        let reopened = SqliteStore::open(&path).await.unwrap();
        assert!(reopened.latest_for_node("abc").await.unwrap().is_some());
    }
}
