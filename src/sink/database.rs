//! SQLite store adapter
//!
//! This module provides the concrete [`LogStore`] with:
//! - Connection pooling
//! - Idempotent schema bootstrap per table
//! - Insert-returning-id via `last_insert_rowid`
//! - WAL mode for concurrent reads/writes

use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::sink::store::{
    validate_table_name, Column, LogStore, NewRecord, RangeFilter, Row, SortKey,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{QueryBuilder, Row as _, Sqlite};
use std::ops::Bound;
use std::str::FromStr;
use std::time::Duration;

/// Current time in Unix milliseconds, evaluated by SQLite
const NOW_MILLIS_SQL: &str = "CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER)";

/// SQLite-backed log store
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open a connection pool for the configured database
    ///
    /// # Example
    ///
    /// ```ignore
    /// let store = SqliteStore::connect(&DatabaseConfig::default()).await?;
    /// store.ensure_schema("app_logs").await?;
    /// ```
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(config.busy_timeout_seconds))
            .pragma("synchronous", "NORMAL");

        // Every connection to an in-memory URL must be the same connection,
        // and it must never be reaped or the database goes with it.
        let in_memory = config.url.contains(":memory:") || config.url.contains("mode=memory");

        if !in_memory {
            if let Some(dir) = options
                .get_filename()
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
            {
                tokio::fs::create_dir_all(dir).await.map_err(sqlx::Error::Io)?;
            }
        }

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(config.max_connections)
        };

        let pool = pool_options
            .acquire_timeout(Duration::from_secs(config.busy_timeout_seconds))
            .connect_with(options)
            .await?;

        tracing::debug!(url = %config.url, in_memory, "Connected to log database");

        Ok(Self { pool })
    }

    /// In-memory store, mostly for tests and throwaway sinks
    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::connect(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            ..Default::default()
        })
        .await
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool (for advanced usage)
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl LogStore for SqliteStore {
    async fn ensure_schema(&self, table: &str) -> Result<(), StoreError> {
        validate_table_name(table)?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS \"{table}\" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                level TEXT NOT NULL,
                message TEXT NOT NULL,
                timestamp INTEGER NOT NULL DEFAULT ({NOW_MILLIS_SQL}),
                meta TEXT NOT NULL DEFAULT '{{}}'
            )"
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS \"idx_{table}_timestamp\" ON \"{table}\" (timestamp)"
        ))
        .execute(&self.pool)
        .await?;

        tracing::info!(table = %table, "Log table ready");
        Ok(())
    }

    async fn insert(&self, table: &str, record: &NewRecord) -> Result<Option<i64>, StoreError> {
        validate_table_name(table)?;
        let meta = serde_json::to_string(&record.meta)?;

        let result = match record.timestamp {
            Some(timestamp) => {
                sqlx::query(&format!(
                    "INSERT INTO \"{table}\" (level, message, timestamp, meta) VALUES (?, ?, ?, ?)"
                ))
                .bind(&record.level)
                .bind(&record.message)
                .bind(timestamp.timestamp_millis())
                .bind(&meta)
                .execute(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "INSERT INTO \"{table}\" (level, message, meta) VALUES (?, ?, ?)"
                ))
                .bind(&record.level)
                .bind(&record.message)
                .bind(&meta)
                .execute(&self.pool)
                .await?
            }
        };

        Ok(Some(result.last_insert_rowid()))
    }

    async fn select_max_id(&self, table: &str) -> Result<Option<i64>, StoreError> {
        validate_table_name(table)?;

        let max_id: Option<i64> = sqlx::query_scalar(&format!("SELECT MAX(id) FROM \"{table}\""))
            .fetch_one(&self.pool)
            .await?;

        Ok(max_id)
    }

    async fn select_range(&self, table: &str, filter: &RangeFilter) -> Result<Vec<Row>, StoreError> {
        validate_table_name(table)?;
        let columns = filter.columns();

        let column_list = columns
            .iter()
            .map(|c| c.name())
            .collect::<Vec<_>>()
            .join(", ");

        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {column_list} FROM \"{table}\" WHERE 1=1"));

        if let Some(min_id) = filter.min_id {
            query.push(" AND id >= ").push_bind(min_id);
        }

        match filter.since {
            Bound::Included(since) => {
                query.push(" AND timestamp >= ").push_bind(since.timestamp_millis());
            }
            Bound::Excluded(since) => {
                query.push(" AND timestamp > ").push_bind(since.timestamp_millis());
            }
            Bound::Unbounded => {}
        }

        match filter.until {
            Bound::Included(until) => {
                query.push(" AND timestamp <= ").push_bind(until.timestamp_millis());
            }
            Bound::Excluded(until) => {
                query.push(" AND timestamp < ").push_bind(until.timestamp_millis());
            }
            Bound::Unbounded => {}
        }

        if let Some(level) = &filter.level {
            query.push(" AND level = ").push_bind(level.clone());
        }

        if let Some(order) = filter.order {
            let key = match order.key {
                SortKey::Id => "id",
                SortKey::Timestamp => "timestamp",
            };
            query.push(format!(" ORDER BY {} {}", key, order.direction.as_sql()));
            // Stable order among rows sharing a timestamp
            if key != "id" {
                query.push(format!(", id {}", order.direction.as_sql()));
            }
        }

        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(limit as i64);
        }

        let rows = query.build().fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| decode_row(row, &columns))
            .collect()
    }

    async fn delete_older_than(&self, table: &str, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        validate_table_name(table)?;

        let result = sqlx::query(&format!("DELETE FROM \"{table}\" WHERE timestamp < ?"))
            .bind(cutoff.timestamp_millis())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

/// Map a selected row onto a JSON object holding only the projected columns
fn decode_row(row: &SqliteRow, columns: &[Column]) -> Result<Row, StoreError> {
    let mut out = Row::new();

    for column in columns {
        let name = column.name();
        let value = match column {
            Column::Id => Value::from(row.try_get::<i64, _>(name)?),
            Column::Level | Column::Message => row
                .try_get::<Option<String>, _>(name)?
                .map(Value::String)
                .unwrap_or(Value::Null),
            Column::Timestamp => {
                let millis: i64 = row.try_get(name)?;
                let timestamp = DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
                    StoreError::Decode(format!("timestamp {} out of range", millis))
                })?;
                Value::String(timestamp.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            Column::Meta => match row.try_get::<Option<String>, _>(name)? {
                Some(raw) if !raw.is_empty() => serde_json::from_str(&raw)?,
                _ => Value::Object(Default::default()),
            },
        };
        out.insert(name.to_string(), value);
    }

    Ok(out)
}
