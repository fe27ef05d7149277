//! Shared helpers for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sql_log_sink::config::SinkConfig;
use sql_log_sink::error::StoreError;
use sql_log_sink::sink::{LogStore, NewRecord, RangeFilter, Row, Sink, SqliteStore, TailOptions};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// SQLite store whose reads, writes and deletes can be made to fail or stall
pub struct FlakyStore {
    inner: SqliteStore,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
    pub fail_deletes: AtomicBool,
    pub read_delay_ms: AtomicU64,
    pub reads: AtomicUsize,
}

impl FlakyStore {
    pub async fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: SqliteStore::in_memory().await.unwrap(),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            read_delay_ms: AtomicU64::new(0),
            reads: AtomicUsize::new(0),
        })
    }

    pub fn set(flag: &AtomicBool, value: bool) {
        flag.store(value, Ordering::SeqCst);
    }

    fn injected() -> StoreError {
        StoreError::Database(sqlx::Error::PoolTimedOut)
    }
}

#[async_trait]
impl LogStore for FlakyStore {
    async fn ensure_schema(&self, table: &str) -> Result<(), StoreError> {
        self.inner.ensure_schema(table).await
    }

    async fn insert(&self, table: &str, record: &NewRecord) -> Result<Option<i64>, StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.insert(table, record).await
    }

    async fn select_max_id(&self, table: &str) -> Result<Option<i64>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.select_max_id(table).await
    }

    async fn select_range(&self, table: &str, filter: &RangeFilter) -> Result<Vec<Row>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        let delay = self.read_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.select_range(table, filter).await
    }

    async fn delete_older_than(&self, table: &str, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.delete_older_than(table, cutoff).await
    }
}

/// Sink over a fresh in-memory database
pub async fn memory_sink(config: SinkConfig) -> Sink {
    let store = SqliteStore::in_memory().await.unwrap();
    Sink::new(Arc::new(store), &config).await.unwrap()
}

pub fn config_with_level(level: &str) -> SinkConfig {
    SinkConfig {
        level: level.to_string(),
        ..Default::default()
    }
}

/// Tail options with short intervals so tests stay fast
pub fn fast_tail() -> TailOptions {
    TailOptions {
        poll_interval: Duration::from_millis(20),
        error_backoff: Duration::from_millis(20),
        ..Default::default()
    }
}
