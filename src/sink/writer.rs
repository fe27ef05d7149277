//! Sink write path
//!
//! Resolves the level, drops records below the minimum severity, gives the
//! retention sweeper its chance to run and inserts the record. The sink also
//! keeps an *advisory* last-id: the newest id it knows of, used only to seed
//! "from now" tail subscriptions. It may lag the true latest id under
//! concurrent writers and is never used for anything correctness-critical.

use crate::config::{Config, SinkConfig, TailConfig};
use crate::error::{SinkError, SinkResult};
use crate::sink::cleanup::{RetentionPolicy, Sweeper};
use crate::sink::database::SqliteStore;
use crate::sink::severity::{LevelSpec, Severity};
use crate::sink::store::{LogStore, NewRecord};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Capacity of the "logged" notification channel; slow receivers lag, writers never block
const LOGGED_CHANNEL_CAPACITY: usize = 1024;

/// Result of a single write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Below the minimum severity; nothing was persisted
    Dropped,
    /// Inserted. `id` is present when the store reported it from the insert itself.
    Persisted { id: Option<i64> },
}

/// Notification broadcast for every accepted record, before the insert completes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggedEvent {
    pub level: Severity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub meta: serde_json::Map<String, Value>,
}

/// Durable, queryable log sink over a relational store
pub struct Sink {
    pub(crate) store: Arc<dyn LogStore>,
    pub(crate) table: String,
    minimum: AtomicU8,
    pub(crate) last_id: Arc<AtomicI64>,
    sweeper: Sweeper,
    logged: broadcast::Sender<LoggedEvent>,
    pub(crate) tails: Arc<DashMap<Uuid, Arc<watch::Sender<bool>>>>,
    pub(crate) tail_config: TailConfig,
}

impl Sink {
    /// Open the configured SQLite database and bootstrap a sink on it
    pub async fn connect(config: &Config) -> SinkResult<Self> {
        let store = SqliteStore::connect(&config.database)
            .await
            .map_err(SinkError::Bootstrap)?;

        Ok(Self::new(Arc::new(store), &config.sink)
            .await?
            .with_tail_config(config.tail.clone()))
    }

    /// Bootstrap a sink over any store
    ///
    /// Ensures the table exists, primes the advisory last-id from the newest
    /// stored row and gives the sweeper one chance to run.
    pub async fn new(store: Arc<dyn LogStore>, config: &SinkConfig) -> SinkResult<Self> {
        let minimum: Severity = config.level.parse()?;

        store
            .ensure_schema(&config.table_name)
            .await
            .map_err(SinkError::Bootstrap)?;

        let last_id = match store.select_max_id(&config.table_name).await {
            Ok(max_id) => max_id.unwrap_or(0),
            Err(e) => {
                tracing::warn!(table = %config.table_name, error = %e, "Could not read latest id");
                0
            }
        };

        let sweeper = Sweeper::new(
            store.clone(),
            config.table_name.clone(),
            RetentionPolicy {
                days_to_keep: config.days_to_keep,
            },
            config.sweep_probability,
        );
        sweeper.maybe_sweep();

        let (logged, _) = broadcast::channel(LOGGED_CHANNEL_CAPACITY);

        tracing::info!(
            table = %config.table_name,
            level = %minimum,
            last_id = last_id,
            days_to_keep = ?config.days_to_keep,
            "Log sink ready"
        );

        Ok(Self {
            store,
            table: config.table_name.clone(),
            minimum: AtomicU8::new(minimum.rank()),
            last_id: Arc::new(AtomicI64::new(last_id)),
            sweeper,
            logged,
            tails: Arc::new(DashMap::new()),
            tail_config: TailConfig::default(),
        })
    }

    /// Defaults used by [`TailOptions::from_sink`](crate::sink::tail::TailOptions)
    pub fn with_tail_config(mut self, tail_config: TailConfig) -> Self {
        self.tail_config = tail_config;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn store(&self) -> &Arc<dyn LogStore> {
        &self.store
    }

    pub fn sweeper(&self) -> &Sweeper {
        &self.sweeper
    }

    pub fn minimum_level(&self) -> Severity {
        Severity::from_rank(self.minimum.load(Ordering::Acquire)).unwrap_or_default()
    }

    /// Change the filtering threshold at runtime
    pub fn set_minimum_level(&self, level: impl Into<LevelSpec>) -> SinkResult<()> {
        let severity = level.into().resolve()?;
        self.minimum.store(severity.rank(), Ordering::Release);
        tracing::debug!(level = %severity, "Minimum level changed");
        Ok(())
    }

    /// Advisory latest id
    pub fn last_id(&self) -> i64 {
        self.last_id.load(Ordering::Acquire)
    }

    pub fn subscribe_logged(&self) -> broadcast::Receiver<LoggedEvent> {
        self.logged.subscribe()
    }

    /// Write a record
    ///
    /// # Example
    ///
    /// ```ignore
    /// sink.write(3u8, "boom", Default::default()).await?;       // rank
    /// sink.write("warning", "careful", Default::default()).await?; // name
    /// ```
    pub async fn write(
        &self,
        level: impl Into<LevelSpec>,
        message: impl Into<String>,
        meta: serde_json::Map<String, Value>,
    ) -> SinkResult<WriteOutcome> {
        let severity = level.into().resolve()?;

        self.write_record(NewRecord {
            level: severity.name().to_string(),
            message: message.into(),
            timestamp: None,
            meta,
        })
        .await
    }

    /// Write a prepared record; `record.level` must name a severity
    pub async fn write_record(&self, mut record: NewRecord) -> SinkResult<WriteOutcome> {
        let severity: Severity = record.level.parse()?;
        record.level = severity.name().to_string();

        if !severity.passes(self.minimum_level()) {
            crate::metrics::record_dropped(severity.name());
            tracing::trace!(level = %severity, "Record below minimum level, dropped");
            return Ok(WriteOutcome::Dropped);
        }

        // Sweeper first: its cutoff must predate this record's timestamp
        self.sweeper.maybe_sweep();
        let timestamp = *record.timestamp.get_or_insert_with(Utc::now);

        let _ = self.logged.send(LoggedEvent {
            level: severity,
            message: record.message.clone(),
            timestamp,
            meta: record.meta.clone(),
        });

        match self.store.insert(&self.table, &record).await {
            Ok(Some(id)) => {
                self.last_id.fetch_max(id, Ordering::AcqRel);
                crate::metrics::record_written(severity.name());
                Ok(WriteOutcome::Persisted { id: Some(id) })
            }
            Ok(None) => {
                self.refresh_last_id();
                crate::metrics::record_written(severity.name());
                Ok(WriteOutcome::Persisted { id: None })
            }
            Err(e) => {
                crate::metrics::record_write_error();
                tracing::warn!(table = %self.table, error = %e, "Failed to insert log record");
                Err(SinkError::Write(e))
            }
        }
    }

    /// Re-read the newest id in the background and raise the advisory last-id
    ///
    /// Only needed for stores that cannot report the id from the insert. Under
    /// concurrent writers the value read may belong to another writer's row.
    pub fn refresh_last_id(&self) -> JoinHandle<()> {
        let store = self.store.clone();
        let table = self.table.clone();
        let last_id = self.last_id.clone();

        tokio::spawn(async move {
            match store.select_max_id(&table).await {
                Ok(Some(id)) => {
                    last_id.fetch_max(id, Ordering::AcqRel);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(table = %table, error = %e, "Failed to refresh latest id");
                }
            }
        })
    }

    /// Number of running tail subscriptions
    pub fn active_tails(&self) -> usize {
        self.tails.len()
    }

    /// Cancel every running tail subscription
    pub fn shutdown(&self) {
        for entry in self.tails.iter() {
            entry.value().send_replace(true);
        }
        tracing::info!(count = self.tails.len(), "Cancelled tail subscriptions");
    }
}
