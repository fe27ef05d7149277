//! Retention sweeper
//!
//! Pruning is triggered opportunistically from the write path instead of a
//! timer: each write rolls the dice and, with probability `probability`
//! (1/10 by default), spawns a delete of every row older than
//! `days_to_keep`. Failures are logged, never returned to the writer.

use crate::error::{SinkError, SinkResult};
use crate::sink::store::LogStore;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Retention configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// `None` disables pruning
    pub days_to_keep: Option<u32>,
}

impl RetentionPolicy {
    /// Rows strictly older than the returned instant are expired
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.days_to_keep
            .map(|days| now - ChronoDuration::days(i64::from(days)))
    }
}

/// Probabilistically-triggered pruning of expired rows
pub struct Sweeper {
    store: Arc<dyn LogStore>,
    table: String,
    policy: RetentionPolicy,
    probability: f64,
    running: Arc<AtomicBool>,
}

impl Sweeper {
    pub fn new(
        store: Arc<dyn LogStore>,
        table: impl Into<String>,
        policy: RetentionPolicy,
        probability: f64,
    ) -> Self {
        Self {
            store,
            table: table.into(),
            policy,
            // NaN would make the coin flip panic; treat it as "never"
            probability: if probability.is_nan() {
                0.0
            } else {
                probability.clamp(0.0, 1.0)
            },
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Opportunistic check run on every write
    ///
    /// Returns the handle of the spawned delete when one was started. The
    /// cutoff is fixed here, before the caller stamps its own record, so a
    /// write never prunes the record it is about to insert. At most one
    /// sweep is in flight per sweeper.
    pub fn maybe_sweep(&self) -> Option<JoinHandle<()>> {
        let cutoff = self.policy.cutoff(Utc::now())?;

        if !rand::thread_rng().gen_bool(self.probability) {
            return None;
        }

        if self.running.swap(true, Ordering::AcqRel) {
            tracing::debug!(table = %self.table, "Sweep already in flight, skipping");
            return None;
        }

        let guard = RunningGuard(self.running.clone());
        let store = self.store.clone();
        let table = self.table.clone();

        Some(tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = delete_expired(store.as_ref(), &table, cutoff).await {
                tracing::error!(table = %table, error = %e, "Retention sweep failed");
            }
        }))
    }

    /// Run one pruning pass immediately (for manual triggering)
    ///
    /// Returns `Ok(None)` when retention is disabled.
    pub async fn sweep_now(&self) -> SinkResult<Option<u64>> {
        let Some(cutoff) = self.policy.cutoff(Utc::now()) else {
            tracing::info!(table = %self.table, "Retention disabled, nothing to sweep");
            return Ok(None);
        };

        tracing::info!(table = %self.table, "Running manual sweep");
        delete_expired(self.store.as_ref(), &self.table, cutoff)
            .await
            .map(Some)
    }
}

async fn delete_expired(store: &dyn LogStore, table: &str, cutoff: DateTime<Utc>) -> SinkResult<u64> {
    match store.delete_older_than(table, cutoff).await {
        Ok(deleted) => {
            crate::metrics::record_sweep("ok", deleted);
            tracing::info!(
                table = %table,
                cutoff = %cutoff,
                deleted = deleted,
                "Cleaned up old records"
            );
            Ok(deleted)
        }
        Err(e) => {
            crate::metrics::record_sweep("error", 0);
            Err(SinkError::Sweep(e))
        }
    }
}

/// Clears the in-flight flag even if the sweep task panics
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
