//! Live tail of newly written records
//!
//! Each subscription runs its own polling task:
//!
//! ```text
//! Starting → Polling → (Emitting | Backoff) → Polling → … → Stopped
//! ```
//!
//! - **Polling** selects every row with `id > cursor`, ascending by id.
//! - **Emitting** delivers those rows in order, advancing the cursor per row.
//! - **Backoff** delivers a non-fatal error event and waits before retrying.
//! - **Stopped** is reached only through cancellation (or the consumer
//!   dropping its receiver). Cancellation is checked before every store read
//!   and every delivery; a read still in flight is abandoned.
//!
//! Delivery is at-least-once from the consumer's point of view: a "from now"
//! subscription starts one id behind the advisory last-id, and rows pruned by
//! the sweeper before they were polled leave gaps.

use super::store::{LogRecord, LogStore, Ordering, RangeFilter, Row, SortDirection, SortKey};
use super::writer::Sink;
use crate::config::TailConfig;
use crate::error::SinkError;
use dashmap::DashMap;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Where a subscription starts reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TailStart {
    /// Just behind the advisory last-id, so the very next write is included
    #[default]
    Now,
    /// Every row still in the table
    Beginning,
    /// Rows with an id strictly greater than this one
    Id(i64),
}

impl FromStr for TailStart {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "now" | "-1" => Ok(Self::Now),
            "beginning" | "start" => Ok(Self::Beginning),
            other => other
                .parse::<i64>()
                .map(Self::Id)
                .map_err(|_| format!("invalid tail start '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TailOptions {
    pub start: TailStart,
    /// Wait between successful polls
    pub poll_interval: Duration,
    /// Wait after a failed poll
    pub error_backoff: Duration,
    /// Events buffered between the poller and the consumer
    pub channel_capacity: usize,
}

impl Default for TailOptions {
    fn default() -> Self {
        Self::from_config(&TailConfig::default())
    }
}

impl TailOptions {
    pub fn from_config(config: &TailConfig) -> Self {
        Self {
            start: TailStart::Now,
            poll_interval: config.poll_interval(),
            error_backoff: config.error_backoff(),
            channel_capacity: config.channel_capacity.max(1),
        }
    }

    /// Options seeded from the sink's tail configuration
    pub fn from_sink(sink: &Sink) -> Self {
        Self::from_config(&sink.tail_config)
    }

    pub fn start(mut self, start: TailStart) -> Self {
        self.start = start;
        self
    }
}

/// Per-subscription cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailCursor {
    /// Exclusive lower bound for the next poll
    pub last_seen_id: i64,
    pub active: bool,
}

/// Something the poller hands to the subscriber
#[derive(Debug)]
pub enum TailEvent {
    Record(LogRecord),
    /// A failed poll; the subscription keeps running
    Error(SinkError),
}

/// Consumer side of a tail subscription
///
/// Dropping the handle cancels the subscription.
pub struct TailHandle {
    id: Uuid,
    events: mpsc::Receiver<TailEvent>,
    cancel: Arc<watch::Sender<bool>>,
    task: JoinHandle<()>,
}

impl TailHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next event, or `None` once the subscription is stopped
    ///
    /// Events still buffered when the subscription is cancelled are discarded.
    pub async fn next(&mut self) -> Option<TailEvent> {
        if self.is_cancelled() {
            return None;
        }

        let mut cancelled = self.cancel.subscribe();
        let event = tokio::select! {
            biased;
            _ = cancelled.wait_for(|c| *c) => None,
            event = self.events.recv() => event,
        };

        if self.is_cancelled() {
            self.events.close();
            return None;
        }
        event
    }

    pub fn cancel(&self) {
        if !self.cancel.send_replace(true) {
            tracing::debug!(subscription = %self.id, "Tail subscription cancelled");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    pub fn is_active(&self) -> bool {
        !self.is_cancelled() && !self.task.is_finished()
    }

    /// Wait for the polling task to stop
    pub async fn stopped(&mut self) {
        if let Err(e) = (&mut self.task).await {
            if e.is_panic() {
                tracing::error!(subscription = %self.id, error = %e, "Tail poller panicked");
            }
        }
    }
}

impl Drop for TailHandle {
    fn drop(&mut self) {
        self.cancel.send_replace(true);
    }
}

impl Sink {
    /// Start a tail subscription
    ///
    /// # Example
    ///
    /// ```ignore
    /// let mut tail = sink.tail(TailOptions::from_sink(&sink).start(TailStart::Beginning));
    /// while let Some(event) = tail.next().await {
    ///     match event {
    ///         TailEvent::Record(record) => println!("{} {}", record.id, record.message),
    ///         TailEvent::Error(e) => eprintln!("poll failed: {}", e),
    ///     }
    /// }
    /// ```
    pub fn tail(&self, options: TailOptions) -> TailHandle {
        let id = Uuid::new_v4();
        let cursor = TailCursor {
            last_seen_id: match options.start {
                TailStart::Now => self.last_id() - 1,
                TailStart::Beginning => 0,
                TailStart::Id(start) => start,
            },
            active: true,
        };

        let (events_tx, events_rx) = mpsc::channel(options.channel_capacity.max(1));
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let cancel_tx = Arc::new(cancel_tx);

        self.tails.insert(id, cancel_tx.clone());
        crate::metrics::set_active_tails(self.tails.len());

        tracing::debug!(
            subscription = %id,
            cursor = cursor.last_seen_id,
            "Tail subscription started"
        );

        let poller = Poller {
            id,
            store: self.store.clone(),
            table: self.table.clone(),
            poll_interval: options.poll_interval,
            error_backoff: options.error_backoff,
            events: events_tx,
            cancel: cancel_rx,
            registry: self.tails.clone(),
        };
        let task = tokio::spawn(poller.run(cursor));

        TailHandle {
            id,
            events: events_rx,
            cancel: cancel_tx,
            task,
        }
    }
}

/// Why the loop stopped
enum Stop {
    Cancelled,
    ConsumerGone,
}

struct Poller {
    id: Uuid,
    store: Arc<dyn LogStore>,
    table: String,
    poll_interval: Duration,
    error_backoff: Duration,
    events: mpsc::Sender<TailEvent>,
    cancel: watch::Receiver<bool>,
    registry: Arc<DashMap<Uuid, Arc<watch::Sender<bool>>>>,
}

impl Poller {
    async fn run(mut self, mut cursor: TailCursor) {
        let reason = loop {
            let wait = match self.poll_once(&mut cursor).await {
                Ok(wait) => wait,
                Err(stop) => break stop,
            };

            tokio::select! {
                biased;
                _ = self.cancel.wait_for(|c| *c) => break Stop::Cancelled,
                _ = tokio::time::sleep(wait) => {}
            }
        };

        cursor.active = false;
        self.registry.remove(&self.id);
        crate::metrics::set_active_tails(self.registry.len());

        let reason = match reason {
            Stop::Cancelled => "cancelled",
            Stop::ConsumerGone => "consumer dropped",
        };
        tracing::debug!(
            subscription = %self.id,
            cursor = cursor.last_seen_id,
            reason,
            "Tail subscription stopped"
        );
    }

    /// One Polling step followed by Emitting or Backoff; returns the wait before the next poll
    async fn poll_once(&mut self, cursor: &mut TailCursor) -> Result<Duration, Stop> {
        if self.is_cancelled() {
            return Err(Stop::Cancelled);
        }

        // Nothing can follow i64::MAX
        let Some(min_id) = cursor.last_seen_id.checked_add(1) else {
            return Ok(self.poll_interval);
        };

        let filter = RangeFilter {
            min_id: Some(min_id),
            order: Some(Ordering {
                key: SortKey::Id,
                direction: SortDirection::Asc,
            }),
            ..Default::default()
        };

        let result = tokio::select! {
            biased;
            _ = self.cancel.wait_for(|c| *c) => return Err(Stop::Cancelled),
            result = self.store.select_range(&self.table, &filter) => result,
        };

        match result {
            Ok(rows) => {
                let mut delivered = 0;
                for row in rows {
                    let row_id = row_id(&row);
                    let event = match LogRecord::from_row(row) {
                        Ok(record) => TailEvent::Record(record),
                        Err(e) => TailEvent::Error(SinkError::Poll(e)),
                    };

                    self.deliver(event).await?;
                    if let Some(id) = row_id {
                        cursor.last_seen_id = cursor.last_seen_id.max(id);
                    }
                    delivered += 1;
                }

                if delivered > 0 {
                    crate::metrics::record_tailed(delivered);
                    tracing::trace!(
                        subscription = %self.id,
                        delivered,
                        cursor = cursor.last_seen_id,
                        "Tail batch delivered"
                    );
                }
                Ok(self.poll_interval)
            }
            Err(e) => {
                crate::metrics::record_poll_error();
                tracing::warn!(subscription = %self.id, error = %e, "Tail poll failed");
                self.deliver(TailEvent::Error(SinkError::Poll(e))).await?;
                Ok(self.error_backoff)
            }
        }
    }

    async fn deliver(&mut self, event: TailEvent) -> Result<(), Stop> {
        if self.is_cancelled() {
            return Err(Stop::Cancelled);
        }

        tokio::select! {
            biased;
            _ = self.cancel.wait_for(|c| *c) => Err(Stop::Cancelled),
            sent = self.events.send(event) => sent.map_err(|_| Stop::ConsumerGone),
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

fn row_id(row: &Row) -> Option<i64> {
    row.get("id").and_then(Value::as_i64)
}
