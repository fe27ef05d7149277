//! Durable, queryable log sink
//!
//! This module persists structured log records to a relational store and
//! reads them back:
//! - **Write path**: severity filtering, insert, advisory last-id
//! - **Retention**: probabilistic, write-triggered pruning
//! - **Query**: bounded time-range reads with ordering and projection
//! - **Tail**: cancellable polling feed of newly written records
//!
//! ## Architecture
//!
//! ```text
//! application ─► Sink::write ─► LogStore::insert
//!                    └─► Sweeper (opportunistic) ─► LogStore::delete_older_than
//! consumer ─► Sink::query ─► LogStore::select_range
//! consumer ─► Sink::tail ─► poller task ─► LogStore::select_range ─► TailHandle
//! ```
//!
//! The store is the only shared mutable state. Its isolation level governs
//! what concurrent readers see; read-committed or better is assumed.

pub mod cleanup;
pub mod database;
pub mod layer;
pub mod query;
pub mod severity;
pub mod store;
pub mod tail;
pub mod writer;

// Re-export public types
pub use cleanup::{RetentionPolicy, Sweeper};
pub use database::SqliteStore;
pub use layer::SinkLayer;
pub use query::QueryOptions;
pub use severity::{LevelSpec, Severity};
pub use store::{Column, LogRecord, LogStore, NewRecord, RangeFilter, Row, SortDirection, SortKey};
pub use tail::{TailCursor, TailEvent, TailHandle, TailOptions, TailStart};
pub use writer::{LoggedEvent, Sink, WriteOutcome};
