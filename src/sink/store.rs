//! Relational store adapter contract
//!
//! The core never talks to a driver directly. Everything it needs from the
//! backing store goes through [`LogStore`]: schema bootstrap, insert, max-id
//! lookup, a filtered range select and a timestamp-bounded delete. Every
//! method must be safe to call concurrently from the write path, the sweeper,
//! queries and any number of tail pollers.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::ops::Bound;
use std::str::FromStr;

/// One row as returned by a range select, restricted to the projected columns
pub type Row = serde_json::Map<String, Value>;

/// Physical columns of a log table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Column {
    Id,
    Level,
    Message,
    Timestamp,
    Meta,
}

impl Column {
    pub const ALL: [Column; 5] = [
        Column::Id,
        Column::Level,
        Column::Message,
        Column::Timestamp,
        Column::Meta,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Level => "level",
            Self::Message => "message",
            Self::Timestamp => "timestamp",
            Self::Meta => "meta",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Column {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|column| column.name() == s.trim())
            .ok_or_else(|| format!("unknown field '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    Id,
    #[default]
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(format!("unknown sort order '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ordering {
    pub key: SortKey,
    pub direction: SortDirection,
}

/// Predicate, ordering and projection for a single range select
#[derive(Debug, Clone)]
pub struct RangeFilter {
    /// Inclusive lower bound on `id`
    pub min_id: Option<i64>,
    pub since: Bound<DateTime<Utc>>,
    pub until: Bound<DateTime<Utc>>,
    /// Exact match on the stored severity name
    pub level: Option<String>,
    pub limit: Option<usize>,
    /// `None` leaves ordering to the store
    pub order: Option<Ordering>,
    /// Empty means all columns
    pub fields: Vec<Column>,
}

impl Default for RangeFilter {
    fn default() -> Self {
        Self {
            min_id: None,
            since: Bound::Unbounded,
            until: Bound::Unbounded,
            level: None,
            limit: None,
            order: None,
            fields: Vec::new(),
        }
    }
}

impl RangeFilter {
    /// Columns to select, expanding an empty projection to every column
    pub fn columns(&self) -> Vec<Column> {
        if self.fields.is_empty() {
            Column::ALL.to_vec()
        } else {
            self.fields.clone()
        }
    }
}

/// A record on its way into the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    pub level: String,
    pub message: String,
    /// `None` lets the store stamp the row at insert time
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub meta: serde_json::Map<String, Value>,
}

/// A persisted record with every column present
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: i64,
    pub level: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub meta: serde_json::Map<String, Value>,
}

impl LogRecord {
    pub fn from_row(row: Row) -> Result<Self, StoreError> {
        serde_json::from_value(Value::Object(row)).map_err(|e| StoreError::Decode(e.to_string()))
    }
}

/// Generic relational interface the sink is built on
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Create the table if absent. Idempotent.
    async fn ensure_schema(&self, table: &str) -> Result<(), StoreError>;

    /// Append a row. Returns the assigned id when the store reports it from
    /// the insert itself, `None` when it cannot.
    async fn insert(&self, table: &str, record: &NewRecord) -> Result<Option<i64>, StoreError>;

    /// Highest current id, `None` for an empty table
    async fn select_max_id(&self, table: &str) -> Result<Option<i64>, StoreError>;

    async fn select_range(&self, table: &str, filter: &RangeFilter) -> Result<Vec<Row>, StoreError>;

    /// Delete rows with `timestamp` strictly before `cutoff`; returns the count removed
    async fn delete_older_than(&self, table: &str, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Accept only plain identifiers; table names are interpolated into SQL
pub fn validate_table_name(name: &str) -> Result<(), StoreError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);

    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') && name.len() <= 64 {
        Ok(())
    } else {
        Err(StoreError::InvalidTableName(name.to_string()))
    }
}
