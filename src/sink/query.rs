//! Query API for stored log records
//!
//! Translates a small, all-optional filter into exactly one range select.
//! There is no pagination cursor; callers combine `rows` with a narrower
//! time range to page.

use super::severity::Severity;
use super::store::{Column, LogRecord, Ordering, RangeFilter, Row, SortDirection, SortKey};
use super::writer::Sink;
use crate::error::{SinkError, SinkResult, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::Bound;

/// Options for [`Sink::query`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Start of the time range (inclusive). Only applied together with `until`.
    pub from: Option<DateTime<Utc>>,

    /// End of the time range (inclusive). Only applied together with `from`.
    pub until: Option<DateTime<Utc>>,

    /// Maximum number of rows (default: unlimited)
    pub rows: Option<usize>,

    /// Sort direction; `None` leaves ordering to the store
    pub order: Option<SortDirection>,

    /// Column the sort applies to (default: timestamp)
    #[serde(default)]
    pub order_by: SortKey,

    /// Projection (default: all columns)
    #[serde(default)]
    pub fields: Vec<String>,

    /// Only records stored with this severity
    pub level: Option<String>,
}

impl QueryOptions {
    /// Build the single range select this query issues
    pub fn to_filter(&self) -> SinkResult<RangeFilter> {
        let (since, until) = match (self.from, self.until) {
            (Some(from), Some(until)) => (Bound::Included(from), Bound::Included(until)),
            _ => (Bound::Unbounded, Bound::Unbounded),
        };

        let fields = self
            .fields
            .iter()
            .map(|name| {
                name.parse::<Column>()
                    .map_err(|_| SinkError::Query(StoreError::UnknownColumn(name.clone())))
            })
            .collect::<SinkResult<Vec<_>>>()?;

        let level = self
            .level
            .as_deref()
            .map(|name| name.parse::<Severity>().map(|s| s.name().to_string()))
            .transpose()?;

        Ok(RangeFilter {
            min_id: None,
            since,
            until,
            level,
            limit: self.rows,
            order: self.order.map(|direction| Ordering {
                key: self.order_by,
                direction,
            }),
            fields,
        })
    }
}

impl Sink {
    /// Query stored records
    ///
    /// Rows hold only the projected columns.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let options = QueryOptions {
    ///     from: Some(Utc::now() - chrono::Duration::hours(1)),
    ///     until: Some(Utc::now()),
    ///     rows: Some(100),
    ///     order: Some(SortDirection::Desc),
    ///     ..Default::default()
    /// };
    /// let rows = sink.query(&options).await?;
    /// ```
    pub async fn query(&self, options: &QueryOptions) -> SinkResult<Vec<Row>> {
        let filter = options.to_filter()?;

        self.store
            .select_range(&self.table, &filter)
            .await
            .map_err(|e| {
                tracing::warn!(table = %self.table, error = %e, "Log query failed");
                SinkError::Query(e)
            })
    }

    /// Query full records, ignoring any projection in `options`
    pub async fn query_records(&self, options: &QueryOptions) -> SinkResult<Vec<LogRecord>> {
        let options = QueryOptions {
            fields: Vec::new(),
            ..options.clone()
        };

        self.query(&options)
            .await?
            .into_iter()
            .map(|row| LogRecord::from_row(row).map_err(SinkError::Query))
            .collect()
    }

    /// Callback form of [`Sink::query`]
    pub async fn query_with<F>(&self, options: &QueryOptions, callback: F)
    where
        F: FnOnce(SinkResult<Vec<Row>>),
    {
        callback(self.query(options).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SinkConfig;
    use crate::sink::database::SqliteStore;
    use crate::sink::store::NewRecord;
    use chrono::Duration;
    use std::sync::Arc;

    async fn create_test_sink() -> Sink {
        let store = SqliteStore::in_memory().await.unwrap();
        Sink::new(Arc::new(store), &SinkConfig::default()).await.unwrap()
    }

    async fn insert_at(sink: &Sink, level: &str, message: &str, timestamp: DateTime<Utc>) {
        let record = NewRecord {
            level: level.to_string(),
            message: message.to_string(),
            timestamp: Some(timestamp),
            meta: Default::default(),
        };
        sink.store().insert(sink.table(), &record).await.unwrap();
    }

    #[test]
    fn test_single_bound_is_ignored() {
        let options = QueryOptions {
            from: Some(Utc::now()),
            ..Default::default()
        };
        let filter = options.to_filter().unwrap();
        assert_eq!(filter.since, Bound::Unbounded);
        assert_eq!(filter.until, Bound::Unbounded);
    }

    #[test]
    fn test_unknown_field_is_query_error() {
        let options = QueryOptions {
            fields: vec!["message".to_string(), "hostname".to_string()],
            ..Default::default()
        };
        let err = options.to_filter().unwrap_err();
        assert!(matches!(err, SinkError::Query(StoreError::UnknownColumn(_))));
    }

    #[test]
    fn test_order_defaults_to_timestamp() {
        let options = QueryOptions {
            order: Some(SortDirection::Asc),
            ..Default::default()
        };
        let order = options.to_filter().unwrap().order.unwrap();
        assert_eq!(order.key, SortKey::Timestamp);
    }

    #[tokio::test]
    async fn test_query_time_range() {
        let sink = create_test_sink().await;
        let now = Utc::now();

        insert_at(&sink, "error", "too old", now - Duration::hours(3)).await;
        insert_at(&sink, "error", "in range", now - Duration::hours(1)).await;
        insert_at(&sink, "error", "too new", now + Duration::hours(1)).await;

        let options = QueryOptions {
            from: Some(now - Duration::hours(2)),
            until: Some(now),
            ..Default::default()
        };

        let records = sink.query_records(&options).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "in range");
    }

    #[tokio::test]
    async fn test_query_order_limit_and_projection() {
        let sink = create_test_sink().await;
        let now = Utc::now();

        for i in 0..5 {
            insert_at(&sink, "warning", &format!("m{}", i), now - Duration::minutes(10 - i)).await;
        }

        let options = QueryOptions {
            rows: Some(2),
            order: Some(SortDirection::Desc),
            fields: vec!["message".to_string()],
            ..Default::default()
        };

        let rows = sink.query(&options).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["message"], "m4");
        assert_eq!(rows[1]["message"], "m3");
        assert_eq!(rows[0].len(), 1);
    }

    #[tokio::test]
    async fn test_query_level_filter() {
        let sink = create_test_sink().await;
        let now = Utc::now();
        insert_at(&sink, "error", "e", now).await;
        insert_at(&sink, "crit", "c", now).await;

        let options = QueryOptions {
            level: Some("CRIT".to_string()),
            ..Default::default()
        };
        let records = sink.query_records(&options).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "c");
    }

    #[tokio::test]
    async fn test_query_with_callback() {
        let sink = create_test_sink().await;
        sink.write("alert", "hello", Default::default()).await.unwrap();

        let mut seen = None;
        sink.query_with(&QueryOptions::default(), |result| {
            seen = Some(result.map(|rows| rows.len()));
        })
        .await;

        assert_eq!(seen.unwrap().unwrap(), 1);
    }
}
