use thiserror::Error;

/// Errors raised by a relational store adapter
#[derive(Debug, Error)]
pub enum StoreError {
    /// Driver, connection or statement failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Table name is not a plain SQL identifier
    #[error("Invalid table name: {0}")]
    InvalidTableName(String),
    /// Extra record fields could not be encoded or decoded as JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// A stored row could not be mapped back to a record
    #[error("Decode error: {0}")]
    Decode(String),
    /// Projection or filter names a column the table does not have
    #[error("Unknown column: {0}")]
    UnknownColumn(String),
}

/// Errors surfaced by the sink and its background activities
#[derive(Debug, Error)]
pub enum SinkError {
    /// Unknown severity rank or name (local validation, never retried)
    #[error("Invalid level: {0}")]
    InvalidLevel(String),
    /// Connecting to the store or ensuring its schema failed
    #[error("Bootstrap failed: {0}")]
    Bootstrap(#[source] StoreError),
    /// The store rejected or failed an insert
    #[error("Write failed: {0}")]
    Write(#[source] StoreError),
    /// The store rejected a read issued by a query
    #[error("Query failed: {0}")]
    Query(#[source] StoreError),
    /// A tail poll iteration failed; the poller keeps running
    #[error("Poll failed: {0}")]
    Poll(#[source] StoreError),
    /// A retention delete failed; only ever logged
    #[error("Sweep failed: {0}")]
    Sweep(#[source] StoreError),
}

impl SinkError {
    /// Short machine-readable name, used as a metric/log label
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidLevel(_) => "invalid_level",
            Self::Bootstrap(_) => "bootstrap_error",
            Self::Write(_) => "write_error",
            Self::Query(_) => "query_error",
            Self::Poll(_) => "poll_error",
            Self::Sweep(_) => "sweep_error",
        }
    }
}

pub type SinkResult<T> = Result<T, SinkError>;
