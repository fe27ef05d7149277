//! Tracing layer for the sink
//!
//! Routes the host application's `tracing` events into a [`Sink`]. The sink
//! still applies its own minimum level; the layer only maps levels and
//! collects fields.

use super::severity::Severity;
use super::writer::Sink;
use serde_json::Value;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{layer::Context, registry::LookupSpan, Layer};

/// Event targets never forwarded, so the sink's own logging (and the SQL
/// driver's) cannot feed back into itself
const IGNORED_TARGET_PREFIXES: [&str; 2] = [env!("CARGO_CRATE_NAME"), "sqlx"];

/// Custom tracing layer that writes events to a sink
pub struct SinkLayer {
    sink: Arc<Sink>,
    runtime: Handle,
}

impl SinkLayer {
    /// Writes are spawned on `runtime`
    pub fn new(sink: Arc<Sink>, runtime: Handle) -> Self {
        Self { sink, runtime }
    }
}

/// tracing has five levels; the sink has eight
pub fn severity_for(level: &Level) -> Severity {
    match *level {
        Level::ERROR => Severity::Error,
        Level::WARN => Severity::Warning,
        Level::INFO => Severity::Info,
        _ => Severity::Debug,
    }
}

fn is_ignored(target: &str) -> bool {
    IGNORED_TARGET_PREFIXES
        .iter()
        .any(|prefix| target.starts_with(prefix))
}

/// Visitor to extract the message and extra fields from an event
#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: serde_json::Map<String, Value>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &tracing::field::Field, value: Value) {
        if field.name() == "message" {
            self.message = Some(match value {
                Value::String(s) => s,
                other => other.to_string(),
            });
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.insert(field, Value::String(format!("{:?}", value)));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.insert(field, Value::from(value));
    }
}

impl<S> Layer<S> for SinkLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if is_ignored(metadata.target()) {
            return;
        }

        let severity = severity_for(metadata.level());
        if !severity.passes(self.sink.minimum_level()) {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let mut meta = visitor.fields;
        meta.insert("target".to_string(), Value::String(metadata.target().to_string()));
        let message = visitor.message.unwrap_or_default();

        let sink = self.sink.clone();
        self.runtime.spawn(async move {
            if let Err(e) = sink.write(severity, message, meta).await {
                tracing::warn!(error = %e, "Failed to persist tracing event");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SinkConfig;
    use crate::sink::database::SqliteStore;
    use crate::sink::query::QueryOptions;
    use std::time::Duration;
    use tracing_subscriber::prelude::*;

    #[test]
    fn test_level_mapping() {
        assert_eq!(severity_for(&Level::ERROR), Severity::Error);
        assert_eq!(severity_for(&Level::WARN), Severity::Warning);
        assert_eq!(severity_for(&Level::TRACE), Severity::Debug);
    }

    #[test]
    fn test_own_targets_are_ignored() {
        assert!(is_ignored("sql_log_sink::sink::tail"));
        assert!(is_ignored("sqlx::query"));
        assert!(!is_ignored("my_app::handlers"));
    }

    #[tokio::test]
    async fn test_sink_layer_persists_events() {
        let store = SqliteStore::in_memory().await.unwrap();
        let sink = Arc::new(Sink::new(Arc::new(store), &SinkConfig::default()).await.unwrap());

        let subscriber = tracing_subscriber::registry()
            .with(SinkLayer::new(sink.clone(), Handle::current()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::error!(target: "my_app", user = "alice", attempt = 3, "payment failed");
            tracing::info!(target: "my_app", "below the warning threshold");
        });

        let mut records = Vec::new();
        for _ in 0..100 {
            records = sink.query_records(&QueryOptions::default()).await.unwrap();
            if !records.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, "error");
        assert_eq!(records[0].message, "payment failed");
        assert_eq!(records[0].meta["user"], "alice");
        assert_eq!(records[0].meta["attempt"], 3);
        assert_eq!(records[0].meta["target"], "my_app");
    }
}
