pub mod config;
pub mod error;
pub mod metrics;
pub mod sink;

use config::LoggingConfig;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing/logging
///
/// `RUST_LOG` wins over the configured level. Can only be called once.
pub fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let registry = tracing_subscriber::registry().with(filter);

    if logging.format == "json" {
        registry
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }

    metrics::init_metric_descriptions();
}

/// Install console logging plus a layer that persists the application's own
/// `tracing` events through `sink`
///
/// Must be called from within a tokio runtime; sink writes are spawned on it.
/// Call this instead of [`init_tracing`], not after it.
pub fn init_tracing_with_sink(logging: &LoggingConfig, sink: Arc<sink::Sink>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let sink_layer = sink::SinkLayer::new(sink, tokio::runtime::Handle::current());

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(sink_layer);

    match tracing::subscriber::set_global_default(subscriber) {
        Ok(_) => {
            tracing::info!("Sink layer added to tracing subscriber");
        }
        Err(e) => {
            eprintln!("Warning: Failed to install sink layer: {}", e);
            eprintln!("Logs will only be written to the console, not to the database");
        }
    }

    metrics::init_metric_descriptions();
}
