use crate::sink::severity::Severity;
use crate::sink::store::validate_table_name;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub tail: TailConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Write path and retention settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SinkConfig {
    #[serde(default = "default_table_name")]
    pub table_name: String,

    /// Minimum severity name persisted by the sink
    #[serde(default = "default_level")]
    pub level: String,

    /// Retention window in days; absent disables pruning
    #[serde(default)]
    pub days_to_keep: Option<u32>,

    /// Probability that a single write triggers a retention sweep
    #[serde(default = "default_sweep_probability")]
    pub sweep_probability: f64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            table_name: default_table_name(),
            level: default_level(),
            days_to_keep: None,
            sweep_probability: default_sweep_probability(),
        }
    }
}

/// Connection parameters, passed through to the store adapter untouched
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            busy_timeout_seconds: default_busy_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TailConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_poll_interval")]
    pub error_backoff_ms: u64,

    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            error_backoff_ms: default_poll_interval(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl TailConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

/// Console logging of the process itself
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_table_name() -> String {
    "app_logs".to_string()
}

fn default_level() -> String {
    Severity::Warning.name().to_string()
}

fn default_sweep_probability() -> f64 {
    0.1
}

fn default_database_url() -> String {
    "sqlite:./data/logs.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    30
}

fn default_poll_interval() -> u64 {
    2000
}

fn default_channel_capacity() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

/// Load configuration from an optional TOML file, overridden by
/// `SQL_LOG_SINK__SECTION__KEY` environment variables.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(config::Environment::with_prefix("SQL_LOG_SINK").separator("__"))
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if cfg.sink.level.parse::<Severity>().is_err() {
        anyhow::bail!("Unknown minimum level '{}'", cfg.sink.level);
    }

    if validate_table_name(&cfg.sink.table_name).is_err() {
        anyhow::bail!(
            "Table name '{}' must be a plain SQL identifier",
            cfg.sink.table_name
        );
    }

    if !(0.0..=1.0).contains(&cfg.sink.sweep_probability) {
        anyhow::bail!("sweep_probability must be between 0 and 1");
    }

    if cfg.database.url.is_empty() {
        anyhow::bail!("Database URL cannot be empty");
    }

    if cfg.database.max_connections == 0 {
        anyhow::bail!("max_connections must be greater than 0");
    }

    if cfg.tail.poll_interval_ms == 0 || cfg.tail.error_backoff_ms == 0 {
        anyhow::bail!("Tail intervals must be greater than 0");
    }

    if cfg.tail.channel_capacity == 0 {
        anyhow::bail!("Tail channel capacity must be greater than 0");
    }

    match cfg.logging.format.as_str() {
        "text" | "json" => Ok(()),
        other => anyhow::bail!("Unknown log format '{}'", other),
    }
}
