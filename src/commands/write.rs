//! Write command
//!
//! Push a single record through the sink, applying the configured minimum level.

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use serde_json::Value;
use sql_log_sink::config::Config;
use sql_log_sink::sink::{LevelSpec, Sink, WriteOutcome};

/// Write a log record
#[derive(Debug, Clone, Parser)]
pub struct WriteArgs {
    /// Severity name (emerg..debug) or rank (0..7)
    #[arg(short, long, default_value = "error")]
    pub level: String,

    /// Message text
    pub message: String,

    /// Extra field stored with the record (repeatable)
    #[arg(short, long = "meta", value_name = "KEY=VALUE")]
    pub meta: Vec<String>,
}

/// Execute the write command
pub async fn execute(cfg: &Config, args: WriteArgs) -> Result<()> {
    let meta = parse_meta(&args.meta)?;
    let sink = Sink::connect(cfg).await?;

    let level: LevelSpec = args.level.parse()?;
    match sink.write(level, args.message, meta).await? {
        WriteOutcome::Dropped => {
            println!(
                "{}",
                format!(
                    "Dropped: below minimum level '{}'",
                    sink.minimum_level()
                )
                .yellow()
            );
        }
        WriteOutcome::Persisted { id: Some(id) } => {
            println!("{} id={}", "✓ Written".green(), id);
        }
        WriteOutcome::Persisted { id: None } => {
            println!("{}", "✓ Written".green());
        }
    }

    Ok(())
}

/// Parse `key=value` pairs; values that parse as JSON keep their type
fn parse_meta(pairs: &[String]) -> Result<serde_json::Map<String, Value>> {
    let mut meta = serde_json::Map::new();

    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("Invalid meta '{}', expected KEY=VALUE", pair))?;

        if key.is_empty() {
            anyhow::bail!("Meta key cannot be empty in '{}'", pair);
        }

        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        meta.insert(key.to_string(), value);
    }

    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_args_parsing() {
        let args = WriteArgs::parse_from(["write", "-l", "warning", "-m", "user=alice", "hello"]);
        assert_eq!(args.level, "warning");
        assert_eq!(args.message, "hello");
        assert_eq!(args.meta, vec!["user=alice".to_string()]);
    }

    #[test]
    fn test_parse_meta() {
        let meta = parse_meta(&["user=alice".to_string(), "attempt=3".to_string()]).unwrap();
        assert_eq!(meta["user"], "alice");
        assert_eq!(meta["attempt"], 3);

        assert!(parse_meta(&["novalue".to_string()]).is_err());
        assert!(parse_meta(&["=x".to_string()]).is_err());
    }
}
