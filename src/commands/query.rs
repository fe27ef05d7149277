//! Query command
//!
//! Query and display stored log records.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use colored::Colorize;
use serde_json::Value;
use sql_log_sink::config::Config;
use sql_log_sink::sink::{QueryOptions, Row, Sink, SortDirection};

/// Query stored records
#[derive(Debug, Clone, Parser)]
pub struct QueryArgs {
    /// Start of the time range, RFC 3339 (needs --until)
    #[arg(long)]
    pub from: Option<String>,

    /// End of the time range, RFC 3339 (needs --from)
    #[arg(long)]
    pub until: Option<String>,

    /// Maximum number of results
    #[arg(short, long)]
    pub rows: Option<usize>,

    /// Sort by timestamp: asc or desc
    #[arg(short, long)]
    pub order: Option<String>,

    /// Comma-separated projection (id,level,message,timestamp,meta)
    #[arg(long, value_delimiter = ',')]
    pub fields: Vec<String>,

    /// Only records with this severity
    #[arg(short, long)]
    pub level: Option<String>,

    /// Output format (text, json)
    #[arg(short = 'f', long, default_value = "text")]
    pub format: String,
}

impl QueryArgs {
    fn to_options(&self) -> Result<QueryOptions> {
        if self.from.is_some() != self.until.is_some() {
            eprintln!(
                "{}",
                "Note: --from and --until only apply together; no time range used".yellow()
            );
        }

        Ok(QueryOptions {
            from: self.from.as_deref().map(parse_time).transpose()?,
            until: self.until.as_deref().map(parse_time).transpose()?,
            rows: self.rows,
            order: self
                .order
                .as_deref()
                .map(str::parse::<SortDirection>)
                .transpose()
                .map_err(anyhow::Error::msg)?,
            order_by: Default::default(),
            fields: self.fields.clone(),
            level: self.level.clone(),
        })
    }
}

fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("Invalid RFC 3339 time '{}'", value))
}

/// Execute the query command
pub async fn execute(cfg: &Config, args: QueryArgs) -> Result<()> {
    let options = args.to_options()?;
    let sink = Sink::connect(cfg).await?;

    let rows = sink.query(&options).await?;

    if rows.is_empty() {
        println!("{}", "No records found matching the criteria".yellow());
        return Ok(());
    }

    match args.format.as_str() {
        "json" => {
            let json = serde_json::to_string_pretty(&rows)?;
            println!("{}", json);
        }
        _ => {
            println!("{}", format!("Found {} records", rows.len()).bold());
            println!();
            for row in &rows {
                print_row(row);
            }
        }
    }

    Ok(())
}

/// Print one row in human-friendly text format; absent columns are skipped
pub fn print_row(row: &Row) {
    let mut parts = Vec::new();

    if let Some(id) = row.get("id").and_then(Value::as_i64) {
        parts.push(format!("#{}", id).dimmed().to_string());
    }

    if let Some(timestamp) = row.get("timestamp").and_then(Value::as_str) {
        parts.push(timestamp.dimmed().to_string());
    }

    if let Some(level) = row.get("level").and_then(Value::as_str) {
        let colored = match level {
            "emerg" | "alert" | "crit" => level.red().bold(),
            "error" => level.red(),
            "warning" => level.yellow().bold(),
            "notice" => level.cyan(),
            "info" => level.green(),
            "debug" => level.blue(),
            _ => level.normal(),
        };
        parts.push(colored.to_string());
    }

    if let Some(message) = row.get("message").and_then(Value::as_str) {
        parts.push(message.to_string());
    }

    println!("{}", parts.join(" "));

    // Show meta if not empty
    if let Some(meta) = row.get("meta").and_then(Value::as_object) {
        if !meta.is_empty() {
            println!("  {}", format!("meta: {}", Value::Object(meta.clone())).dimmed());
        }
    }
}
