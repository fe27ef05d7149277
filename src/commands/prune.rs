//! Prune command
//!
//! Run a retention sweep immediately instead of waiting for writes to trigger one.

use anyhow::Result;
use colored::Colorize;
use sql_log_sink::config::Config;
use sql_log_sink::sink::Sink;

/// Execute the prune command
pub async fn execute(cfg: &Config) -> Result<()> {
    let sink = Sink::connect(cfg).await?;

    println!("{}", "Running retention sweep...".yellow());

    match sink.sweeper().sweep_now().await? {
        Some(deleted) => {
            println!(
                "{} Deleted {} records older than {} days",
                "✓".green(),
                deleted,
                cfg.sink.days_to_keep.unwrap_or_default()
            );
        }
        None => {
            println!("{}", "Retention is disabled (sink.days_to_keep is not set)".yellow());
        }
    }

    Ok(())
}
