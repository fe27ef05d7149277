//! Tail command
//!
//! Follow newly written records until Ctrl+C.

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use serde_json::Value;
use sql_log_sink::config::Config;
use sql_log_sink::sink::{Sink, TailEvent, TailOptions, TailStart};

/// Follow newly written records (tail -f mode)
#[derive(Debug, Clone, Parser)]
pub struct TailArgs {
    /// Where to start: now, beginning, or a record id
    #[arg(short, long, default_value = "now")]
    pub start: String,

    /// Output format (text, json)
    #[arg(short = 'f', long, default_value = "text")]
    pub format: String,
}

/// Execute the tail command
pub async fn execute(cfg: &Config, args: TailArgs) -> Result<()> {
    let start: TailStart = args.start.parse().map_err(anyhow::Error::msg)?;
    let sink = Sink::connect(cfg).await?;

    println!("{}", "Following logs (Ctrl+C to stop)...".bold());
    println!();

    let mut tail = sink.tail(TailOptions::from_sink(&sink).start(start));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = tail.next() => match event {
                Some(TailEvent::Record(record)) => {
                    if args.format == "json" {
                        println!("{}", serde_json::to_string(&record)?);
                    } else if let Value::Object(row) = serde_json::to_value(&record)? {
                        super::query::print_row(&row);
                    }
                }
                Some(TailEvent::Error(e)) => {
                    eprintln!("{} {}", "Poll failed, retrying:".red(), e);
                }
                None => break,
            }
        }
    }

    tail.cancel();
    sink.shutdown();
    Ok(())
}
