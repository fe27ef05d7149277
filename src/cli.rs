use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sql-log-sink", version, about = "Durable, queryable SQL log sink")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "sql-log-sink.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Write a single record through the sink
    Write(crate::commands::write::WriteArgs),

    /// Query stored records
    Query(crate::commands::query::QueryArgs),

    /// Follow newly written records
    Tail(crate::commands::tail::TailArgs),

    /// Delete records older than the retention window now
    Prune,

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Display current configuration (with credentials masked)
    Show,

    /// Validate configuration file
    Validate,
}
