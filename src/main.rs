use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use sql_log_sink::{config, init_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = cli::Cli::parse();

    let cfg = config::load_config(&args.config)?;
    init_tracing(&cfg.logging);

    // Dispatch to appropriate command handler
    match args.command {
        cli::Commands::Write(write_args) => commands::write::execute(&cfg, write_args).await?,
        cli::Commands::Query(query_args) => commands::query::execute(&cfg, query_args).await?,
        cli::Commands::Tail(tail_args) => commands::tail::execute(&cfg, tail_args).await?,
        cli::Commands::Prune => commands::prune::execute(&cfg).await?,
        cli::Commands::Config { action } => match action {
            cli::ConfigCommands::Show => commands::config::show(&cfg)?,
            cli::ConfigCommands::Validate => commands::config::validate(&args.config)?,
        },
        cli::Commands::Version => {
            println!("sql-log-sink v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
