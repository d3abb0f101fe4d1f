//! Harvester CLI: periodic fetch, transform, and dispatch of web data.
//!
//! Jobs are declared in a TOML config file; each one fetches an input on a
//! cron schedule, reshapes it through a transform chain, and writes the
//! result to one or more destinations.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
