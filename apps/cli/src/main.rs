//! reportforge CLI: run market-research report pipelines locally.
//!
//! Drives the report pipeline against a subprocess collaborator bridge and
//! keeps a step journal of every run in a local libSQL database.

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
