//! Host binary for micromod plugin modules.
//!
//! Usage:
//! ```bash
//! micromod run ./modules                      # Load, list and unload a directory
//! micromod run ./modules --unload example     # Unload one module before the rest
//! micromod run --reload ./modules/a.so        # Reload a module file after the bulk load
//! micromod inspect ./modules/a.so             # Print a module's name without calling init
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

#[derive(Debug, Parser)]
#[command(name = "micromod", author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load every module in a directory, list them, then unload them
    Run(commands::run::RunArgs),

    /// Check that a file exports the module contract
    Inspect(commands::inspect::InspectArgs),
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Run(_) => f.debug_tuple("Run").finish(),
            Self::Inspect(_) => f.debug_tuple("Inspect").finish(),
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("info".parse().context("failed to parse log directive")?),
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Command::Run(args) => commands::run::run(args),
        Command::Inspect(args) => commands::inspect::run(args),
    }
}
