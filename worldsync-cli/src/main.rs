//! worldsync: keep Minecraft worlds in step across machines.
//!
//! # Usage
//!
//! ```text
//! worldsync push   [--dry-run] [--json] [--workers N]
//! worldsync pull   [--dry-run] [--json] [--workers N]
//! worldsync status [--json]
//! ```
//!
//! The instance is taken from the launcher environment (`INST_ID`,
//! `INST_NAME`, `INST_DIR`, `INST_MC_DIR`). Exit status is 1 on a fatal error
//! and 2 when any world failed.

mod commands;
mod logging;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;

use commands::{status::StatusArgs, sync::PassArgs, Session};
use worldsync_core::Settings;
use worldsync_sync::Direction;

#[derive(Parser, Debug)]
#[command(
    name = "worldsync",
    version,
    about = "Sync Minecraft worlds of a launcher instance through a shared store",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload local worlds as this host's proxies and refresh the masters.
    Push(PassArgs),

    /// Bring local worlds up to date with the remote masters.
    Pull(PassArgs),

    /// Show local, proxy and master times and what push or pull would do.
    Status(StatusArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{err:#}");
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let settings = Settings::load().context("failed to load settings")?;
    logging::init(&settings)?;
    let session = Session::open(settings)?;

    match cli.command {
        Commands::Push(args) => args.run(Direction::Push, &session),
        Commands::Pull(args) => args.run(Direction::Pull, &session),
        Commands::Status(args) => {
            args.run(&session)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
