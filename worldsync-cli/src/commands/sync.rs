//! `worldsync push` / `worldsync pull`.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use worldsync_sync::{run_pass, Direction, DiskFs, PassOptions, PassReport, WorldOutcome};

use super::Session;

/// Exit status of a pass in which at least one world failed.
pub const EXIT_WORLD_FAILED: u8 = 2;

/// Arguments shared by `push` and `pull`.
#[derive(Args, Debug)]
pub struct PassArgs {
    /// Report what would happen without touching the store or the saves.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit the report as JSON.
    #[arg(long)]
    pub json: bool,

    /// Worlds processed at once (overrides the configured value).
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub workers: Option<u64>,
}

#[derive(Tabled)]
struct WorldRow {
    #[tabled(rename = "world")]
    world: String,
    #[tabled(rename = "outcome")]
    outcome: String,
    #[tabled(rename = "master")]
    master: String,
}

impl PassArgs {
    pub fn run(self, direction: Direction, session: &Session) -> Result<ExitCode> {
        let mut options = PassOptions::new(direction, session.settings.root_name.clone());
        options.dry_run = self.dry_run;
        options.workers = match self.workers {
            Some(n) => usize::try_from(n).context("--workers is out of range")?,
            None => session.settings.workers,
        };

        let report = run_pass(&session.ctx, session.store.as_ref(), &DiskFs, &options)
            .with_context(|| format!("{direction} failed"))?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize report")?
            );
        } else {
            print_report(&report);
        }

        if report.has_failures() {
            Ok(ExitCode::from(EXIT_WORLD_FAILED))
        } else {
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_report(report: &PassReport) {
    let prefix = if report.dry_run { "[dry-run] " } else { "" };
    println!(
        "{prefix}{} instance {} on {}",
        report.direction.to_string().bold(),
        report.instance,
        report.host
    );

    if report.worlds.is_empty() {
        println!("{prefix}nothing to do");
        return;
    }

    let rows: Vec<WorldRow> = report
        .worlds
        .iter()
        .map(|w| WorldRow {
            world: w.world.to_string(),
            outcome: outcome_cell(&w.outcome),
            master: w.master.map(|m| m.to_string()).unwrap_or_default(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    let summary: Vec<String> = report
        .summary()
        .into_iter()
        .map(|(label, n)| format!("{n} {label}"))
        .collect();
    println!("{prefix}{}", summary.join(", "));
}

fn outcome_cell(outcome: &WorldOutcome) -> String {
    let text = outcome.to_string();
    match outcome {
        WorldOutcome::Failed { .. } => text.red().to_string(),
        WorldOutcome::SkippedRemoteNewer | WorldOutcome::SkippedLocalNewer => {
            text.bright_black().to_string()
        }
        _ => text.green().to_string(),
    }
}
