//! `worldsync status`: where every world stands and what a pass would do.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use worldsync_sync::status::{world_status, WorldStatus};
use worldsync_sync::DiskFs;

use super::{format_time, Session};

/// Arguments for `worldsync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct StatusJson<'a> {
    instance: &'a str,
    name: String,
    host: &'a str,
    worlds: &'a [WorldStatus],
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "world")]
    world: String,
    #[tabled(rename = "local")]
    local: String,
    #[tabled(rename = "proxy")]
    proxy: String,
    #[tabled(rename = "master")]
    master: String,
    #[tabled(rename = "push")]
    push: String,
    #[tabled(rename = "pull")]
    pull: String,
}

impl StatusArgs {
    pub fn run(self, session: &Session) -> Result<()> {
        let ctx = &session.ctx;
        let rows = world_status(
            ctx,
            session.store.as_ref(),
            &DiskFs,
            &session.settings.root_name,
        )
        .context("status failed")?;

        if self.json {
            let payload = StatusJson {
                instance: ctx.instance.as_str(),
                name: ctx.display_name(),
                host: ctx.host.as_str(),
                worlds: &rows,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        println!(
            "worldsync v{} | {} ({}) | host {} | {} worlds",
            env!("CARGO_PKG_VERSION"),
            ctx.display_name().bold(),
            ctx.instance,
            ctx.host,
            rows.len()
        );
        if rows.is_empty() {
            println!("No worlds locally or in '{}'.", session.settings.root_name);
            return Ok(());
        }

        let table_rows: Vec<StatusRow> = rows
            .into_iter()
            .map(|row| StatusRow {
                world: row.world.to_string(),
                local: format_time(row.local),
                proxy: format_time(row.proxy),
                master: format_time(row.master),
                push: action_cell(row.push),
                pull: action_cell(row.pull),
            })
            .collect();
        let mut table = Table::new(table_rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}

fn action_cell(action: Option<String>) -> String {
    match action {
        Some(a) if a.starts_with("skip") => a.bright_black().to_string(),
        Some(a) => a.yellow().to_string(),
        None => "-".to_string(),
    }
}
