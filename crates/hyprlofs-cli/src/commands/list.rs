//! List command - print the current mapping table.

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use comfy_table::{presets, Table};
use std::path::PathBuf;
use tracing::instrument;

use super::filesystem;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Directory the filesystem is mounted on
    pub mountpoint: PathBuf,

    /// Emit the table as JSON instead of a formatted table
    #[arg(long)]
    pub json: bool,
}

#[instrument(level = "info", name = "cmd::list", skip_all, fields(mountpoint = %args.mountpoint.display()))]
pub async fn execute(args: Args, debug: bool) -> Result<()> {
    let fs = filesystem(&args.mountpoint, debug);
    let mappings = fs
        .list_mappings()
        .await
        .with_context(|| format!("failed to list mappings at {}", args.mountpoint.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&mappings)?);
        return Ok(());
    }

    if mappings.is_empty() {
        eprintln!("No mappings");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_header(vec!["ALIAS", "SOURCE"]);
    for mapping in &mappings {
        table.add_row(vec![&mapping.alias, &mapping.source]);
    }
    println!("{table}");
    Ok(())
}
