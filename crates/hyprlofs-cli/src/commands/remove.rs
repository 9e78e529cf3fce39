//! Remove command - remove mappings by alias.

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use std::path::PathBuf;
use tracing::instrument;

use super::filesystem;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Directory the filesystem is mounted on
    pub mountpoint: PathBuf,

    /// Aliases to remove
    #[arg(required = true, value_name = "ALIAS")]
    pub aliases: Vec<String>,
}

#[instrument(level = "info", name = "cmd::remove", skip_all, fields(mountpoint = %args.mountpoint.display(), count = args.aliases.len()))]
pub async fn execute(args: Args, debug: bool) -> Result<()> {
    let fs = filesystem(&args.mountpoint, debug);
    let count = args.aliases.len();
    fs.remove_mappings(args.aliases)
        .await
        .with_context(|| format!("failed to remove mappings at {}", args.mountpoint.display()))?;
    eprintln!("Removed {count} mapping(s)");
    Ok(())
}
