//! Clear command - drop every mapping from the table.

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use std::path::PathBuf;
use tracing::instrument;

use super::filesystem;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Directory the filesystem is mounted on
    pub mountpoint: PathBuf,
}

#[instrument(level = "info", name = "cmd::clear", skip_all, fields(mountpoint = %args.mountpoint.display()))]
pub async fn execute(args: Args, debug: bool) -> Result<()> {
    let fs = filesystem(&args.mountpoint, debug);
    fs.remove_all()
        .await
        .with_context(|| format!("failed to clear mappings at {}", args.mountpoint.display()))?;
    eprintln!("Cleared mapping table");
    Ok(())
}
