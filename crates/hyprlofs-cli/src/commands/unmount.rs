//! Unmount command.

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

#[instrument(level = "info", name = "cmd::unmount", skip_all, fields(mountpoint = %args.mountpoint.display()))]
pub async fn execute(args: Args, debug: bool) -> Result<()> {
    let fs = filesystem(&args.mountpoint, debug);
    fs.unmount()
        .await
        .with_context(|| format!("failed to unmount {}", args.mountpoint.display()))?;
    eprintln!("Unmounted {}", args.mountpoint.display());
    Ok(())
}
