//! Mount command - mount a hyprlofs instance read-only on a directory.

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use std::path::PathBuf;
use tracing::instrument;

use super::filesystem;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Directory to mount the filesystem on
    pub mountpoint: PathBuf,
}

#[instrument(level = "info", name = "cmd::mount", skip_all, fields(mountpoint = %args.mountpoint.display()))]
pub async fn execute(args: Args, debug: bool) -> Result<()> {
    let fs = filesystem(&args.mountpoint, debug);
    fs.mount()
        .await
        .with_context(|| format!("failed to mount {}", args.mountpoint.display()))?;
    eprintln!("Mounted {}", args.mountpoint.display());
    Ok(())
}
