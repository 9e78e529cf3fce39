//! Add command - add SOURCE=ALIAS mappings to a mounted filesystem.

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use hyprlofs::Mapping;
use std::path::PathBuf;
use tracing::instrument;

use super::filesystem;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Directory the filesystem is mounted on
    pub mountpoint: PathBuf,

    /// Mappings to add, each as SOURCE=ALIAS
    #[arg(value_parser = parse_mapping, required = true, value_name = "SOURCE=ALIAS")]
    pub mappings: Vec<Mapping>,
}

fn parse_mapping(raw: &str) -> Result<Mapping, String> {
    match raw.split_once('=') {
        Some((source, alias)) if !source.is_empty() && !alias.is_empty() => {
            Ok(Mapping::new(source, alias))
        }
        _ => Err(format!("expected SOURCE=ALIAS, got '{raw}'")),
    }
}

#[instrument(level = "info", name = "cmd::add", skip_all, fields(mountpoint = %args.mountpoint.display(), count = args.mappings.len()))]
pub async fn execute(args: Args, debug: bool) -> Result<()> {
    let fs = filesystem(&args.mountpoint, debug);
    let count = args.mappings.len();
    fs.add_mappings(args.mappings)
        .await
        .with_context(|| format!("failed to add mappings at {}", args.mountpoint.display()))?;
    eprintln!("Added {count} mapping(s)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_source_and_alias() {
        let mapping = parse_mapping("/etc/release=rel").unwrap();
        assert_eq!(mapping, Mapping::new("/etc/release", "rel"));
    }

    #[test]
    fn alias_may_contain_equals() {
        let mapping = parse_mapping("/a=b=c").unwrap();
        assert_eq!(mapping, Mapping::new("/a", "b=c"));
    }

    #[test]
    fn rejects_missing_parts() {
        assert!(parse_mapping("/etc/release").is_err());
        assert!(parse_mapping("=rel").is_err());
        assert!(parse_mapping("/etc/release=").is_err());
    }
}
