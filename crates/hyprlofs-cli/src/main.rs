//! `hyprlofs` - manage hyprlofs mounts and their mapping tables.

#![deny(unsafe_code)]

mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::{add, clear, list, mount, remove, unmount};

/// Command-line interface for hyprlofs mapping tables
#[derive(Parser)]
#[command(name = "hyprlofs")]
#[command(author, version)]
#[command(propagate_version = true)]
#[command(after_help = "EXAMPLES:
    # Mount a hyprlofs instance and expose one file under it
    hyprlofs mount /zones/app/root/lofs
    hyprlofs add /zones/app/root/lofs /etc/release=rel

    # Inspect and prune the mapping table
    hyprlofs list /zones/app/root/lofs
    hyprlofs remove /zones/app/root/lofs rel

    # Tear everything down
    hyprlofs clear /zones/app/root/lofs
    hyprlofs unmount /zones/app/root/lofs
")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Trace every kernel call, including per-entry batch dumps
    #[arg(
        long,
        global = true,
        env = "HYPRLOFS_DEBUG",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount a hyprlofs filesystem
    Mount(mount::Args),

    /// Unmount a hyprlofs filesystem
    Unmount(unmount::Args),

    /// Add mappings to a mounted filesystem
    Add(add::Args),

    /// Remove mappings by alias
    Remove(remove::Args),

    /// Remove every mapping
    Clear(clear::Args),

    /// List the current mapping table
    List(list::Args),
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let debug = cli.debug;
    let result = match cli.command {
        Commands::Mount(args) => mount::execute(args, debug).await,
        Commands::Unmount(args) => unmount::execute(args, debug).await,
        Commands::Add(args) => add::execute(args, debug).await,
        Commands::Remove(args) => remove::execute(args, debug).await,
        Commands::Clear(args) => clear::execute(args, debug).await,
        Commands::List(args) => list::execute(args, debug).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("hyprlofs: {err:#}");
            ExitCode::FAILURE
        }
    }
}
