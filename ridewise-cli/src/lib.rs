//! Command-line interface for replaying vehicle position feeds.
//!
//! The `replay` subcommand streams a newline-delimited JSON feed through
//! the engine's position store and prints the vehicles within a radius of
//! a query point, nearest first.
#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};

mod error;
mod replay;

pub use error::CliError;

use replay::{ReplayArgs, run_replay};

const ARG_FEED: &str = "feed";
const ARG_LAT: &str = "lat";
const ARG_LNG: &str = "lng";
const ARG_RADIUS_KM: &str = "radius-km";
const ARG_STALE_AFTER_MS: &str = "stale-after-ms";
const ARG_UTC_OFFSET_MINUTES: &str = "utc-offset-minutes";
const ENV_FEED: &str = "RIDEWISE_CMDS_REPLAY_FEED";
const ENV_LAT: &str = "RIDEWISE_CMDS_REPLAY_LAT";
const ENV_LNG: &str = "RIDEWISE_CMDS_REPLAY_LNG";

/// Run the CLI with the current process arguments and environment.
///
/// # Errors
///
/// Returns [`CliError`] when arguments are rejected, configuration cannot
/// be merged, or the replay fails.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    init_logging(cli.verbose);
    match cli.command {
        Command::Replay(args) => run_replay(args, &mut std::io::stdout().lock()),
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    // A logger installed by the embedding process takes precedence.
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .try_init();
}

#[derive(Debug, Parser)]
#[command(
    name = "ridewise",
    about = "Operator utilities for the ridewise transit engine",
    version
)]
struct Cli {
    /// Log engine activity at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replay a position feed and list vehicles near a point.
    Replay(ReplayArgs),
}

#[cfg(test)]
mod tests;
