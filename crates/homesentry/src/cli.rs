// ── CLI definition ──

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "homesentry", version, about = "Home network sentry daemon")]
pub struct Cli {
    /// Path to the config file (defaults to the platform config dir).
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the engine (the default when no subcommand is given).
    Run,

    /// Load and validate the configuration, then exit.
    CheckConfig,
}
