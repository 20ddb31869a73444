use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Next-day price prediction pipeline: collect history, derive features,
/// rank model output, persist and notify.
#[derive(Debug, Parser)]
#[command(name = "prophet", version, about = "Stock price prediction pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Execute one collection and prediction run.
    Run(RunArgs),
    /// Print a snapshot of host memory and CPU pressure.
    Resources,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to the JSON run configuration.
    #[arg(long)]
    pub config: PathBuf,

    /// Override the database path from the config.
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Override the model artifact path from the config.
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// Use deterministic offline transports instead of the network.
    #[arg(long, default_value_t = false)]
    pub offline: bool,
}
