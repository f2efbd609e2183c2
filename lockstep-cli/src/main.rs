//! Lockstep CLI - Command-line interface
//!
//! Runs a concurrency simulation for a bounded duration with a logging
//! listener attached, then prints the protocol's counters.

mod commands;

use clap::Parser;
use lockstep_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "lockstep")]
#[command(about = "Observable simulations of classic concurrency problems")]
struct Cli {
    /// Console log verbosity
    #[arg(long, value_enum, default_value_t = CliLogLevel::Info)]
    log_level: CliLogLevel,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Err(error) = init_tracing(cli.log_level.as_tracing_level(), None) {
        eprintln!("Failed to initialize tracing: {error}");
    }

    commands::handle_command(cli.command).await
}
