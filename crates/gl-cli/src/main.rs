//! Greenlight operator CLI entrypoint.
//!
//! - `greenlight config` - Print the effective configuration
//! - `greenlight simulate` - Drive the admission gate from concurrent clients
//! - `greenlight contend` - Race optimistic updates against one record

#![forbid(unsafe_code)]

mod config;
mod contend;
mod simulate;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::config::{ConfigArgs, ServiceConfig};

/// Greenlight catalog service operator CLI.
#[derive(Parser)]
#[command(name = "greenlight")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration as JSON.
    ///
    /// Shows defaults merged with the config file and command-line flags.
    Config,

    /// Simulate client traffic through the admission gate.
    ///
    /// Each client sends its requests in sequence while all clients run
    /// concurrently. Reports how many were admitted and which tier rejected
    /// the rest.
    Simulate(simulate::SimulateArgs),

    /// Race concurrent updates against one movie record.
    ///
    /// Every writer appends its own genre through the optimistic update
    /// coordinator. Reports successes, conflicts and the final record.
    Contend(contend::ContendArgs),
}

/// Output format for command reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Json,
    Human,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ServiceConfig::load(&cli.config).context("failed to load configuration")?;

    // Logs go to stderr so stdout is clean for JSON output.
    gl_telemetry::init_telemetry(&config.telemetry).context("failed to initialize telemetry")?;

    match cli.command {
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Simulate(args) => simulate::run(&config, args).await,
        Commands::Contend(args) => contend::run(&config, args).await,
    }
}
