//! Sluice - multi-protocol JSON ingestion daemon
//!
//! # Usage
//!
//! ```bash
//! # Run the server (default)
//! sluice
//! sluice --config /etc/sluice/sluice.toml
//!
//! # Validate a configuration and exit
//! sluice check --config /etc/sluice/sluice.toml
//! ```

mod cmd;
mod logging;
mod reporter;
mod wiring;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sluice_config::Config;

/// Sluice - multi-protocol JSON ingestion daemon
#[derive(Parser, Debug)]
#[command(name = "sluice")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file
    #[arg(short, long, default_value = "sluice.toml", global = true)]
    config: PathBuf,

    /// Log level, overrides `[log] level` (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the ingestion server
    Serve,

    /// Load and validate the configuration, then exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let config = load_config(&cli.config)?;
            logging::init(&config.log, cli.log_level.as_deref())?;
            cmd::serve::run(cli.config, config).await
        }
        Command::Check => cmd::check::run(&cli.config),
    }
}

/// Load the configuration file, which must exist
fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        anyhow::bail!("config file not found: {}", path.display());
    }
    Config::from_file(path).with_context(|| format!("failed to load {}", path.display()))
}
