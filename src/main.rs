//! Nueva AI Bridge
//!
//! Command-line entry point.

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use nueva_bridge::cli::{commands, Cli, Commands};
use nueva_bridge::config::BridgeConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = BridgeConfig::from_env();
    cli.apply_to(&mut config);

    // stdout belongs to the line protocol.
    let filter = if cli.verbose || cli.log_level.is_some() {
        EnvFilter::try_new(&config.log_level)
    } else {
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_level))
    }
    .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
    }) {
        Commands::Serve { .. } => commands::serve(&config)
            .await
            .context("HTTP bridge failed")?,
        Commands::Stdio => commands::stdio(&config)
            .await
            .context("line protocol bridge failed")?,
        Commands::Check => {
            if !commands::check(&config).await? {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}
