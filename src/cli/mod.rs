//! CLI Module
//!
//! Command-line interface for the Nueva bridge.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::BridgeConfig;

/// Nueva AI Bridge - fronts the ACE-Step neural engine for Nueva
#[derive(Parser, Debug)]
#[command(name = "nueva-bridge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging (overrides NUEVA_LOG_LEVEL)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log filter, e.g. "info" or "nueva_bridge=debug"
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Base URL of the ACE-Step API
    #[arg(long, global = true)]
    pub upstream_url: Option<String>,

    /// Never launch ACE-Step; only use an engine that is already running
    #[arg(long, global = true)]
    pub no_auto_start: bool,

    /// ACE-Step installation directory
    #[arg(long, global = true)]
    pub ace_step_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP bridge (default)
    #[command(name = "serve")]
    Serve {
        /// Address to listen on
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Speak the line protocol on stdin/stdout
    #[command(name = "stdio")]
    Stdio,

    /// Probe the engine once and report whether it is up
    #[command(name = "check")]
    Check,
}

impl Cli {
    /// Layer command-line flags over environment configuration.
    pub fn apply_to(&self, config: &mut BridgeConfig) {
        if let Some(url) = &self.upstream_url {
            config.upstream_url = url.trim_end_matches('/').to_string();
        }
        if self.no_auto_start {
            config.auto_start = false;
        }
        if let Some(path) = &self.ace_step_path {
            config.ace_step_path = path.clone();
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if self.verbose {
            config.log_level = "debug".to_string();
        }
        if let Some(Commands::Serve { host, port }) = &self.command {
            if let Some(host) = host {
                config.host = host.clone();
            }
            if let Some(port) = port {
                config.port = *port;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_serve() {
        let cli = Cli::try_parse_from(["nueva-bridge"]).unwrap();
        assert!(cli.command.is_none());

        let mut config = BridgeConfig::default();
        cli.apply_to(&mut config);
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::try_parse_from([
            "nueva-bridge",
            "--upstream-url",
            "http://gpu:8000/",
            "--no-auto-start",
            "-v",
            "serve",
            "--port",
            "9001",
        ])
        .unwrap();

        let mut config = BridgeConfig::default();
        cli.apply_to(&mut config);
        assert_eq!(config.upstream_url, "http://gpu:8000");
        assert!(!config.auto_start);
        assert_eq!(config.port, 9001);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["nueva-bridge", "stdio", "--no-auto-start"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Stdio)));
        assert!(cli.no_auto_start);
    }
}
