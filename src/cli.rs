//! Command-line interface for roombridge

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Audio bridge between a meeting client and a speech pipeline
#[derive(Parser, Debug)]
#[command(name = "roombridge", version, about = "Meeting audio bridge for speech pipelines")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Verbose output (-v: info, -vv: debug, -vvv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inspect the effective configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Run the bridge against simulated participants and echo their audio back
    Loopback {
        /// Number of simulated remote participants
        #[arg(long, short = 'p', default_value = "1")]
        participants: usize,

        /// How long each participant talks. Examples: 500ms, 2s, 1m
        #[arg(long, short = 'd', value_name = "DURATION", default_value = "2s", value_parser = parse_duration)]
        duration: std::time::Duration,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print the configuration as TOML (auth token redacted)
    Show,
    /// Print the default configuration file path
    Path,
}

fn parse_duration(s: &str) -> Result<std::time::Duration, String> {
    crate::config::parse_duration_ms(s).map(std::time::Duration::from_millis)
}
