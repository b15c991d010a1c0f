//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "vermilinks")]
#[command(author, version, about = "Telemetry client for VermiLinks vermicompost monitors", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file (defaults to the platform config dir)
    #[arg(short, long, global = true, env = "VERMILINKS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Write output to file instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Overrides for the configured backend and device
#[derive(Debug, Clone, Default, Args)]
pub struct ServerArgs {
    /// Backend base URL (overrides server.base_url)
    #[arg(short, long, env = "VERMILINKS_URL")]
    pub url: Option<String>,

    /// Device id (overrides polling.device_id)
    #[arg(short, long, env = "VERMILINKS_DEVICE")]
    pub device: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Fetch the latest snapshot once
    Snapshot {
        #[command(flatten)]
        server: ServerArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Run the engine and print every state change as a JSON line
    Watch {
        #[command(flatten)]
        server: ServerArgs,

        /// Push channel URL (enables realtime, overrides realtime.url)
        #[arg(short = 'w', long)]
        ws: Option<String>,

        /// Poll interval in milliseconds (overrides polling.interval_ms)
        #[arg(short, long)]
        interval: Option<u64>,

        /// Stop after this many updates (0 = run until Ctrl+C)
        #[arg(short = 'n', long, default_value = "0")]
        count: u32,
    },

    /// Show the effective configuration
    Config {
        /// Print built-in defaults instead of the loaded file
        #[arg(long)]
        default: bool,

        /// Print the configuration file path and exit
        #[arg(long, conflicts_with = "default")]
        path: bool,
    },
}
