mod cli;
mod commands;
mod format;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use commands::{WatchArgs, cmd_config, cmd_snapshot, cmd_watch};
use util::{apply_server_args, load_config};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so JSON output on stdout stays clean
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let output = cli.output.as_ref();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Snapshot { server, format } => {
            let config = apply_server_args(load_config(config_path)?, &server)?;
            cmd_snapshot(&config, format, output).await?;
        }
        Commands::Watch {
            server,
            ws,
            interval,
            count,
        } => {
            let mut config = load_config(config_path)?;
            if let Some(url) = ws {
                config.realtime.enabled = true;
                config.realtime.url = Some(url);
            }
            if let Some(interval) = interval {
                config.polling.interval_ms = interval;
            }
            let config = apply_server_args(config, &server)?;
            cmd_watch(WatchArgs {
                config,
                count,
                output,
            })
            .await?;
        }
        Commands::Config { default, path } => {
            cmd_config(config_path, default, path, output)?;
        }
    }

    Ok(())
}
