//! Shared helpers for commands.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use vermilinks_core::EngineConfig;

use crate::cli::ServerArgs;

/// Write output to a file or stdout.
pub fn write_output(output: Option<&PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }
        None => {
            print!("{}", content);
            io::stdout().flush()?;
        }
    }
    Ok(())
}

/// Append output to a file or write it to stdout.
pub fn append_output(output: Option<&PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            file.write_all(content.as_bytes())
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }
        None => {
            print!("{}", content);
            io::stdout().flush()?;
        }
    }
    Ok(())
}

/// Load configuration from `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => {
            debug!("Loading config from {}", path.display());
            EngineConfig::load(path)?
        }
        None => EngineConfig::load_default()?,
    };
    Ok(config)
}

/// Apply command-line overrides and validate.
pub fn apply_server_args(mut config: EngineConfig, args: &ServerArgs) -> Result<EngineConfig> {
    if let Some(url) = &args.url {
        config.server.base_url = url.clone();
    }
    if let Some(device) = &args.device {
        config.polling.device_id = Some(device.clone());
    }
    config.validate()?;
    Ok(config)
}
