//! Config command implementation.

use std::path::{Path, PathBuf};

use anyhow::Result;
use vermilinks_core::{EngineConfig, default_config_path};

use crate::util::{load_config, write_output};

pub fn cmd_config(
    config_path: Option<&Path>,
    default: bool,
    path: bool,
    output: Option<&PathBuf>,
) -> Result<()> {
    if path {
        let path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(default_config_path);
        return write_output(output, &format!("{}\n", path.display()));
    }

    let config = if default {
        EngineConfig::default()
    } else {
        let config = load_config(config_path)?;
        config.validate()?;
        config
    };
    write_output(output, &config.to_toml()?)
}
