//! Snapshot command implementation.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use vermilinks_core::{EngineConfig, SnapshotClient};
use vermilinks_types::{UNKNOWN_DEVICE, is_live, normalize_value};

use crate::cli::OutputFormat;
use crate::format::{format_reading_text, format_snapshot_json};
use crate::util::write_output;

pub async fn cmd_snapshot(
    config: &EngineConfig,
    format: OutputFormat,
    output: Option<&PathBuf>,
) -> Result<()> {
    let timeout = Duration::from_millis(config.polling.fetch_timeout_ms);
    let client = SnapshotClient::with_timeout(&config.server.base_url, timeout)?;
    let device_id = config.polling.device_id.as_deref();

    let raw = client
        .latest(device_id)
        .await
        .with_context(|| format!("Failed to fetch {}", client.latest_url()))?;

    let reading = normalize_value(&raw).map(|mut reading| {
        if reading.device_id == UNKNOWN_DEVICE
            && let Some(id) = device_id
        {
            reading.device_id = id.to_string();
        }
        reading
    });
    let live = reading.as_ref().is_some_and(is_live);

    let content = match (format, &reading) {
        (OutputFormat::Json, _) => format_snapshot_json(reading.as_ref(), live)?,
        (OutputFormat::Text, Some(reading)) => format_reading_text(reading, live),
        (OutputFormat::Text, None) => "No current reading.\n".to_string(),
    };
    write_output(output, &content)
}
