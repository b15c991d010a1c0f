//! Watch command implementation.
//!
//! Runs the full engine (polling, plus the push channel when configured) and
//! prints every state change as one JSON line until Ctrl+C or `--count`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use vermilinks_core::{EngineConfig, SnapshotClient, TelemetryEngine, WsTransport};

use crate::format::format_state_line;
use crate::util::append_output;

/// Arguments for the watch command.
pub struct WatchArgs<'a> {
    pub config: EngineConfig,
    pub count: u32,
    pub output: Option<&'a PathBuf>,
}

pub async fn cmd_watch(args: WatchArgs<'_>) -> Result<()> {
    let WatchArgs {
        config,
        count,
        output,
    } = args;

    let policy = config.polling_policy();
    let client = Arc::new(SnapshotClient::with_timeout(
        &config.server.base_url,
        policy.fetch_timeout(),
    )?);

    let engine = match (&config.realtime.url, config.realtime.enabled) {
        (Some(url), true) => {
            info!("Listening for push events on {}", url);
            let transport = Arc::new(WsTransport::connect(
                url,
                config.realtime.reconnect_delay(),
            )?);
            TelemetryEngine::with_realtime(client, transport, policy)
        }
        _ => TelemetryEngine::start(client, policy),
    };

    let mut updates = engine.watch();
    let mut printed: u32 = 0;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nShutting down...");
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let line = format_state_line(&updates.borrow_and_update())?;
                append_output(output, &line)?;
                printed += 1;
                if count > 0 && printed >= count {
                    break;
                }
            }
        }
    }

    engine.shutdown();
    Ok(())
}
