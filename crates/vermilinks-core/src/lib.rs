//! Telemetry synchronization engine for VermiLinks vermicompost monitors.
//!
//! This crate keeps one consistent, bounded view of a bin's sensor state from
//! two producers that can disagree:
//!
//! - a **polling controller** that fetches the latest REST snapshot with a
//!   short-lived cache and exponential backoff on failure
//! - a **realtime bridge** that applies push events (`telemetry:update`,
//!   `device:status`, `alert:trigger`) as they arrive
//!
//! Both write into a [`SharedState`] that consumers observe through a
//! `tokio::sync::watch` channel. Readings are normalized, judged for
//! liveness and merged into history by [`vermilinks_types`].
//!
//! # Features
//!
//! | Feature | Default | Provides |
//! |---------|---------|----------|
//! | `http` | yes | [`client::SnapshotClient`] over `reqwest` |
//! | `websocket` | no | [`ws::WsTransport`] over `tokio-tungstenite` |
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use vermilinks_core::{PollingPolicy, TelemetryEngine, client::SnapshotClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Arc::new(SnapshotClient::new("http://localhost:5000")?);
//!     let policy = PollingPolicy::builder().device_id("vermilinks-esp32-a").build();
//!     let engine = TelemetryEngine::start(client, policy);
//!
//!     let mut updates = engine.watch();
//!     while updates.changed().await.is_ok() {
//!         let state = updates.borrow_and_update().clone();
//!         println!("connected={} latest={:?}", state.connected, state.latest);
//!     }
//!     Ok(())
//! }
//! ```

pub mod bridge;
#[cfg(feature = "http")]
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod mock;
pub mod policy;
pub mod poller;
pub mod source;
pub mod state;
pub mod transport;
#[cfg(feature = "websocket")]
pub mod ws;

// Core exports
pub use bridge::{AlertTrigger, PushEvent, RealtimeBridge};
pub use config::{ConfigError, EngineConfig, ValidationError, default_config_path};
pub use engine::TelemetryEngine;
pub use error::{Error, Result};
pub use mock::MockSnapshotSource;
pub use policy::{Backoff, PollingPolicy, PollingPolicyBuilder};
pub use poller::{PollOutcome, PollingController};
pub use source::SnapshotSource;
pub use state::{PollStatus, SharedState, SyncSnapshot};
pub use transport::{ChannelEvent, LocalChannel, PushTransport};

#[cfg(feature = "http")]
pub use client::SnapshotClient;
#[cfg(feature = "websocket")]
pub use ws::WsTransport;

// Re-export from vermilinks-types
pub use vermilinks_types::{HISTORY_LIMIT, Reading, ReadingTime, is_live};
