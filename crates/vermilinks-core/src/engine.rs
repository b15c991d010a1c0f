//! Engine facade.
//!
//! [`TelemetryEngine`] wires a polling controller and, optionally, a realtime
//! bridge to one shared state and exposes the read-only consumer view.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use serde_json::json;
//! use vermilinks_core::{MockSnapshotSource, PollingPolicy, TelemetryEngine};
//!
//! #[tokio::main]
//! async fn main() {
//!     let source = Arc::new(MockSnapshotSource::new());
//!     source.set_response(json!({"deviceId": "bin-1", "temperature": 23.0}));
//!
//!     let engine = TelemetryEngine::start(source, PollingPolicy::builder().immediate(false).build());
//!     engine.refresh().await;
//!     assert_eq!(engine.snapshot().latest.unwrap().temperature, Some(23.0));
//!     engine.shutdown();
//! }
//! ```

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::info;

use crate::bridge::{AlertTrigger, RealtimeBridge};
use crate::poller::{PollOutcome, PollingController};
use crate::policy::PollingPolicy;
use crate::source::SnapshotSource;
use crate::state::{SharedState, SyncSnapshot};
use crate::transport::PushTransport;

/// A running telemetry synchronization engine.
///
/// Dropping the engine shuts it down.
#[derive(Debug)]
pub struct TelemetryEngine {
    state: SharedState,
    poller: PollingController,
    bridge: Option<RealtimeBridge>,
}

impl TelemetryEngine {
    /// Start an engine that only polls.
    pub fn start(source: Arc<dyn SnapshotSource>, policy: PollingPolicy) -> Self {
        let state = SharedState::new();
        let poller = PollingController::start(source, policy, state.clone());
        Self {
            state,
            poller,
            bridge: None,
        }
    }

    /// Start an engine that polls and also listens to a push channel.
    ///
    /// Push events are filtered to the policy's device id, if one is set.
    pub fn with_realtime(
        source: Arc<dyn SnapshotSource>,
        transport: Arc<dyn PushTransport>,
        policy: PollingPolicy,
    ) -> Self {
        let state = SharedState::new();
        let device_filter = policy.device_id().map(String::from);
        let bridge = RealtimeBridge::start(transport, state.clone(), device_filter);
        let poller = PollingController::start(source, policy, state.clone());
        Self {
            state,
            poller,
            bridge: Some(bridge),
        }
    }

    /// Watch state changes.
    pub fn watch(&self) -> watch::Receiver<SyncSnapshot> {
        self.state.subscribe()
    }

    /// Current state.
    pub fn snapshot(&self) -> SyncSnapshot {
        self.state.snapshot()
    }

    /// Force a fetch now, resetting backoff.
    pub async fn refresh(&self) -> PollOutcome {
        self.poller.refresh(true).await
    }

    /// Poll now, serving the cache unless `force` is set.
    pub async fn refresh_with(&self, force: bool) -> PollOutcome {
        self.poller.refresh(force).await
    }

    /// Subscribe to alert triggers. `None` when realtime is not enabled.
    pub fn alerts(&self) -> Option<broadcast::Receiver<AlertTrigger>> {
        self.bridge.as_ref().map(RealtimeBridge::alerts)
    }

    /// Stop polling and push handling; later updates are dropped. Idempotent.
    pub fn shutdown(&self) {
        if self.state.is_alive() {
            info!("Shutting down telemetry engine");
        }
        self.state.close();
        self.poller.unsubscribe();
        if let Some(bridge) = &self.bridge {
            bridge.teardown();
        }
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        !self.state.is_alive()
    }
}

impl Drop for TelemetryEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
