//! Realtime event bridge.
//!
//! [`RealtimeBridge`] consumes events from a [`PushTransport`] and folds them
//! into the shared state alongside the polling controller:
//!
//! | Event | Effect |
//! |-------|--------|
//! | `telemetry:update`, `sensor_update`, `sensor:update` | live readings become `latest` and join history |
//! | `device:status`, `device_status` | `connected` only |
//! | `alert:trigger` | fan-out to [`RealtimeBridge::alerts`] subscribers |
//! | channel connect / disconnect | `transport_up` only, plus `room:join` on connect |
//!
//! Events for other devices are dropped silently when a device filter is set.

use std::sync::Arc;

use serde_json::{Value, json};
use time::OffsetDateTime;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vermilinks_types::{Reading, is_live, merge, normalize_value};

use crate::state::SharedState;
use crate::transport::{ChannelEvent, PushTransport};

/// Outbound event requesting per-device delivery.
pub const ROOM_JOIN_EVENT: &str = "room:join";

/// Capacity of the alert fan-out channel.
const ALERT_CHANNEL_CAPACITY: usize = 16;

/// Signal that the server raised an alert. Subscribers re-fetch alerts
/// themselves; no payload is carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertTrigger;

/// A decoded push event.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// A telemetry sample.
    Telemetry(Value),
    /// A device connectivity change.
    DeviceStatus(Value),
    /// An alert was raised.
    AlertTrigger,
    /// Anything else.
    Unknown(String),
}

impl PushEvent {
    /// Classify a named channel message.
    pub fn from_message(name: &str, payload: Value) -> Self {
        match name {
            "telemetry:update" | "sensor_update" | "sensor:update" => Self::Telemetry(payload),
            "device:status" | "device_status" => Self::DeviceStatus(payload),
            "alert:trigger" => Self::AlertTrigger,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Room name for a device.
pub fn device_room(device_id: &str) -> String {
    format!("device:{device_id}")
}

/// Background task that applies push events to shared state.
///
/// Dropping the bridge stops the task.
#[derive(Debug)]
pub struct RealtimeBridge {
    alerts: broadcast::Sender<AlertTrigger>,
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

impl RealtimeBridge {
    /// Start bridging `transport` into `state`.
    ///
    /// The transport subscription is taken before this returns, so no event
    /// published afterwards is missed. Must be called from within a Tokio
    /// runtime.
    pub fn start(
        transport: Arc<dyn PushTransport>,
        state: SharedState,
        device_filter: Option<String>,
    ) -> Self {
        let (alerts, _) = broadcast::channel(ALERT_CHANNEL_CAPACITY);
        let cancel_token = CancellationToken::new();
        let events = transport.subscribe();

        let handler = EventHandler {
            transport,
            state,
            device_filter: device_filter.filter(|id| !id.trim().is_empty()),
            alerts: alerts.clone(),
        };
        if handler.transport.is_connected() {
            handler.handle(ChannelEvent::Connected);
        }

        let handle = tokio::spawn(handler.run(events, cancel_token.clone()));

        Self {
            alerts,
            cancel_token,
            handle,
        }
    }

    /// Subscribe to alert triggers.
    pub fn alerts(&self) -> broadcast::Receiver<AlertTrigger> {
        self.alerts.subscribe()
    }

    /// Stop consuming events. Idempotent.
    pub fn teardown(&self) {
        self.cancel_token.cancel();
    }

    /// Whether the bridge task is still running.
    pub fn is_running(&self) -> bool {
        !self.cancel_token.is_cancelled() && !self.handle.is_finished()
    }
}

impl Drop for RealtimeBridge {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

struct EventHandler {
    transport: Arc<dyn PushTransport>,
    state: SharedState,
    device_filter: Option<String>,
    alerts: broadcast::Sender<AlertTrigger>,
}

impl EventHandler {
    async fn run(
        self,
        mut events: broadcast::Receiver<ChannelEvent>,
        cancel_token: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel_token.cancelled() => break,
                event = events.recv() => event,
            };

            match event {
                Ok(event) => self.handle(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Realtime bridge lagged, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => {
                    debug!("Push channel closed");
                    break;
                }
            }
        }
        debug!("Realtime bridge stopped");
    }

    fn handle(&self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => {
                info!("Push channel connected");
                self.state.update(|s| s.transport_up = true);
                self.join_room();
            }
            ChannelEvent::Disconnected => {
                info!("Push channel disconnected");
                self.state.update(|s| s.transport_up = false);
            }
            ChannelEvent::Message { name, payload } => {
                match PushEvent::from_message(&name, payload) {
                    PushEvent::Telemetry(payload) => self.on_telemetry(&payload),
                    PushEvent::DeviceStatus(payload) => self.on_device_status(&payload),
                    PushEvent::AlertTrigger => {
                        debug!("Alert triggered");
                        let _ = self.alerts.send(AlertTrigger);
                    }
                    PushEvent::Unknown(name) => debug!("Ignoring push event '{}'", name),
                }
            }
        }
    }

    fn join_room(&self) {
        let Some(device_id) = &self.device_filter else {
            return;
        };
        let room = device_room(device_id);
        match self
            .transport
            .emit(ROOM_JOIN_EVENT, json!({ "room": room }))
        {
            Ok(()) => debug!("Joined room {}", room),
            Err(e) => warn!("Failed to join room {}: {}", room, e),
        }
    }

    /// Normalize and filter a payload; `None` when it is empty or for another device.
    fn accept(&self, payload: &Value) -> Option<Reading> {
        let reading = normalize_value(payload)?;
        match &self.device_filter {
            Some(filter) if *filter != reading.device_id => {
                debug!(
                    "Dropping event for {} (filter: {})",
                    reading.device_id, filter
                );
                None
            }
            _ => Some(reading),
        }
    }

    fn on_telemetry(&self, payload: &Value) {
        let Some(reading) = self.accept(payload) else {
            return;
        };

        if !is_live(&reading) {
            debug!("Telemetry from {} is not live", reading.device_id);
            self.state.update(|s| s.connected = false);
            return;
        }

        let now = OffsetDateTime::now_utc();
        self.state.update(|s| {
            let merged = merge(&s.history, std::slice::from_ref(&reading));
            s.set_history(merged);
            s.latest = Some(reading.clone());
            s.connected = true;
            s.last_updated = Some(now);
        });
    }

    fn on_device_status(&self, payload: &Value) {
        let Some(reading) = self.accept(payload) else {
            return;
        };
        let live = is_live(&reading);
        debug!("Device {} status: live={}", reading.device_id, live);
        self.state.update(|s| s.connected = live);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LocalChannel;

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_event_classification() {
        assert!(matches!(
            PushEvent::from_message("sensor_update", Value::Null),
            PushEvent::Telemetry(_)
        ));
        assert!(matches!(
            PushEvent::from_message("device_status", Value::Null),
            PushEvent::DeviceStatus(_)
        ));
        assert_eq!(
            PushEvent::from_message("alert:trigger", json!({"id": 1})),
            PushEvent::AlertTrigger
        );
        assert_eq!(
            PushEvent::from_message("chat", Value::Null),
            PushEvent::Unknown("chat".to_string())
        );
    }

    #[tokio::test]
    async fn test_live_telemetry_updates_state() {
        let channel = Arc::new(LocalChannel::default());
        let state = SharedState::new();
        let _bridge = RealtimeBridge::start(channel.clone(), state.clone(), None);

        channel.publish(
            "telemetry:update",
            json!({
                "deviceId": "A",
                "deviceOnline": true,
                "temperature": 25.0,
                "timestamp": "2024-01-01T00:00:00Z"
            }),
        );
        settle().await;

        let snapshot = state.snapshot();
        assert!(snapshot.connected);
        assert_eq!(snapshot.history.len(), 1);
        assert!(snapshot.last_updated.is_some());
        assert_eq!(snapshot.latest.map(|r| r.device_id), Some("A".to_string()));
    }

    #[tokio::test]
    async fn test_legacy_sensor_update_shape() {
        let channel = Arc::new(LocalChannel::default());
        let state = SharedState::new();
        let _bridge = RealtimeBridge::start(channel.clone(), state.clone(), None);

        channel.publish(
            "sensor:update",
            json!({
                "device": "A",
                "status": "online",
                "timestamp": "2024-01-01T00:00:00Z",
                "sensors": {"temperature": 22.5, "float_distance": 14.0, "rssi": -61}
            }),
        );
        settle().await;

        let latest = state.snapshot().latest.unwrap();
        assert_eq!(latest.temperature, Some(22.5));
        assert_eq!(latest.water_level, Some(14.0));
        assert_eq!(latest.signal_strength, Some(-61.0));
    }

    #[tokio::test]
    async fn test_device_status_only_touches_connected() {
        let channel = Arc::new(LocalChannel::default());
        let state = SharedState::new();
        let _bridge = RealtimeBridge::start(channel.clone(), state.clone(), Some("A".into()));

        channel.publish("device:status", json!({"id": "A", "online": true}));
        settle().await;
        assert!(state.snapshot().connected);
        assert!(state.snapshot().latest.is_none());

        channel.publish("device_status", json!({"deviceId": "A", "status": "OFFLINE"}));
        settle().await;
        assert!(!state.snapshot().connected);
    }

    #[tokio::test]
    async fn test_connect_joins_room() {
        let channel = Arc::new(LocalChannel::default());
        let state = SharedState::new();
        let _bridge = RealtimeBridge::start(channel.clone(), state.clone(), Some("A".into()));

        channel.connect();
        settle().await;
        assert!(state.snapshot().transport_up);
        assert_eq!(
            channel.emitted(),
            vec![(ROOM_JOIN_EVENT.to_string(), json!({"room": "device:A"}))]
        );

        channel.disconnect();
        settle().await;
        assert!(!state.snapshot().transport_up);
    }

    #[tokio::test]
    async fn test_already_connected_transport_joins_on_start() {
        let channel = Arc::new(LocalChannel::default());
        channel.connect();
        let state = SharedState::new();
        let _bridge = RealtimeBridge::start(channel.clone(), state.clone(), Some("B".into()));

        assert!(state.snapshot().transport_up);
        assert_eq!(channel.emitted().len(), 1);
    }

    #[tokio::test]
    async fn test_alert_fan_out() {
        let channel = Arc::new(LocalChannel::default());
        let bridge = RealtimeBridge::start(channel.clone(), SharedState::new(), None);
        let mut alerts = bridge.alerts();

        channel.publish("alert:trigger", json!({"severity": "high"}));
        assert_eq!(alerts.recv().await.unwrap(), AlertTrigger);
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent() {
        let channel = Arc::new(LocalChannel::default());
        let state = SharedState::new();
        let bridge = RealtimeBridge::start(channel.clone(), state.clone(), None);

        bridge.teardown();
        bridge.teardown();
        settle().await;
        assert!(!bridge.is_running());

        channel.publish(
            "telemetry:update",
            json!({"deviceId": "A", "deviceOnline": true, "timestamp": "2024-01-01T00:00:00Z"}),
        );
        settle().await;
        assert!(state.snapshot().latest.is_none());
    }
}
