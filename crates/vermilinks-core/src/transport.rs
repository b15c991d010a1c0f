//! Push transport abstraction.
//!
//! The realtime bridge listens to named events from a push channel and emits
//! a room-join request when the channel (re)connects. [`PushTransport`] is the
//! seam between the bridge and the wire; [`LocalChannel`] is an in-process
//! implementation used by tests and by hosts that already own a socket.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::{Error, Result};

/// Default capacity of a transport's event channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// Something that happened on a push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelEvent {
    /// The channel (re)connected.
    Connected,
    /// The channel dropped.
    Disconnected,
    /// A named event arrived.
    Message {
        /// Event name, such as `telemetry:update`.
        name: String,
        /// Event payload.
        payload: Value,
    },
}

impl ChannelEvent {
    /// Convenience constructor for a named message.
    pub fn message(name: impl Into<String>, payload: Value) -> Self {
        Self::Message {
            name: name.into(),
            payload,
        }
    }
}

/// A bidirectional push channel.
pub trait PushTransport: Send + Sync {
    /// Subscribe to channel events. Events sent before subscribing are not seen.
    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent>;

    /// Emit a named event to the server.
    fn emit(&self, name: &str, payload: Value) -> Result<()>;

    /// Whether the channel is currently connected.
    fn is_connected(&self) -> bool;
}

/// In-process push channel.
///
/// The host drives it: [`connect`](Self::connect) and
/// [`disconnect`](Self::disconnect) announce link changes, and
/// [`publish`](Self::publish) delivers a named event. Everything passed to
/// [`emit`](PushTransport::emit) is recorded and can be read back with
/// [`emitted`](Self::emitted).
#[derive(Debug, Clone)]
pub struct LocalChannel {
    sender: broadcast::Sender<ChannelEvent>,
    connected: Arc<AtomicBool>,
    emitted: Arc<Mutex<Vec<(String, Value)>>>,
}

impl Default for LocalChannel {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl LocalChannel {
    /// Create a disconnected channel with the given event capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            connected: Arc::new(AtomicBool::new(false)),
            emitted: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Mark the channel connected and notify subscribers.
    pub fn connect(&self) {
        self.connected.store(true, Ordering::SeqCst);
        let _ = self.sender.send(ChannelEvent::Connected);
    }

    /// Mark the channel disconnected and notify subscribers.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.sender.send(ChannelEvent::Disconnected);
    }

    /// Deliver a named event to subscribers.
    ///
    /// Returns the number of subscribers that received it.
    pub fn publish(&self, name: &str, payload: Value) -> usize {
        self.sender
            .send(ChannelEvent::message(name, payload))
            .unwrap_or(0)
    }

    /// Events emitted toward the server so far.
    pub fn emitted(&self) -> Vec<(String, Value)> {
        self.emitted
            .lock()
            .map(|emitted| emitted.clone())
            .unwrap_or_default()
    }

    /// Number of active subscribers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl PushTransport for LocalChannel {
    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.sender.subscribe()
    }

    fn emit(&self, name: &str, payload: Value) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::Channel(format!("cannot emit '{name}' while disconnected")));
        }
        self.emitted
            .lock()
            .map_err(|_| Error::Channel("emit log poisoned".to_string()))?
            .push((name.to_string(), payload));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_local_channel_delivers_events() {
        let channel = LocalChannel::default();
        let mut rx = channel.subscribe();

        channel.connect();
        channel.publish("telemetry:update", json!({"deviceId": "A"}));
        channel.disconnect();

        assert_eq!(rx.recv().await.unwrap(), ChannelEvent::Connected);
        assert_eq!(
            rx.recv().await.unwrap(),
            ChannelEvent::message("telemetry:update", json!({"deviceId": "A"}))
        );
        assert_eq!(rx.recv().await.unwrap(), ChannelEvent::Disconnected);
    }

    #[test]
    fn test_emit_requires_connection() {
        let channel = LocalChannel::default();
        assert!(matches!(
            channel.emit("room:join", json!({})),
            Err(Error::Channel(_))
        ));

        channel.connect();
        channel.emit("room:join", json!({"room": "device:A"})).unwrap();
        assert_eq!(
            channel.emitted(),
            vec![("room:join".to_string(), json!({"room": "device:A"}))]
        );
    }

    #[test]
    fn test_publish_without_subscribers() {
        let channel = LocalChannel::default();
        assert_eq!(channel.publish("alert:trigger", json!({})), 0);
    }

    #[test]
    fn test_channel_event_serialization() {
        let json = serde_json::to_value(ChannelEvent::Connected).unwrap();
        assert_eq!(json, json!({"type": "connected"}));
    }
}
