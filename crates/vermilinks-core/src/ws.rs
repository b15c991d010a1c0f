//! WebSocket push transport.
//!
//! [`WsTransport`] keeps a WebSocket connection to the realtime gateway open
//! in a background task, reconnecting after a fixed delay whenever it drops.
//! Inbound frames are decoded into [`ChannelEvent::Message`]s; outbound events
//! are sent as `{"event": <name>, "data": <payload>}` text frames.
//!
//! Inbound frames may be shaped as:
//!
//! - `{"event": "telemetry:update", "data": {...}}`
//! - `["telemetry:update", {...}]`
//! - either of the above behind a numeric packet-type prefix, such as
//!   `42["telemetry:update", {...}]`. The prefix is stripped and ignored.
//!
//! This is a plain WebSocket client. It does not speak the Socket.IO or
//! Engine.IO handshake (namespace connect, ping replies), so a Socket.IO
//! gateway needs a plain WebSocket endpoint or adapter in front of it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::transport::{ChannelEvent, DEFAULT_CHANNEL_CAPACITY, PushTransport};

/// WebSocket-backed push transport.
pub struct WsTransport {
    url: String,
    events: broadcast::Sender<ChannelEvent>,
    outbound: mpsc::UnboundedSender<String>,
    connected: Arc<AtomicBool>,
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport")
            .field("url", &self.url)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl WsTransport {
    /// Start connecting to `url` in the background.
    ///
    /// Returns immediately. Connection state changes arrive as
    /// [`ChannelEvent::Connected`] / [`ChannelEvent::Disconnected`] events.
    /// Must be called from within a Tokio runtime.
    pub fn connect(url: &str, reconnect_delay: Duration) -> Result<Self> {
        let url = url.trim().to_string();
        // Built without a TLS backend; terminate wss at a proxy
        if !url.starts_with("ws://") {
            return Err(Error::InvalidUrl(format!(
                "URL must start with ws://, got: {}",
                url
            )));
        }
        if reconnect_delay.is_zero() {
            return Err(Error::invalid_config("reconnect_delay must be > 0"));
        }

        let (events, _) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));
        let cancel_token = CancellationToken::new();

        let handle = tokio::spawn(run(
            url.clone(),
            reconnect_delay,
            events.clone(),
            outbound_rx,
            Arc::clone(&connected),
            cancel_token.clone(),
        ));

        Ok(Self {
            url,
            events,
            outbound,
            connected,
            cancel_token,
            handle,
        })
    }

    /// The gateway URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Stop the connection task.
    pub fn close(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the connection task has stopped.
    pub fn is_closed(&self) -> bool {
        self.handle.is_finished()
    }
}

impl PushTransport for WsTransport {
    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    fn emit(&self, name: &str, payload: Value) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::Channel(format!("cannot emit '{name}' while disconnected")));
        }
        let frame = json!({ "event": name, "data": payload }).to_string();
        self.outbound
            .send(frame)
            .map_err(|_| Error::Channel("connection task stopped".to_string()))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

async fn run(
    url: String,
    reconnect_delay: Duration,
    events: broadcast::Sender<ChannelEvent>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    connected: Arc<AtomicBool>,
    cancel_token: CancellationToken,
) {
    loop {
        let attempt = tokio::select! {
            _ = cancel_token.cancelled() => break,
            result = connect_async(url.as_str()) => result,
        };

        match attempt {
            Ok((socket, _response)) => {
                info!("Connected to realtime gateway at {}", url);
                connected.store(true, Ordering::SeqCst);
                let _ = events.send(ChannelEvent::Connected);

                let (mut sink, mut stream) = socket.split();
                loop {
                    tokio::select! {
                        _ = cancel_token.cancelled() => {
                            let _ = sink.send(Message::Close(None)).await;
                            break;
                        }
                        Some(frame) = outbound.recv() => {
                            if let Err(e) = sink.send(Message::Text(frame.into())).await {
                                warn!("WebSocket send error: {}", e);
                                break;
                            }
                        }
                        incoming = stream.next() => match incoming {
                            Some(Ok(Message::Text(text))) => {
                                match parse_frame(text.as_str()) {
                                    Some(event) => {
                                        let _ = events.send(event);
                                    }
                                    None => debug!("Ignoring frame: {}", text.as_str()),
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                warn!("WebSocket receive error: {}", e);
                                break;
                            }
                        },
                    }
                }

                connected.store(false, Ordering::SeqCst);
                let _ = events.send(ChannelEvent::Disconnected);
                info!("Disconnected from realtime gateway");
            }
            Err(e) => {
                debug!("Realtime gateway connect failed: {}", e);
            }
        }

        if cancel_token.is_cancelled() {
            break;
        }
        debug!("Reconnecting in {:?}", reconnect_delay);
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = tokio::time::sleep(reconnect_delay) => {}
        }
    }
    debug!("Realtime connection task stopped");
}

/// Decode a text frame into a named event.
pub fn parse_frame(text: &str) -> Option<ChannelEvent> {
    // Socket.IO packet type prefix, e.g. `42[...]`
    let body = text.trim_start_matches(|c: char| c.is_ascii_digit());
    let value: Value = serde_json::from_str(body).ok()?;

    match value {
        Value::Array(mut items) if !items.is_empty() => {
            let name = items.first()?.as_str()?.to_string();
            let payload = if items.len() > 1 {
                items.swap_remove(1)
            } else {
                Value::Null
            };
            Some(ChannelEvent::message(name, payload))
        }
        Value::Object(mut map) => {
            let name = map.get("event")?.as_str()?.to_string();
            let payload = map.remove("data").unwrap_or(Value::Null);
            Some(ChannelEvent::message(name, payload))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_object_frame() {
        let event = parse_frame(r#"{"event":"telemetry:update","data":{"deviceId":"A"}}"#);
        assert_eq!(
            event,
            Some(ChannelEvent::message("telemetry:update", json!({"deviceId": "A"})))
        );
    }

    #[test]
    fn test_parse_array_frame() {
        let event = parse_frame(r#"["device:status",{"deviceId":"A","online":true}]"#);
        assert_eq!(
            event,
            Some(ChannelEvent::message(
                "device:status",
                json!({"deviceId": "A", "online": true})
            ))
        );
    }

    #[test]
    fn test_parse_socketio_packet() {
        let event = parse_frame(r#"42["alert:trigger",{"level":"high"}]"#);
        assert_eq!(
            event,
            Some(ChannelEvent::message("alert:trigger", json!({"level": "high"})))
        );
        assert_eq!(
            parse_frame(r#"42["alert:trigger"]"#),
            Some(ChannelEvent::message("alert:trigger", Value::Null))
        );
    }

    #[test]
    fn test_parse_rejects_noise() {
        assert_eq!(parse_frame("2"), None);
        assert_eq!(parse_frame("not json"), None);
        assert_eq!(parse_frame(r#"{"data":{}}"#), None);
        assert_eq!(parse_frame("[]"), None);
        assert_eq!(parse_frame("[1, 2]"), None);
    }

    #[tokio::test]
    async fn test_connect_validates_url() {
        assert!(matches!(
            WsTransport::connect("http://localhost:5000", Duration::from_secs(1)),
            Err(Error::InvalidUrl(_))
        ));
        assert!(matches!(
            WsTransport::connect("wss://localhost:5000", Duration::from_secs(1)),
            Err(Error::InvalidUrl(_))
        ));
        assert!(matches!(
            WsTransport::connect("ws://localhost:5000", Duration::ZERO),
            Err(Error::InvalidConfig(_))
        ));
    }

    async fn next_event(events: &mut broadcast::Receiver<ChannelEvent>) -> ChannelEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for transport event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn test_reconnects_after_server_closes() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (joined_tx, mut joined_rx) = mpsc::unbounded_channel::<Value>();

        // Each connection: read the join frame, push one event, close
        let server = tokio::spawn(async move {
            for n in 0..2 {
                let (tcp, _) = listener.accept().await.unwrap();
                let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
                if let Some(Ok(Message::Text(text))) = ws.next().await {
                    joined_tx
                        .send(serde_json::from_str(text.as_str()).unwrap())
                        .unwrap();
                }
                let frame = format!(r#"42["telemetry:update",{{"deviceId":"A","n":{n}}}]"#);
                ws.send(Message::Text(frame.into())).await.unwrap();
                let _ = ws.close(None).await;
            }
        });

        let transport =
            WsTransport::connect(&format!("ws://{addr}"), Duration::from_millis(50)).unwrap();
        let mut events = transport.subscribe();

        for n in 0..2 {
            assert_eq!(next_event(&mut events).await, ChannelEvent::Connected);
            transport
                .emit("room:join", json!({"room": "device:A"}))
                .unwrap();
            assert_eq!(
                next_event(&mut events).await,
                ChannelEvent::message("telemetry:update", json!({"deviceId": "A", "n": n}))
            );
            assert_eq!(next_event(&mut events).await, ChannelEvent::Disconnected);
        }

        for _ in 0..2 {
            assert_eq!(
                joined_rx.recv().await,
                Some(json!({"event": "room:join", "data": {"room": "device:A"}}))
            );
        }

        server.await.unwrap();
        transport.close();
    }

    #[tokio::test]
    async fn test_emit_while_disconnected_fails() {
        let transport = WsTransport::connect("ws://127.0.0.1:9", Duration::from_secs(30)).unwrap();
        assert!(!transport.is_connected());
        assert!(transport.emit("room:join", json!({})).is_err());
        transport.close();
    }
}
