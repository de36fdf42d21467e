//! Push-channel transport
//!
//! The supervisor consumes connections through the `PushTransport` seam;
//! the production implementation speaks JSON frames over a WebSocket.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// One decoded frame on the push channel: an event name plus payload
#[derive(Debug, Clone, PartialEq)]
pub struct PushFrame {
    pub event: String,
    pub data: Value,
}

#[derive(Debug, Deserialize)]
struct WireFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

impl PushFrame {
    pub fn new(event: &str, data: Value) -> Self {
        Self {
            event: event.to_string(),
            data,
        }
    }

    /// Subscription request for a topic
    pub fn subscribe(topic: &str) -> Self {
        Self::new(&format!("subscribe:{}", topic), Value::Null)
    }

    pub fn unsubscribe(topic: &str) -> Self {
        Self::new(&format!("unsubscribe:{}", topic), Value::Null)
    }

    /// Parse a wire text frame: `{"event": "...", "data": {...}}`
    pub fn decode(text: &str) -> Result<Self> {
        let frame: WireFrame =
            serde_json::from_str(text).context("Failed to decode push frame")?;
        Ok(Self {
            event: frame.event,
            data: frame.data,
        })
    }

    pub fn encode(&self) -> String {
        json!({ "event": self.event, "data": self.data }).to_string()
    }
}

/// A live bidirectional connection to the push channel
#[async_trait]
pub trait PushChannel: Send {
    /// Next inbound frame; `None` once the connection is gone
    async fn recv(&mut self) -> Option<Result<PushFrame>>;

    /// Send a frame to the server
    async fn send(&mut self, frame: PushFrame) -> Result<()>;
}

/// Dials push channels; the supervisor reconnects through this seam
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn PushChannel>>;
}

/// WebSocket transport backed by tokio-tungstenite
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl PushTransport for WsTransport {
    async fn connect(&self) -> Result<Box<dyn PushChannel>> {
        let (stream, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .context("Failed to connect to the push channel")?;
        Ok(Box::new(WsChannel { stream }))
    }
}

struct WsChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl PushChannel for WsChannel {
    async fn recv(&mut self) -> Option<Result<PushFrame>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(anyhow::Error::from(e))),
            };
            match message {
                Message::Text(text) => return Some(PushFrame::decode(&text)),
                Message::Close(_) => return None,
                // Ping/pong and binary frames carry no events
                _ => continue,
            }
        }
    }

    async fn send(&mut self, frame: PushFrame) -> Result<()> {
        self.stream
            .send(Message::Text(frame.encode()))
            .await
            .context("Failed to send on the push channel")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_frame_decode() {
        let frame =
            PushFrame::decode(r#"{"event":"automation:step","data":{"step":"init"}}"#).unwrap();
        assert_eq!(frame.event, "automation:step");
        assert_eq!(frame.data, json!({ "step": "init" }));
    }

    #[test]
    fn test_frame_decode_without_data() {
        let frame = PushFrame::decode(r#"{"event":"subscribe:automation"}"#).unwrap();
        assert_eq!(frame.event, "subscribe:automation");
        assert_eq!(frame.data, Value::Null);
    }

    #[test]
    fn test_frame_decode_rejects_garbage() {
        assert!(PushFrame::decode("not json").is_err());
        assert!(PushFrame::decode(r#"{"data":{}}"#).is_err());
    }

    #[test]
    fn test_frame_encode_round_trip() {
        let frame = PushFrame::new("log:new", json!({ "level": "INFO", "message": "hi" }));
        let decoded = PushFrame::decode(&frame.encode()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_subscribe_frame_names() {
        assert_eq!(PushFrame::subscribe("automation").event, "subscribe:automation");
        assert_eq!(
            PushFrame::unsubscribe("automation").event,
            "unsubscribe:automation"
        );
    }

    #[test]
    fn test_ws_transport_creation() {
        let transport = WsTransport::new("ws://localhost:3001");
        assert_eq!(transport.url, "ws://localhost:3001");
    }
}
