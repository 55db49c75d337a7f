//! Frame source: consumes the companion tap's local WebSocket mirror of
//! the venue's traffic and forwards raw frames to the bridge.
//!
//! Uses split read/write halves so pings can be answered while the reader
//! is draining frames.

use std::sync::Arc;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{error, info, warn};

use crate::types::{now_ms, FrameDirection, FramePayload, RawFrame};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

/// Envelope the tap wraps each mirrored frame in. Binary payloads arrive
/// base64-encoded in `payload_b64`.
#[derive(Debug, Deserialize)]
struct FrameEnvelope {
    direction: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    payload: Option<String>,
    #[serde(default)]
    payload_b64: Option<String>,
    #[serde(default)]
    ts: Option<i64>,
}

pub struct WsFrameSource {
    ws_sink: Arc<Mutex<WsSink>>,
    ws_reader: Arc<Mutex<WsReader>>,
    frame_tx: mpsc::Sender<RawFrame>,
    connected: Arc<RwLock<bool>>,
    url: String,
}

impl WsFrameSource {
    /// Connect to the tap endpoint and start forwarding frames into
    /// `frame_tx`.
    pub async fn connect(url: &str, frame_tx: mpsc::Sender<RawFrame>) -> Result<Self> {
        let (ws_stream, _) = connect_async(url)
            .await
            .with_context(|| format!("frame tap connection failed: {url}"))?;

        info!(url, "connected to frame tap");

        let (ws_sink, ws_reader) = ws_stream.split();
        let source = Self {
            ws_sink: Arc::new(Mutex::new(ws_sink)),
            ws_reader: Arc::new(Mutex::new(ws_reader)),
            frame_tx,
            connected: Arc::new(RwLock::new(true)),
            url: url.to_string(),
        };

        let handler = source.share();
        tokio::spawn(async move {
            handler.message_handler().await;
        });

        Ok(source)
    }

    fn share(&self) -> Self {
        Self {
            ws_sink: Arc::clone(&self.ws_sink),
            ws_reader: Arc::clone(&self.ws_reader),
            frame_tx: self.frame_tx.clone(),
            connected: Arc::clone(&self.connected),
            url: self.url.clone(),
        }
    }

    pub async fn is_connected(&self) -> bool {
        *self.connected.read().await
    }

    async fn message_handler(&self) {
        loop {
            let msg = {
                let mut reader = self.ws_reader.lock().await;
                reader.next().await
            };

            match msg {
                Some(Ok(Message::Text(text))) => {
                    let frame = parse_envelope(&text, &self.url);
                    if self.frame_tx.send(frame).await.is_err() {
                        warn!("frame channel closed, stopping tap reader");
                        break;
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    let frame = RawFrame {
                        direction: FrameDirection::In,
                        source_url: self.url.clone(),
                        payload: FramePayload::Binary(data),
                        ts_ms: now_ms(),
                    };
                    if self.frame_tx.send(frame).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let mut sink = self.ws_sink.lock().await;
                    if let Err(e) = sink.send(Message::Pong(data)).await {
                        error!("failed to send pong: {e}");
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    info!("frame tap closed by peer");
                    break;
                }
                Some(Err(e)) => {
                    error!("frame tap error: {e}");
                    break;
                }
                None => {
                    info!("frame tap stream ended");
                    break;
                }
                _ => {}
            }
        }

        *self.connected.write().await = false;
        warn!("frame tap reader exited");
    }

    /// Reconnect and restart the reader, reusing the existing channel.
    pub async fn reconnect(&self) -> Result<()> {
        info!(url = %self.url, "reconnecting to frame tap");
        let (ws_stream, _) = connect_async(&self.url)
            .await
            .context("frame tap reconnection failed")?;
        let (ws_sink, ws_reader) = ws_stream.split();
        {
            let mut sink = self.ws_sink.lock().await;
            *sink = ws_sink;
        }
        {
            let mut reader = self.ws_reader.lock().await;
            *reader = ws_reader;
        }
        *self.connected.write().await = true;

        let handler = self.share();
        tokio::spawn(async move {
            handler.message_handler().await;
        });
        Ok(())
    }

    pub async fn close(&self) -> Result<()> {
        {
            let mut sink = self.ws_sink.lock().await;
            sink.close().await.context("failed to close frame tap")?;
        }
        *self.connected.write().await = false;
        Ok(())
    }
}

/// Turns one tap message into a raw frame. Non-envelope text is treated as
/// an inbound frame so a bare tap still works.
fn parse_envelope(text: &str, fallback_url: &str) -> RawFrame {
    if let Ok(env) = serde_json::from_str::<FrameEnvelope>(text) {
        let direction = if env.direction.eq_ignore_ascii_case("out") {
            FrameDirection::Out
        } else {
            FrameDirection::In
        };
        let url = if env.url.is_empty() {
            fallback_url.to_string()
        } else {
            env.url
        };
        let payload = match env.payload_b64.as_deref().map(|b| BASE64.decode(b)) {
            Some(Ok(bytes)) => FramePayload::Binary(bytes),
            _ => FramePayload::Text(env.payload.unwrap_or_default()),
        };
        return RawFrame {
            direction,
            source_url: url,
            payload,
            ts_ms: env.ts.unwrap_or_else(now_ms),
        };
    }
    RawFrame {
        direction: FrameDirection::In,
        source_url: fallback_url.to_string(),
        payload: FramePayload::Text(text.to_string()),
        ts_ms: now_ms(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_with_text_payload() {
        let frame = parse_envelope(
            r#"{"direction":"out","url":"wss://venue.example/ws","payload":"42[\"ping\"]","ts":123}"#,
            "wss://tap.local",
        );
        assert_eq!(frame.direction, FrameDirection::Out);
        assert_eq!(frame.source_url, "wss://venue.example/ws");
        assert_eq!(frame.ts_ms, 123);
        match frame.payload {
            FramePayload::Text(ref s) => assert_eq!(s, "42[\"ping\"]"),
            _ => panic!("expected text payload"),
        }
    }

    #[test]
    fn envelope_with_binary_payload() {
        let b64 = BASE64.encode([0x1f, 0x8b, 0x08]);
        let frame = parse_envelope(
            &format!(r#"{{"direction":"in","payload_b64":"{b64}"}}"#),
            "wss://tap.local",
        );
        assert_eq!(frame.direction, FrameDirection::In);
        assert_eq!(frame.source_url, "wss://tap.local");
        match frame.payload {
            FramePayload::Binary(ref b) => assert_eq!(b, &[0x1f, 0x8b, 0x08]),
            _ => panic!("expected binary payload"),
        }
    }

    #[test]
    fn bare_text_falls_back_to_inbound() {
        let frame = parse_envelope("3probe", "wss://tap.local");
        assert_eq!(frame.direction, FrameDirection::In);
        match frame.payload {
            FramePayload::Text(ref s) => assert_eq!(s, "3probe"),
            _ => panic!("expected text payload"),
        }
    }
}
