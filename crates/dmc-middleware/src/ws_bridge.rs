//! WebSocket bridge between a [`BusSession`] and remote peers.
//!
//! Every sample on the session is forwarded to each connected peer as one
//! JSON text frame, and every well-formed frame received from a peer is
//! published back onto the session:
//!
//! ```text
//! {"topic": "dmc_robo/rb1/motor/cmd", "json": {"v_l": 0.1, "v_r": 0.1}}
//! {"topic": "dmc_robo/rb1/oled/image/mono1", "payload_b64": "AAAA..."}
//! ```
//!
//! Payloads that parse as JSON travel in `json`; anything else (JPEG, mono1
//! bitmaps) is base64-encoded into `payload_b64`.

use std::net::SocketAddr;
use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use dmc_types::NodeError;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::session::{BusSession, Sample, Session};

/// One bridged message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeFrame {
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_b64: Option<String>,
}

impl BridgeFrame {
    /// Wrap a session sample, choosing the `json` form when the bytes are a
    /// JSON document.
    pub fn from_sample(sample: &Sample) -> Self {
        let json = serde_json::from_slice::<serde_json::Value>(&sample.payload).ok();
        let payload_b64 = match json {
            Some(_) => None,
            None => Some(BASE64.encode(&sample.payload)),
        };
        Self {
            topic: sample.topic.to_string(),
            json,
            payload_b64,
        }
    }

    /// Recover the raw payload bytes carried by the frame.
    pub fn payload(&self) -> Result<Vec<u8>, NodeError> {
        match (&self.json, &self.payload_b64) {
            (Some(value), _) => serde_json::to_vec(value)
                .map_err(|e| NodeError::Serialization(e.to_string())),
            (None, Some(b64)) => BASE64.decode(b64).map_err(|e| NodeError::InvalidPayload {
                topic: self.topic.clone(),
                details: format!("bad base64: {e}"),
            }),
            (None, None) => Ok(Vec::new()),
        }
    }
}

/// Bridge bound to a listening socket, ready to serve.
pub struct WsBridge {
    session: Arc<BusSession>,
    listener: TcpListener,
}

impl WsBridge {
    /// Bind the bridge's listener.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Transport`] if `addr` cannot be bound.
    pub async fn bind(session: Arc<BusSession>, addr: SocketAddr) -> Result<Self, NodeError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| NodeError::Transport(format!("ws bind error on {addr}: {e}")))?;
        info!(addr = %addr, "ws bridge listening");
        Ok(Self { session, listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NodeError> {
        self.listener
            .local_addr()
            .map_err(|e| NodeError::Transport(e.to_string()))
    }

    /// Accept peers until `shutdown` flips to `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let session = Arc::clone(&self.session);
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_peer(session, stream, peer, shutdown).await {
                                error!(peer = %peer, error = %e, "ws peer error");
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "ws accept error"),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("ws bridge stopped");
    }
}

async fn handle_peer(
    session: Arc<BusSession>,
    stream: TcpStream,
    peer: SocketAddr,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), NodeError> {
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| NodeError::Transport(format!("ws handshake from {peer}: {e}")))?;
    info!(peer = %peer, "ws peer connected");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let mut rx = session.tap()?;

    loop {
        tokio::select! {
            result = rx.recv() => match result {
                Ok(sample) => {
                    let json = serde_json::to_string(&BridgeFrame::from_sample(&sample))
                        .map_err(|e| NodeError::Serialization(e.to_string()))?;
                    if ws_tx.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(peer = %peer, lagged_by = n, "ws peer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(Message::Text(text))) => inject(session.as_ref(), text.as_str()),
                _ => {}
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!(peer = %peer, "ws peer disconnected");
    Ok(())
}

/// Publish a peer frame onto the session. Malformed frames are dropped.
fn inject(session: &dyn Session, text: &str) {
    let frame = match serde_json::from_str::<BridgeFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(error = %e, "ignoring malformed ws frame");
            return;
        }
    };
    if frame.topic.is_empty() {
        return;
    }
    match frame.payload() {
        Ok(payload) => {
            if let Err(e) = session.publish(&frame.topic, &payload) {
                warn!(topic = %frame.topic, error = %e, "ws inject failed");
            }
        }
        Err(e) => debug!(error = %e, "ignoring ws frame"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Callback, DEFAULT_CAPACITY};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn sample(topic: &str, payload: &[u8]) -> Sample {
        Sample {
            topic: Arc::from(topic),
            payload: Arc::from(payload),
        }
    }

    #[test]
    fn json_payload_uses_json_field() {
        let frame = BridgeFrame::from_sample(&sample("t", br#"{"v_l":0.1}"#));
        assert!(frame.json.is_some());
        assert!(frame.payload_b64.is_none());
        let back: serde_json::Value = serde_json::from_slice(&frame.payload().unwrap()).unwrap();
        assert_eq!(back["v_l"], 0.1);
    }

    #[test]
    fn binary_payload_uses_base64() {
        let bytes = [0xFFu8, 0xD8, 0x00, 0x10];
        let frame = BridgeFrame::from_sample(&sample("cam", &bytes));
        assert!(frame.json.is_none());
        assert_eq!(frame.payload().unwrap(), bytes.to_vec());
    }

    #[test]
    fn bad_base64_is_invalid_payload() {
        let frame = BridgeFrame {
            topic: "t".into(),
            json: None,
            payload_b64: Some("***".into()),
        };
        assert!(matches!(frame.payload(), Err(NodeError::InvalidPayload { .. })));
    }

    #[tokio::test]
    async fn inject_publishes_onto_session() -> Result<(), Box<dyn std::error::Error>> {
        let session = BusSession::open(DEFAULT_CAPACITY)?;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cb: Callback = Arc::new(move |p: &[u8]| {
            let _ = tx.send(p.to_vec());
        });
        let _sub = session.subscribe("ns/r/oled/cmd", cb)?;

        inject(&session, "not json");
        inject(&session, r#"{"topic":"ns/r/oled/cmd","json":{"text":"HI"}}"#);

        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await?
            .ok_or("no payload")?;
        let value: serde_json::Value = serde_json::from_slice(&got)?;
        assert_eq!(value["text"], "HI");
        Ok(())
    }

    #[tokio::test]
    async fn bind_failure_is_transport_error() -> Result<(), Box<dyn std::error::Error>> {
        let session = Arc::new(BusSession::open(DEFAULT_CAPACITY)?);
        let first = WsBridge::bind(Arc::clone(&session), "127.0.0.1:0".parse()?).await?;
        let taken = first.local_addr()?;
        let second = WsBridge::bind(session, taken).await;
        assert!(matches!(second, Err(NodeError::Transport(_))));
        Ok(())
    }
}
