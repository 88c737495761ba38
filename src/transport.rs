//! WebSocket transport to the agent orchestrator.
//!
//! A single connect attempt: inbound text frames are forwarded raw into
//! the session event channel, and the socket closing or erroring surfaces
//! once as a `Disconnected` event. No reconnect or retry at this layer.

use crate::session::SessionEvent;
use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

/// Fixed routing target for outbound user frames.
const OUTBOUND_RECIPIENT: &str = "chat_manager";

pub struct Transport {
    out_tx: mpsc::UnboundedSender<String>,
}

impl Transport {
    /// Connect and start the socket pump. Inbound frames and the one-shot
    /// disconnect notification arrive on `events`.
    pub async fn connect(
        url: &str,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Transport> {
        let (ws, _) = connect_async(url).await?;
        info!(url, "connected to orchestrator");

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            let (mut sink, mut stream) = ws.split();
            loop {
                tokio::select! {
                    inbound = stream.next() => match inbound {
                        Some(Ok(WsMessage::Text(text))) => {
                            if events.send(SessionEvent::Frame(text)).is_err() {
                                return; // receiver dropped
                            }
                        }
                        Some(Ok(WsMessage::Close(_))) | None => {
                            let _ = events.send(SessionEvent::Disconnected {
                                reason: "connection closed by server".to_string(),
                            });
                            return;
                        }
                        Some(Ok(_)) => {} // ping/pong/binary, nothing to do
                        Some(Err(e)) => {
                            warn!(error = %e, "websocket error");
                            let _ = events.send(SessionEvent::Disconnected {
                                reason: e.to_string(),
                            });
                            return;
                        }
                    },
                    outbound = out_rx.recv() => match outbound {
                        Some(frame) => {
                            debug!("sending outbound frame");
                            if sink.send(WsMessage::Text(frame)).await.is_err() {
                                let _ = events.send(SessionEvent::Disconnected {
                                    reason: "send failed".to_string(),
                                });
                                return;
                            }
                        }
                        None => {
                            let _ = sink.close().await;
                            return;
                        }
                    },
                }
            }
        });

        Ok(Self { out_tx })
    }

    /// Queue an outbound user message. Returns false when the socket pump
    /// has already shut down.
    pub fn send_user_message(&self, text: &str, timestamp: i64) -> bool {
        self.out_tx.send(build_user_frame(text, timestamp)).is_ok()
    }
}

fn build_user_frame(text: &str, timestamp: i64) -> String {
    json!({
        "type": "text",
        "content": text,
        "sender": "user",
        "recipient": OUTBOUND_RECIPIENT,
        "timestamp": timestamp,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::build_user_frame;
    use serde_json::Value;

    #[test]
    fn outbound_frame_matches_wire_contract() {
        let frame = build_user_frame("show me meta spend", 1234);
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "text");
        assert_eq!(value["sender"], "user");
        assert_eq!(value["recipient"], "chat_manager");
        assert_eq!(value["content"], "show me meta spend");
        assert_eq!(value["timestamp"], 1234);
    }
}
