//! Live trace events from a node.

use agora_core::{AgoraError, Result, TraceEvent};
use futures::StreamExt;
use serde::Deserialize;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;

/// Frames the node sends on `/ws/trace`.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum WsFrame {
    Connected,
    Event { event: TraceEvent },
    Lagged { skipped: u64 },
}

/// Stream of trace events.
pub struct TraceStream {
    receiver: tokio::sync::mpsc::Receiver<TraceEvent>,
    _handle: tokio::task::JoinHandle<()>,
}

impl TraceStream {
    /// Connect to a node's trace websocket.
    pub async fn connect(ws_url: &str) -> Result<Self> {
        let (ws_stream, _) = connect_async(ws_url).await.map_err(|e| AgoraError::Internal {
            status: 503,
            code: "CONNECTION_ERROR".to_string(),
            message: e.to_string(),
            details: serde_json::Value::Null,
        })?;

        let (tx, rx) = tokio::sync::mpsc::channel(100);

        let handle = tokio::spawn(async move {
            let (_, mut read) = ws_stream.split();

            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<WsFrame>(&text) {
                        Ok(WsFrame::Event { event }) => {
                            if tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Ok(WsFrame::Lagged { skipped }) => {
                            debug!(skipped, "trace stream lagged");
                        }
                        Ok(WsFrame::Connected) => {}
                        Err(e) => debug!(error = %e, "unrecognized trace frame"),
                    },
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }
        });

        Ok(Self {
            receiver: rx,
            _handle: handle,
        })
    }

    /// Get the next event, `None` once the connection closes.
    pub async fn next(&mut self) -> Option<TraceEvent> {
        self.receiver.recv().await
    }
}
