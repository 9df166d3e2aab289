//! WebSocket endpoints.

use agora_core::TraceEvent;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::StreamExt;
use serde::Serialize;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use crate::state::AppState;

/// Frames sent on the trace stream.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceFrame {
    Connected,
    Event { event: TraceEvent },
    /// The client fell behind and missed this many events.
    Lagged { skipped: u64 },
}

/// Live trace of every negotiation on this node.
pub async fn trace_stream(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_trace_stream(socket, state))
}

async fn send(socket: &mut WebSocket, frame: &TraceFrame) -> bool {
    match serde_json::to_string(frame) {
        Ok(json) => socket.send(Message::Text(json)).await.is_ok(),
        Err(_) => true,
    }
}

async fn handle_trace_stream(mut socket: WebSocket, state: AppState) {
    let mut events = BroadcastStream::new(state.trace.subscribe());

    if !send(&mut socket, &TraceFrame::Connected).await {
        return;
    }

    loop {
        tokio::select! {
            next = events.next() => {
                let frame = match next {
                    Some(Ok(event)) => TraceFrame::Event { event },
                    Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => TraceFrame::Lagged { skipped },
                    None => break,
                };
                if !send(&mut socket, &frame).await {
                    break;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = socket.send(Message::Pong(data)).await;
                    }
                    _ => {}
                }
            }
        }
    }

    debug!("trace subscriber disconnected");
}
