//! Websocket endpoint bridging the client socket to a session handler.
//!
//! The socket splits into a writer task (drains the session's outbound
//! channel) and a reader loop (feeds inbound frames to the handler). The
//! handler itself runs on its own task; a blocked socket never stalls the
//! transcription pipeline.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use murmur_session::{InboundFrame, SessionHandler};

use crate::state::AppState;

/// `GET /ws/session` - upgrade to the bidirectional session protocol.
pub async fn session_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_session(socket, state))
}

async fn serve_session(socket: WebSocket, state: AppState) {
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    let session_id = state.manager.open(outbound_tx, None);
    info!(session_id = %session_id, "New websocket session");

    let handler = SessionHandler::new(
        session_id,
        state.manager.clone(),
        &state.config,
        state.provider.clone(),
        state.backend.clone(),
        state.retriever.clone(),
    );

    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let handler_task = tokio::spawn(handler.run(inbound_rx));

    let (mut sink, mut source) = socket.split();

    // Writer: serialized frames from the session layer onto the socket.
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if sink.send(Message::Text(frame.into())).await.is_err() {
                debug!("Socket write failed; stopping writer");
                break;
            }
        }
    });

    // Reader: socket frames into the session handler.
    while let Some(message) = source.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if inbound_tx.send(InboundFrame::Text(text.to_string())).is_err() {
                    break;
                }
            }
            Ok(Message::Binary(bytes)) => {
                if inbound_tx.send(InboundFrame::Binary(bytes.to_vec())).is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                debug!(session_id = %session_id, "Client sent close frame");
                break;
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Socket read error");
                break;
            }
        }
    }

    // Teardown runs inside the handler; the writer ends when the session's
    // transport is deregistered.
    let _ = inbound_tx.send(InboundFrame::Closed);
    if handler_task.await.is_err() {
        warn!(session_id = %session_id, "Session handler panicked");
    }
    writer.abort();
    info!(session_id = %session_id, "Websocket session finished");
}
