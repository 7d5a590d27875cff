//! WebSocket transport for streaming speech sessions
//!
//! Bridges one client socket onto a [`ProxySession`]. The socket is split in
//! two: a reader task turns client frames into [`ClientFrame`]s and a writer
//! task serializes [`SpeechEvent`]s back out. The writer is the socket's only
//! writer, so events are never interleaved mid-frame.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::speech::{ClientFrame, ProxySession, SpeechEvent};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SttSessionQuery {
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Upgrade handler for `GET /ws/stt`.
pub async fn stt_session(
    ws: WebSocketUpgrade,
    Query(query): Query<SttSessionQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let session_id = query
        .session_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    ws.on_upgrade(move |socket| {
        let span = info_span!("speech_session", session_id = %session_id);
        handle_session(socket, session_id, state).instrument(span)
    })
}

async fn handle_session(socket: WebSocket, session_id: String, state: Arc<AppState>) {
    info!("Speech session opened");

    let (ws_tx, ws_rx) = socket.split();
    let (frames_tx, frames_rx) = mpsc::channel::<ClientFrame>(64);
    let (events_tx, events_rx) = mpsc::channel::<SpeechEvent>(64);
    let cancel = CancellationToken::new();

    let reader = tokio::spawn(
        read_client(ws_rx, frames_tx, cancel.clone()).in_current_span(),
    );
    let writer = tokio::spawn(write_client(ws_tx, events_rx).in_current_span());

    let mut session = ProxySession::new(session_id);
    let final_state = session
        .run(
            state.registry.speech(),
            state.connector.as_ref(),
            frames_rx,
            events_tx,
            cancel.clone(),
        )
        .await;

    // The session is over; wake the reader if the client is still quiet. The
    // writer drains whatever events are already queued and closes the socket.
    cancel.cancel();
    let _ = reader.await;
    let _ = writer.await;

    info!(
        backend = session.context().chosen_backend.as_deref().unwrap_or(""),
        state = ?final_state,
        "Speech session closed"
    );
}

/// client socket -> session frames.
///
/// Accepts binary PCM frames and the legacy text envelope; anything
/// unrecognized is dropped without ending the session. Cancels the session
/// token when the client leg ends so a handshake still in flight is released.
async fn read_client(
    mut ws_rx: SplitStream<WebSocket>,
    frames: mpsc::Sender<ClientFrame>,
    cancel: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            message = ws_rx.next() => match message {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    debug!(error = %e, "Client socket read failed");
                    break;
                }
                None => break,
            },
        };

        let frame = match message {
            Message::Binary(audio) if !audio.is_empty() => Some(ClientFrame::Audio(Bytes::from(audio))),
            Message::Binary(_) => None,
            Message::Text(text) => ClientFrame::from_text(&text),
            Message::Close(_) => break,
            // Ping/Pong are answered by axum itself.
            _ => None,
        };

        if let Some(frame) = frame {
            if frames.send(frame).await.is_err() {
                break;
            }
        }
    }
    cancel.cancel();
}

/// session events -> client socket (single writer).
async fn write_client(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut events_rx: mpsc::Receiver<SpeechEvent>,
) {
    while let Some(event) = events_rx.recv().await {
        let payload = match serde_json::to_string(&event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to serialize session event");
                continue;
            }
        };
        if ws_tx.send(Message::Text(payload)).await.is_err() {
            break;
        }
    }
    let _ = ws_tx.send(Message::Close(None)).await;
}
