//! WebSocket connection handling: one task per client, bridging axum's
//! `WebSocket` to the bus/pipeline.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use convo_core::data::event::Event;
use convo_core::data::session::SessionId;

use crate::pipeline::SessionPipeline;
use crate::protocol::{pong_frame, protocol_error_frame, session_ready_frame, ClientMessage};
use crate::state::AppState;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let session_id = SessionId::new();
    info!(%session_id, "client connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel::<String>();
    state.forwarder.register(session_id.clone(), outbox_tx);

    // Drains the forwarder's outbox onto the socket. Kept as a separate task
    // so a slow client write never blocks bus delivery for this session.
    let writer = tokio::spawn(async move {
        while let Some(text) = outbox_rx.recv().await {
            if ws_sender.send(WsMessage::Text(text)).await.is_err() {
                break;
            }
        }
    });

    state.bus.publish(Event::AudioSessionInit {
        session_id: session_id.clone(),
    })
    .await;
    send_direct(&state, &session_id, session_ready_frame(session_id.clone(), now_ms())).await;

    let mut pipeline = SessionPipeline::new(session_id.clone(), state.clone(), state.config.audio);

    while let Some(msg) = ws_receiver.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(err) => {
                warn!(%session_id, error = %err, "websocket error");
                break;
            }
        };
        match msg {
            WsMessage::Binary(bytes) => {
                pipeline.ingest(bytes).await;
            }
            WsMessage::Text(text) => {
                handle_text_message(&state, &session_id, &mut pipeline, &text).await;
            }
            WsMessage::Close(_) => break,
            WsMessage::Ping(_) | WsMessage::Pong(_) => {}
        }
    }

    pipeline.close().await;
    state.bus.publish(Event::SessionFinalized {
        session_id: session_id.clone(),
    })
    .await;
    state.forwarder.unregister(&session_id);
    writer.abort();
    info!(%session_id, "client disconnected");
}

async fn handle_text_message(
    state: &AppState,
    session_id: &SessionId,
    pipeline: &mut SessionPipeline,
    text: &str,
) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::SessionStart { config }) => {
            debug!(%session_id, language = %config.language, "session.start received");
            pipeline.configure(config.language, config.auto_detect_language);
        }
        Ok(ClientMessage::SessionEnd) => {
            pipeline.close().await;
        }
        Ok(ClientMessage::Ping) => {
            send_direct(state, session_id, pong_frame(session_id.clone(), now_ms())).await;
        }
        Err(err) => {
            warn!(%session_id, error = %err, "malformed client frame");
            send_direct(
                state,
                session_id,
                protocol_error_frame(session_id.clone(), err.to_string(), now_ms()),
            )
            .await;
        }
    }
}

async fn send_direct(state: &AppState, session_id: &SessionId, frame: crate::protocol::OutboundFrame) {
    state.forwarder.send(session_id, frame.to_json());
}
