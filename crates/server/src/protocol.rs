//! Wire protocol: client frames in, `{type, sessionId, payload, timestamp}`
//! frames out.

use serde::{Deserialize, Serialize};
use serde_json::json;

use convo_core::data::event::Event;
use convo_core::data::session::{SessionConfig, SessionId};

/// Text-frame messages a client can send. `audio.frame` arrives as a binary
/// WebSocket frame instead and is handled separately.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "session.start")]
    SessionStart {
        #[serde(default)]
        config: SessionConfig,
    },
    #[serde(rename = "session.end")]
    SessionEnd,
    #[serde(rename = "ping")]
    Ping,
}

/// Envelope for every server -> client frame.
#[derive(Debug, Serialize)]
pub struct OutboundFrame {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub session_id: SessionId,
    pub payload: serde_json::Value,
    pub timestamp: u64,
}

impl OutboundFrame {
    pub fn new(kind: &'static str, session_id: SessionId, payload: serde_json::Value, timestamp_ms: u64) -> Self {
        Self {
            kind,
            session_id,
            payload,
            timestamp: timestamp_ms,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            json!({"type": "error", "payload": {"message": "failed to serialize outbound frame"}}).to_string()
        })
    }
}

/// Translate a bus `Event` into the client-facing frame it corresponds to.
/// `SessionFinalized` has no client representation; the socket is simply
/// closed.
pub fn frame_for_event(event: &Event, now_ms: u64) -> Option<OutboundFrame> {
    let session_id = event.session_id().clone();
    let (kind, payload) = match event {
        Event::AudioSessionInit { .. } => ("audio.listening", json!({})),
        Event::SpeechStart { timestamp_ms, .. } => {
            ("audio.vad", json!({"voice": true, "timestamp": timestamp_ms}))
        }
        Event::SilenceDetected {
            pause_type,
            duration_ms,
            ..
        } => (
            "audio.vad",
            json!({"voice": false, "pauseType": pause_type, "durationMs": duration_ms}),
        ),
        Event::PartialTranscript {
            text,
            confidence,
            timestamp_ms,
            ..
        } => (
            "transcript.partial",
            json!({"text": text, "confidence": confidence, "timestamp": timestamp_ms}),
        ),
        Event::FinalTranscript {
            text,
            confidence,
            timestamp_ms,
            ..
        } => (
            "transcript.final",
            json!({"text": text, "confidence": confidence, "timestamp": timestamp_ms}),
        ),
        Event::TriggerGenerate { .. } => ("assistant.thinking", json!({})),
        Event::ResponseStarted { response_id, .. } => {
            ("assistant.speaking", json!({"responseId": response_id}))
        }
        Event::Token { response_id, text, .. } => (
            "assistant.delta",
            json!({"responseId": response_id, "text": text, "timestamp": now_ms}),
        ),
        Event::ResponseDone {
            response_id,
            full_text,
            ..
        } => (
            "assistant.done",
            json!({"responseId": response_id, "text": full_text}),
        ),
        Event::ResponseCancelled { response_id, .. } => {
            ("assistant.interrupted", json!({"responseId": response_id}))
        }
        Event::Error { code, message, .. } => ("error", json!({"code": code, "message": message})),
        Event::SessionFinalized { .. } => return None,
    };
    Some(OutboundFrame::new(kind, session_id, payload, now_ms))
}

pub fn session_ready_frame(session_id: SessionId, now_ms: u64) -> OutboundFrame {
    OutboundFrame::new("session.ready", session_id, json!({}), now_ms)
}

pub fn pong_frame(session_id: SessionId, now_ms: u64) -> OutboundFrame {
    OutboundFrame::new("pong", session_id, json!({}), now_ms)
}

pub fn protocol_error_frame(session_id: SessionId, message: impl Into<String>, now_ms: u64) -> OutboundFrame {
    OutboundFrame::new(
        "error",
        session_id,
        json!({"code": "protocol", "message": message.into()}),
        now_ms,
    )
}
