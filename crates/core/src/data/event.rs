//! The `Event` tagged union that flows through the event bus.

use serde::{Deserialize, Serialize};

use super::audio::PauseType;
use super::session::SessionId;

/// One event on the bus. Every variant carries the session it concerns,
/// except process-wide variants (none currently exist — kept as a reminder
/// that a future global event must NOT silently skip per-session ordering).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Event {
    /// A client connected and initialized a session.
    AudioSessionInit {
        session_id: SessionId,
    },
    /// VAD observed a low→high voice transition.
    SpeechStart {
        session_id: SessionId,
        timestamp_ms: u64,
    },
    /// VAD observed silence persisting past a threshold.
    SilenceDetected {
        session_id: SessionId,
        pause_type: PauseType,
        duration_ms: u64,
    },
    /// STT produced an interim (non-final) result.
    PartialTranscript {
        session_id: SessionId,
        text: String,
        confidence: f32,
        timestamp_ms: u64,
    },
    /// STT produced a committed result.
    FinalTranscript {
        session_id: SessionId,
        text: String,
        confidence: f32,
        timestamp_ms: u64,
    },
    /// Orchestrator decided to start generation for the current turn.
    TriggerGenerate {
        session_id: SessionId,
    },
    /// The LLM adapter accepted the request and generation has begun.
    ResponseStarted {
        session_id: SessionId,
        response_id: u64,
    },
    /// One token (or token-equivalent chunk) of the reply.
    Token {
        session_id: SessionId,
        response_id: u64,
        text: String,
    },
    /// The reply completed normally.
    ResponseDone {
        session_id: SessionId,
        response_id: u64,
        full_text: String,
    },
    /// The reply was cancelled (barge-in or session close).
    ResponseCancelled {
        session_id: SessionId,
        response_id: u64,
    },
    /// A non-fatal error to surface to the client.
    Error {
        session_id: SessionId,
        code: String,
        message: String,
    },
    /// The session has been finalized (closed or timed out).
    SessionFinalized {
        session_id: SessionId,
    },
}

impl Event {
    /// The session this event concerns. Used by the bus to route to the
    /// correct per-session single-writer queue.
    pub fn session_id(&self) -> &SessionId {
        match self {
            Event::AudioSessionInit { session_id }
            | Event::SpeechStart { session_id, .. }
            | Event::SilenceDetected { session_id, .. }
            | Event::PartialTranscript { session_id, .. }
            | Event::FinalTranscript { session_id, .. }
            | Event::TriggerGenerate { session_id }
            | Event::ResponseStarted { session_id, .. }
            | Event::Token { session_id, .. }
            | Event::ResponseDone { session_id, .. }
            | Event::ResponseCancelled { session_id, .. }
            | Event::Error { session_id, .. }
            | Event::SessionFinalized { session_id } => session_id,
        }
    }
}
