//! Bus-wide `EventHandler`s registered once at startup, fanning bus events
//! back out to the WebSocket connection they belong to.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;

use convo_core::bus::EventHandler;
use convo_core::data::event::Event;
use convo_core::data::session::SessionId;

use crate::protocol::frame_for_event;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Routes bus events to the outbound WS sender for the session they concern.
/// `ws.rs` registers a sender when a connection is accepted and removes it
/// when the socket closes.
pub struct ClientForwarder {
    outboxes: DashMap<SessionId, mpsc::UnboundedSender<String>>,
}

impl ClientForwarder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            outboxes: DashMap::new(),
        })
    }

    pub fn register(&self, session_id: SessionId, sender: mpsc::UnboundedSender<String>) {
        self.outboxes.insert(session_id, sender);
    }

    pub fn unregister(&self, session_id: &SessionId) {
        self.outboxes.remove(session_id);
    }

    /// Send a frame straight to one session's outbox, bypassing the bus.
    /// Used for frames with no corresponding core `Event` (`session.ready`,
    /// `pong`, protocol errors for frames the core never saw).
    pub fn send(&self, session_id: &SessionId, text: String) {
        if let Some(outbox) = self.outboxes.get(session_id) {
            let _ = outbox.send(text);
        }
    }
}

#[async_trait]
impl EventHandler for ClientForwarder {
    async fn handle(&self, event: &Event) {
        let Some(frame) = frame_for_event(event, now_ms()) else {
            return;
        };
        if let Some(outbox) = self.outboxes.get(&frame.session_id) {
            let _ = outbox.send(frame.to_json());
        }
    }
}

/// Tracks whether a reply stream is currently active per session, so the
/// per-connection audio pipeline can tell the VAD to ignore captured audio
/// while the assistant is speaking, so barge-in can be detected.
pub struct AiResponseTracker {
    responding: DashMap<SessionId, AtomicBool>,
}

impl AiResponseTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            responding: DashMap::new(),
        })
    }

    pub fn is_responding(&self, session_id: &SessionId) -> bool {
        self.responding
            .get(session_id)
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    fn set(&self, session_id: &SessionId, value: bool) {
        match self.responding.get(session_id) {
            Some(flag) => flag.store(value, Ordering::Relaxed),
            None => {
                self.responding.insert(session_id.clone(), AtomicBool::new(value));
            }
        }
    }
}

#[async_trait]
impl EventHandler for AiResponseTracker {
    async fn handle(&self, event: &Event) {
        match event {
            Event::ResponseStarted { session_id, .. } => self.set(session_id, true),
            Event::ResponseDone { session_id, .. } | Event::ResponseCancelled { session_id, .. } => {
                self.set(session_id, false)
            }
            Event::SessionFinalized { session_id } => {
                self.responding.remove(session_id);
            }
            _ => {}
        }
    }
}
