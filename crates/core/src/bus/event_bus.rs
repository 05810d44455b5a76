//! In-process event bus with per-session ordering.
//!
//! Each session gets its own single-writer queue and worker task so events
//! for that session are delivered to every handler in arrival order.
//! Across sessions, delivery is fully parallel.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::data::event::Event;
use crate::data::session::SessionId;

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event);
}

/// Bounded per-session mailbox depth. A session producing events faster
/// than its handlers can drain is a bug elsewhere (audio ingress and STT/LLM
/// calls are rate-limited by their own pools); this is a backstop, not the
/// primary backpressure mechanism.
const SESSION_QUEUE_DEPTH: usize = 1024;

pub struct EventBus {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
    senders: DashMap<SessionId, mpsc::Sender<Event>>,
}

impl EventBus {
    pub fn new(handlers: Vec<Arc<dyn EventHandler>>) -> Arc<Self> {
        Arc::new(Self {
            handlers: RwLock::new(handlers),
            senders: DashMap::new(),
        })
    }

    /// Add a handler after construction. Used at startup when a handler
    /// (e.g. the orchestrator) itself needs a reference to the bus and so
    /// can't be built before it; not meant for use once traffic is flowing.
    pub fn register_handler(&self, handler: Arc<dyn EventHandler>) {
        self.handlers.write().push(handler);
    }

    /// Publish an event. Lazily spins up the session's worker task on first
    /// use. Never blocks the caller beyond the channel send.
    pub async fn publish(self: &Arc<Self>, event: Event) {
        let session_id = event.session_id().clone();
        let sender = self.sender_for(&session_id);
        if sender.send(event).await.is_err() {
            warn!(%session_id, "event bus session worker gone, dropping event");
        }
    }

    /// Non-blocking publish for use from synchronous callbacks (e.g. the
    /// Response Streamer's token sink) where call order must be preserved
    /// and an `.await` would risk interleaving with a concurrent publisher.
    pub fn try_publish(self: &Arc<Self>, event: Event) {
        let session_id = event.session_id().clone();
        let sender = self.sender_for(&session_id);
        if let Err(err) = sender.try_send(event) {
            warn!(%session_id, "event bus mailbox full or closed, dropping event: {err}");
        }
    }

    fn sender_for(self: &Arc<Self>, session_id: &SessionId) -> mpsc::Sender<Event> {
        if let Some(existing) = self.senders.get(session_id) {
            return existing.clone();
        }

        let (tx, rx) = mpsc::channel(SESSION_QUEUE_DEPTH);
        self.senders.insert(session_id.clone(), tx.clone());
        let bus = Arc::clone(self);
        let sid = session_id.clone();
        tokio::spawn(async move {
            bus.run_session_worker(sid, rx).await;
        });
        tx
    }

    async fn run_session_worker(self: Arc<Self>, session_id: SessionId, mut rx: mpsc::Receiver<Event>) {
        while let Some(event) = rx.recv().await {
            let handlers = self.handlers.read().clone();
            for handler in &handlers {
                let handler = Arc::clone(handler);
                let event_clone = event.clone();
                // Isolate handler panics so one broken listener never kills
                // the session's delivery order or surfaces to the publisher.
                let result = tokio::spawn(async move {
                    handler.handle(&event_clone).await;
                })
                .await;
                if let Err(join_err) = result {
                    error!(%session_id, error = %join_err, "event handler panicked");
                }
            }
        }
    }

    /// Drop the session's mailbox, ending its worker task once the channel
    /// drains (called on `SessionFinalized`).
    pub fn retire_session(&self, session_id: &SessionId) {
        self.senders.remove(session_id);
    }

    pub fn active_session_count(&self) -> usize {
        self.senders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        count: Arc<AtomicUsize>,
        order: Arc<Mutex<Vec<u64>>>,
    }

    use parking_lot::Mutex;

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(&self, event: &Event) {
            self.count.fetch_add(1, Ordering::SeqCst);
            if let Event::SpeechStart { timestamp_ms, .. } = event {
                self.order.lock().push(*timestamp_ms);
            }
        }
    }

    #[tokio::test]
    async fn delivers_events_for_a_session_in_arrival_order() {
        let count = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));
        let handler = Arc::new(CountingHandler {
            count: count.clone(),
            order: order.clone(),
        });
        let bus = EventBus::new(vec![handler]);
        let sid = SessionId::from("s1");

        for ts in [0u64, 10, 20, 30] {
            bus.publish(Event::SpeechStart {
                session_id: sid.clone(),
                timestamp_ms: ts,
            })
            .await;
        }

        // Give the worker task a moment to drain.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 4);
        assert_eq!(*order.lock(), vec![0, 10, 20, 30]);
    }

    #[tokio::test]
    async fn retiring_session_does_not_panic_subsequent_publish() {
        let handler = Arc::new(CountingHandler {
            count: Arc::new(AtomicUsize::new(0)),
            order: Arc::new(Mutex::new(Vec::new())),
        });
        let bus = EventBus::new(vec![handler]);
        let sid = SessionId::from("s1");
        bus.publish(Event::SessionFinalized {
            session_id: sid.clone(),
        })
        .await;
        bus.retire_session(&sid);
        assert_eq!(bus.active_session_count(), 0);
    }
}
