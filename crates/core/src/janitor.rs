//! Janitor: periodic sweep for session inactivity and stale context data.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use tracing::info;

use crate::bus::EventBus;
use crate::context::ContextManager;
use crate::data::event::Event;
use crate::data::session::SessionId;

/// Matches the Audio Stream Processor's buffer cap; reused here
/// as the default session-inactivity threshold.
pub const DEFAULT_MAX_IDLE_MS: u64 = 30_000;

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Tracks per-session last-activity and periodically finalizes idle
/// sessions and evicts stale context data.
pub struct Janitor {
    bus: Arc<EventBus>,
    contexts: Arc<ContextManager>,
    last_activity: DashMap<SessionId, AtomicU64>,
    max_idle_ms: u64,
}

impl Janitor {
    pub fn new(bus: Arc<EventBus>, contexts: Arc<ContextManager>, max_idle_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            bus,
            contexts,
            last_activity: DashMap::new(),
            max_idle_ms,
        })
    }

    /// Record activity for `session_id` (called on any inbound audio chunk
    /// or client frame). Registers the session if unseen.
    pub fn touch(&self, session_id: &SessionId) {
        let now = now_ms();
        match self.last_activity.get(session_id) {
            Some(entry) => entry.store(now, Ordering::Relaxed),
            None => {
                self.last_activity.insert(session_id.clone(), AtomicU64::new(now));
            }
        }
    }

    pub fn remove_session(&self, session_id: &SessionId) {
        self.last_activity.remove(session_id);
    }

    /// Spawn the periodic sweep task. Returns immediately; runs until the
    /// process exits.
    pub fn spawn(self: &Arc<Self>) {
        let janitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            loop {
                interval.tick().await;
                janitor.sweep_once().await;
            }
        });
    }

    async fn sweep_once(&self) {
        let now = now_ms();

        let idle: Vec<SessionId> = self
            .last_activity
            .iter()
            .filter_map(|entry| {
                let last = entry.value().load(Ordering::Relaxed);
                if now.saturating_sub(last) > self.max_idle_ms {
                    Some(entry.key().clone())
                } else {
                    None
                }
            })
            .collect();

        for session_id in idle {
            info!(%session_id, "janitor finalizing idle session");
            self.bus
                .publish(Event::SessionFinalized {
                    session_id: session_id.clone(),
                })
                .await;
            self.last_activity.remove(&session_id);
        }

        let stale_contexts = self.contexts.evict_stale(now);
        for session_id in stale_contexts {
            info!(%session_id, "janitor evicted stale context data");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventHandler;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct RecordingHandler(Arc<Mutex<Vec<Event>>>);

    #[async_trait]
    impl EventHandler for RecordingHandler {
        async fn handle(&self, event: &Event) {
            self.0.lock().push(event.clone());
        }
    }

    #[tokio::test]
    async fn sweep_finalizes_sessions_idle_past_threshold() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let bus = EventBus::new(vec![Arc::new(RecordingHandler(events.clone()))]);
        let contexts = Arc::new(ContextManager::new());
        let janitor = Janitor::new(bus, contexts, 10);

        let sid = SessionId::from("s1");
        janitor.touch(&sid);
        tokio::time::sleep(Duration::from_millis(20)).await;
        janitor.sweep_once().await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        let recorded = events.lock();
        assert!(recorded
            .iter()
            .any(|e| matches!(e, Event::SessionFinalized { session_id } if *session_id == sid)));
    }

    #[tokio::test]
    async fn sweep_skips_recently_active_sessions() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let bus = EventBus::new(vec![Arc::new(RecordingHandler(events.clone()))]);
        let contexts = Arc::new(ContextManager::new());
        let janitor = Janitor::new(bus, contexts, 60_000);

        let sid = SessionId::from("s1");
        janitor.touch(&sid);
        janitor.sweep_once().await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(events.lock().is_empty());
    }
}
