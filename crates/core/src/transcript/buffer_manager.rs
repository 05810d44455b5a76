//! Transcript Buffer Manager: dual live/confirmed buffer per
//! session, confidence-gated confirmation, id assignment.

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::data::session::SessionId;
use crate::data::transcript::{ConfirmedBuffer, LiveBuffer, TranscriptSegment};

/// Minimum STT confidence for a final transcript to become a confirmed
/// segment or LLM input.
pub const MIN_CONFIDENCE: f32 = 0.6;

/// Debounce window: a repeated `confirm_final` with identical text within
/// this many milliseconds of the last confirmation is treated as a
/// duplicate and produces no new segment.
const DEBOUNCE_MS: u64 = 50;

/// `GetContext` result.
#[derive(Debug, Clone, Default)]
pub struct TranscriptContext {
    pub confirmed: Vec<TranscriptSegment>,
    pub live: Option<LiveBuffer>,
}

struct SessionEntry {
    live: Option<LiveBuffer>,
    confirmed: ConfirmedBuffer,
    next_id: u64,
    last_confirmed_text: Option<String>,
    last_confirmed_ts: Option<u64>,
}

impl SessionEntry {
    fn new(max_segments: usize) -> Self {
        Self {
            live: None,
            confirmed: ConfirmedBuffer::new(max_segments),
            next_id: 1,
            last_confirmed_text: None,
            last_confirmed_ts: None,
        }
    }
}

/// Per-session mutual exclusion, cross-session lock-free: a `DashMap`
/// shards sessions, each guarded by its own `Mutex`.
pub struct TranscriptBufferManager {
    sessions: DashMap<SessionId, Mutex<SessionEntry>>,
    max_segments: usize,
}

impl TranscriptBufferManager {
    pub fn new(max_segments: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            max_segments,
        }
    }

    pub fn register_session(&self, session_id: SessionId) {
        self.sessions
            .entry(session_id)
            .or_insert_with(|| Mutex::new(SessionEntry::new(self.max_segments)));
    }

    pub fn remove_session(&self, session_id: &SessionId) {
        self.sessions.remove(session_id);
    }

    /// Replace the live buffer with a new partial result.
    pub fn update_partial(&self, session_id: &SessionId, text: String, confidence: f32, ts: u64) {
        if let Some(entry) = self.sessions.get(session_id) {
            let mut entry = entry.lock();
            entry.live = Some(LiveBuffer {
                text,
                confidence,
                last_updated_ms: ts,
            });
        }
    }

    /// Commit a final transcript. Always clears the live buffer. Produces a
    /// new `ConfirmedBuffer` entry only if the text is non-empty, confidence
    /// meets `MIN_CONFIDENCE`, and this isn't a debounced duplicate of the
    /// immediately preceding confirmation.
    pub fn confirm_final(
        &self,
        session_id: &SessionId,
        text: String,
        confidence: f32,
        ts: u64,
    ) -> Option<TranscriptSegment> {
        let entry_ref = self.sessions.get(session_id)?;
        let mut entry = entry_ref.lock();
        entry.live = None;

        if text.is_empty() || confidence < MIN_CONFIDENCE {
            return None;
        }

        let is_duplicate = entry.last_confirmed_text.as_deref() == Some(text.as_str())
            && entry
                .last_confirmed_ts
                .is_some_and(|last| ts.saturating_sub(last) < DEBOUNCE_MS);
        if is_duplicate {
            return None;
        }

        let id = entry.next_id;
        entry.next_id += 1;
        let segment = TranscriptSegment {
            id,
            text: text.clone(),
            confidence,
            timestamp_ms: ts,
        };
        entry.confirmed.push(segment.clone());
        entry.last_confirmed_text = Some(text);
        entry.last_confirmed_ts = Some(ts);
        Some(segment)
    }

    pub fn get_context(&self, session_id: &SessionId) -> TranscriptContext {
        match self.sessions.get(session_id) {
            Some(entry) => {
                let entry = entry.lock();
                TranscriptContext {
                    confirmed: entry.confirmed.to_vec(),
                    live: entry.live.clone(),
                }
            }
            None => TranscriptContext::default(),
        }
    }

    /// Clear both buffers without forgetting id sequencing: ids are never
    /// reused, even across a clear.
    pub fn clear(&self, session_id: &SessionId) {
        if let Some(entry) = self.sessions.get(session_id) {
            let mut entry = entry.lock();
            entry.live = None;
            entry.confirmed.clear();
        }
    }

    /// Full reset including id sequencing, used when a session is torn down
    /// and its id is about to be reused would never happen, but tests rely
    /// on a clean slate.
    pub fn reset(&self, session_id: &SessionId) {
        if let Some(entry) = self.sessions.get(session_id) {
            let mut entry = entry.lock();
            *entry = SessionEntry::new(self.max_segments);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid() -> SessionId {
        SessionId::from("s1")
    }

    #[test]
    fn confirm_final_assigns_monotonic_ids() {
        let mgr = TranscriptBufferManager::new(10);
        mgr.register_session(sid());
        let s1 = mgr.confirm_final(&sid(), "hello".into(), 0.9, 0).unwrap();
        let s2 = mgr.confirm_final(&sid(), "world".into(), 0.9, 1000).unwrap();
        assert_eq!(s1.id, 1);
        assert_eq!(s2.id, 2);
    }

    #[test]
    fn low_confidence_final_produces_no_segment_but_clears_live() {
        let mgr = TranscriptBufferManager::new(10);
        mgr.register_session(sid());
        mgr.update_partial(&sid(), "partial".into(), 0.9, 0);
        let result = mgr.confirm_final(&sid(), "low conf".into(), 0.4, 10);
        assert!(result.is_none());
        assert!(mgr.get_context(&sid()).live.is_none());
    }

    #[test]
    fn empty_final_clears_live_produces_no_segment() {
        let mgr = TranscriptBufferManager::new(10);
        mgr.register_session(sid());
        mgr.update_partial(&sid(), "partial".into(), 0.9, 0);
        let result = mgr.confirm_final(&sid(), "".into(), 0.9, 10);
        assert!(result.is_none());
        assert!(mgr.get_context(&sid()).live.is_none());
    }

    #[test]
    fn debounced_duplicate_within_window_is_dropped() {
        let mgr = TranscriptBufferManager::new(10);
        mgr.register_session(sid());
        let first = mgr.confirm_final(&sid(), "same text".into(), 0.9, 0);
        assert!(first.is_some());
        let dup = mgr.confirm_final(&sid(), "same text".into(), 0.9, 20);
        assert!(dup.is_none());
        let later = mgr.confirm_final(&sid(), "same text".into(), 0.9, 1000);
        assert!(later.is_some());
    }

    #[test]
    fn reset_clears_id_sequencing() {
        let mgr = TranscriptBufferManager::new(10);
        mgr.register_session(sid());
        mgr.confirm_final(&sid(), "hello".into(), 0.9, 0);
        mgr.reset(&sid());
        let segment = mgr.confirm_final(&sid(), "after reset".into(), 0.9, 0).unwrap();
        assert_eq!(segment.id, 1);
        assert!(mgr.get_context(&sid()).confirmed.len() == 1);
    }
}
