//! Transcript and conversation-turn types.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// A committed (final) piece of transcript.
///
/// `id` is strictly increasing per session and never reused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub id: u64,
    pub text: String,
    pub confidence: f32,
    pub timestamp_ms: u64,
}

/// The current non-committed partial transcript for display. At most one
/// per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveBuffer {
    pub text: String,
    pub confidence: f32,
    pub last_updated_ms: u64,
}

/// Bounded ordered log of finalized segments: oldest drops first once
/// `max_segments` is exceeded.
#[derive(Debug, Clone, Default)]
pub struct ConfirmedBuffer {
    segments: VecDeque<TranscriptSegment>,
    max_segments: usize,
}

impl ConfirmedBuffer {
    pub fn new(max_segments: usize) -> Self {
        Self {
            segments: VecDeque::new(),
            max_segments,
        }
    }

    /// Append a segment, dropping the oldest if over capacity.
    pub fn push(&mut self, segment: TranscriptSegment) {
        self.segments.push_back(segment);
        while self.segments.len() > self.max_segments {
            self.segments.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TranscriptSegment> {
        self.segments.iter()
    }

    pub fn last(&self) -> Option<&TranscriptSegment> {
        self.segments.back()
    }

    pub fn clear(&mut self) {
        self.segments.clear();
    }

    pub fn to_vec(&self) -> Vec<TranscriptSegment> {
        self.segments.iter().cloned().collect()
    }
}

/// One completed user↔assistant exchange, appended when a reply completes.
/// Streaming tokens never populate this until `ResponseDone` (see DESIGN.md).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user_text: String,
    pub assistant_text: String,
    pub timestamp_ms: u64,
}
