//! Context Manager: builds a bounded, relevance-ranked context
//! for an LLM call from confirmed conversation history.

use std::collections::{HashMap, HashSet};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::data::session::SessionId;
use crate::data::transcript::{ConversationTurn, TranscriptSegment};

use super::entities::{extract_entities, extract_topics};

pub const MAX_MESSAGES_PER_CONTEXT: usize = 15;
const ALWAYS_KEEP_RECENT: usize = 5;
const MIN_RELEVANCE: f32 = 0.3;
pub const MAX_CONTEXT_TOKENS: usize = 3000;
pub const CONTEXT_TTL_MS: u64 = 30 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextMessage {
    pub role: Role,
    pub text: String,
    pub timestamp_ms: u64,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContextMetadata {
    pub topics: Vec<String>,
    pub entities: Vec<String>,
    pub est_tokens: usize,
}

/// Ordered messages, system prompt, and metadata for one LLM call.
/// Immutable once built; a fresh one is produced per LLM call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContext {
    pub ordered_messages: Vec<ContextMessage>,
    pub system_prompt: String,
    pub metadata: ContextMetadata,
}

struct SessionContextData {
    turns: Vec<ConversationTurn>,
    last_activity_ms: u64,
}

/// Estimate tokens as `chars / 4`.
fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

fn relevance_score(
    message: &ContextMessage,
    position_from_oldest: usize,
    total: usize,
    current_entities: &HashSet<String>,
    current_topics: &HashSet<String>,
) -> f32 {
    let recency = if total <= 1 {
        1.0
    } else {
        position_from_oldest as f32 / (total - 1) as f32
    };

    let msg_entities: HashSet<String> = extract_entities(&message.text).into_iter().collect();
    let entity_overlap = if current_entities.is_empty() {
        0.0
    } else {
        msg_entities.intersection(current_entities).count() as f32 / current_entities.len() as f32
    };

    let msg_topics: HashSet<String> = extract_topics(&message.text).into_iter().collect();
    let topic_overlap = if current_topics.is_empty() {
        0.0
    } else {
        msg_topics.intersection(current_topics).count() as f32 / current_topics.len() as f32
    };

    0.4 * recency + 0.3 * entity_overlap + 0.2 * topic_overlap + 0.1 * message.confidence
}

fn build_system_prompt(avg_confidence: f32, topics: &[String], turn_count: usize) -> String {
    let mut prompt = String::from(
        "You are a helpful voice assistant. Keep replies concise and conversational.",
    );
    if avg_confidence < 0.75 {
        prompt.push_str(
            " The transcript may contain recognition errors; ask for clarification on ambiguous requests.",
        );
    }
    if !topics.is_empty() {
        prompt.push_str(&format!(" Recent topics: {}.", topics.join(", ")));
    }
    if turn_count > 10 {
        prompt.push_str(" This is a long-running conversation; stay consistent with earlier answers.");
    }
    prompt
}

/// Owns per-session conversation history and builds bounded LLM contexts.
pub struct ContextManager {
    sessions: DashMap<SessionId, Mutex<SessionContextData>>,
}

impl ContextManager {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn register_session(&self, session_id: SessionId, now_ms: u64) {
        self.sessions.entry(session_id).or_insert_with(|| {
            Mutex::new(SessionContextData {
                turns: Vec::new(),
                last_activity_ms: now_ms,
            })
        });
    }

    pub fn remove_session(&self, session_id: &SessionId) {
        self.sessions.remove(session_id);
    }

    /// Append a completed turn: only on LLM completion, never from
    /// partial/streaming tokens, mirroring the confirmed-only rule for
    /// the conversation transcript.
    pub fn add_turn(&self, session_id: &SessionId, turn: ConversationTurn, now_ms: u64) {
        if let Some(entry) = self.sessions.get(session_id) {
            let mut data = entry.lock();
            data.turns.push(turn);
            data.last_activity_ms = now_ms;
        }
    }

    /// Build a bounded context from history plus any confirmed-but-not-yet
    /// turned segments still pending a reply.
    pub fn build_context(
        &self,
        session_id: &SessionId,
        pending_segments: &[TranscriptSegment],
        now_ms: u64,
    ) -> ConversationContext {
        let Some(entry) = self.sessions.get(session_id) else {
            return ConversationContext {
                ordered_messages: Vec::new(),
                system_prompt: build_system_prompt(1.0, &[], 0),
                metadata: ContextMetadata::default(),
            };
        };
        let mut data = entry.lock();
        data.last_activity_ms = now_ms;

        let mut messages: Vec<ContextMessage> = Vec::new();
        for turn in &data.turns {
            messages.push(ContextMessage {
                role: Role::User,
                text: turn.user_text.clone(),
                timestamp_ms: turn.timestamp_ms,
                confidence: 1.0,
            });
            messages.push(ContextMessage {
                role: Role::Assistant,
                text: turn.assistant_text.clone(),
                timestamp_ms: turn.timestamp_ms,
                confidence: 1.0,
            });
        }
        for segment in pending_segments {
            messages.push(ContextMessage {
                role: Role::User,
                text: segment.text.clone(),
                timestamp_ms: segment.timestamp_ms,
                confidence: segment.confidence,
            });
        }

        // Dedupe identical (role, text) pairs, keep first occurrence.
        let mut dedup_seen: HashSet<(Role, String)> = HashSet::new();
        messages.retain(|m| dedup_seen.insert((m.role, m.text.clone())));
        messages.sort_by_key(|m| m.timestamp_ms);

        let full_text: String = messages.iter().map(|m| m.text.as_str()).collect::<Vec<_>>().join(" ");
        let current_entities: HashSet<String> = extract_entities(&full_text).into_iter().collect();
        let current_topics: HashSet<String> = extract_topics(&full_text).into_iter().collect();

        let total = messages.len();
        let recent_cut = total.saturating_sub(ALWAYS_KEEP_RECENT);
        let (older, recent) = messages.split_at(recent_cut);

        let mut scored: Vec<(f32, ContextMessage)> = older
            .iter()
            .enumerate()
            .map(|(idx, m)| {
                (
                    relevance_score(m, idx, total, &current_entities, &current_topics),
                    m.clone(),
                )
            })
            .filter(|(score, _)| *score >= MIN_RELEVANCE)
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap());

        let mut recent_vec: Vec<ContextMessage> = recent.to_vec();
        let mut est_tokens: usize = recent_vec.iter().map(|m| estimate_tokens(&m.text)).sum();
        // The "always keep" window isn't exempt from the token budget: if it
        // alone is over MAX_CONTEXT_TOKENS, drop its oldest members first,
        // keeping at least the single most recent message.
        while est_tokens > MAX_CONTEXT_TOKENS && recent_vec.len() > 1 {
            let dropped = recent_vec.remove(0);
            est_tokens -= estimate_tokens(&dropped.text);
        }

        let remaining_slots = MAX_MESSAGES_PER_CONTEXT.saturating_sub(recent_vec.len());
        let mut selected: Vec<(f32, ContextMessage)> =
            scored.into_iter().take(remaining_slots).collect();

        // Enforce the token budget by dropping lowest-score non-recent
        // messages first.
        selected.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap());
        let mut kept_older = Vec::new();
        for (score, m) in selected {
            let tokens = estimate_tokens(&m.text);
            if est_tokens + tokens > MAX_CONTEXT_TOKENS {
                continue;
            }
            est_tokens += tokens;
            kept_older.push((score, m));
        }

        let mut ordered_messages: Vec<ContextMessage> =
            kept_older.into_iter().map(|(_, m)| m).collect();
        ordered_messages.extend(recent_vec);
        ordered_messages.sort_by_key(|m| m.timestamp_ms);

        let avg_confidence = if ordered_messages.is_empty() {
            1.0
        } else {
            ordered_messages.iter().map(|m| m.confidence).sum::<f32>() / ordered_messages.len() as f32
        };
        let topics: Vec<String> = current_topics.into_iter().collect();
        let entities: Vec<String> = current_entities.into_iter().collect();

        ConversationContext {
            system_prompt: build_system_prompt(avg_confidence, &topics, data.turns.len()),
            metadata: ContextMetadata {
                topics,
                entities,
                est_tokens,
            },
            ordered_messages,
        }
    }

    /// Janitor sweep: evict sessions idle past `CONTEXT_TTL_MS`.
    /// Returns the evicted session ids.
    pub fn evict_stale(&self, now_ms: u64) -> Vec<SessionId> {
        let stale: Vec<SessionId> = self
            .sessions
            .iter()
            .filter_map(|entry| {
                let data = entry.value().lock();
                if now_ms.saturating_sub(data.last_activity_ms) > CONTEXT_TTL_MS {
                    Some(entry.key().clone())
                } else {
                    None
                }
            })
            .collect();
        for id in &stale {
            self.sessions.remove(id);
        }
        stale
    }
}

impl Default for ContextManager {
    fn default() -> Self {
        Self::new()
    }
}
