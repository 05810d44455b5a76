//! Session identity, configuration, and state machine.

use serde::{Deserialize, Serialize};

/// Unique session identifier. A thin wrapper (rather than a bare `String`)
/// so it can't be confused with a transcript segment id or response id at
/// call sites.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a fresh random session id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Per-session state machine.
///
/// `Closing` is terminal from any state. All other transitions are driven
/// by the orchestrator in response to bus events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Init,
    Listening,
    Speaking,
    Pausing,
    AwaitingReply,
    Replying,
    Closing,
}

impl SessionState {
    /// Whether a transition from `self` to `next` is legal. `Closing` is
    /// reachable from any state; otherwise transitions follow the cycle
    /// `Init -> Listening -> Speaking -> Pausing -> AwaitingReply
    /// -> Replying -> Listening`, plus `Pausing -> Speaking` (voice resumes)
    /// and `Listening -> Speaking` directly (barge-in re-entry).
    pub fn can_transition(self, next: SessionState) -> bool {
        use SessionState::*;
        if next == Closing {
            return true;
        }
        matches!(
            (self, next),
            (Init, Listening)
                | (Listening, Speaking)
                | (Speaking, Pausing)
                | (Speaking, Speaking)
                | (Pausing, Speaking)
                | (Pausing, AwaitingReply)
                | (Pausing, Listening)
                | (AwaitingReply, Replying)
                | (AwaitingReply, Listening)
                | (Replying, Listening)
                | (Replying, Speaking)
        )
    }
}

/// Client-supplied session configuration, sent in `session.start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub auto_detect_language: bool,
    #[serde(default)]
    pub voice_activity_thresholds: VoiceActivityThresholds,
    #[serde(default)]
    pub audio_settings: AudioSettings,
    #[serde(default)]
    pub ai_settings: AiSettings,
    #[serde(default)]
    pub ui_settings: UiSettings,
}

fn default_language() -> String {
    "en".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            auto_detect_language: false,
            voice_activity_thresholds: VoiceActivityThresholds::default(),
            audio_settings: AudioSettings::default(),
            ai_settings: AiSettings::default(),
            ui_settings: UiSettings::default(),
        }
    }
}

/// Silence-duration thresholds in milliseconds for each pause tier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VoiceActivityThresholds {
    #[serde(default = "default_short_pause")]
    pub short_pause: u64,
    #[serde(default = "default_medium_pause")]
    pub medium_pause: u64,
    #[serde(default = "default_long_pause")]
    pub long_pause: u64,
}

fn default_short_pause() -> u64 {
    500
}
fn default_medium_pause() -> u64 {
    1000
}
fn default_long_pause() -> u64 {
    3000
}

impl Default for VoiceActivityThresholds {
    fn default() -> Self {
        Self {
            short_pause: default_short_pause(),
            medium_pause: default_medium_pause(),
            long_pause: default_long_pause(),
        }
    }
}

/// Audio capture settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AudioSettings {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

fn default_sample_rate() -> u32 {
    16_000
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
        }
    }
}

/// LLM generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiSettings {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_streaming_enabled")]
    pub streaming_enabled: bool,
}

fn default_provider() -> String {
    "default".to_string()
}
fn default_model() -> String {
    "default".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    512
}
fn default_streaming_enabled() -> bool {
    true
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            streaming_enabled: default_streaming_enabled(),
        }
    }
}

/// Client UI preferences — the core doesn't act on these beyond
/// echoing them back in `session.ready`; they shape what the client renders.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UiSettings {
    #[serde(default = "default_true")]
    pub show_live_transcript: bool,
    #[serde(default)]
    pub show_confidence_scores: bool,
    #[serde(default = "default_true")]
    pub enable_interruptions: bool,
}

fn default_true() -> bool {
    true
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            show_live_transcript: true,
            show_confidence_scores: false,
            enable_interruptions: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closing_reachable_from_any_state() {
        let states = [
            SessionState::Init,
            SessionState::Listening,
            SessionState::Speaking,
            SessionState::Pausing,
            SessionState::AwaitingReply,
            SessionState::Replying,
        ];
        for s in states {
            assert!(s.can_transition(SessionState::Closing));
        }
    }

    #[test]
    fn normal_cycle_is_legal() {
        assert!(SessionState::Init.can_transition(SessionState::Listening));
        assert!(SessionState::Listening.can_transition(SessionState::Speaking));
        assert!(SessionState::Speaking.can_transition(SessionState::Pausing));
        assert!(SessionState::Pausing.can_transition(SessionState::AwaitingReply));
        assert!(SessionState::AwaitingReply.can_transition(SessionState::Replying));
        assert!(SessionState::Replying.can_transition(SessionState::Listening));
    }

    #[test]
    fn barge_in_reentry_is_legal() {
        // Replying -> SpeechStart -> Speaking, cancelling the stream first.
        assert!(SessionState::Replying.can_transition(SessionState::Speaking));
    }

    #[test]
    fn default_config_round_trips() {
        let cfg = SessionConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: SessionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.voice_activity_thresholds.medium_pause, 1000);
    }
}
