//! Per-session orchestrator state and response-delay policy.

use std::time::Duration;

use crate::data::audio::PauseType;
use crate::data::session::SessionState;
use crate::response::ResponseStreamHandle;

/// Response-delay defaults: the delay before submitting a
/// generation job, chosen by how the silence that triggered it classifies.
#[derive(Debug, Clone, Copy)]
pub struct ResponseDelayConfig {
    pub user_waiting_ms: u64,
    pub end_of_thought_ms: u64,
    pub natural_gap_ms: u64,
}

impl Default for ResponseDelayConfig {
    fn default() -> Self {
        Self {
            user_waiting_ms: 750,
            end_of_thought_ms: 1500,
            natural_gap_ms: 3000,
        }
    }
}

impl ResponseDelayConfig {
    pub fn delay_for(&self, pause_type: PauseType) -> Duration {
        let ms = match pause_type {
            PauseType::UserWaiting => self.user_waiting_ms,
            PauseType::EndOfThought => self.end_of_thought_ms,
            PauseType::NaturalGap | PauseType::ShortPause => self.natural_gap_ms,
        };
        Duration::from_millis(ms)
    }
}

/// How many STT failures within `stt_failure_window_ms` before the
/// orchestrator surfaces a persistent-failure error to the client.
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    pub response_delay: ResponseDelayConfig,
    pub max_stt_failures_in_window: u32,
    pub stt_failure_window_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            response_delay: ResponseDelayConfig::default(),
            max_stt_failures_in_window: 3,
            stt_failure_window_ms: 30_000,
        }
    }
}

/// Mutable per-session orchestrator bookkeeping. Guarded by that session's
/// own `Mutex`, never shared across sessions.
pub(super) struct SessionOrchState {
    pub state: SessionState,
    pub active_response: Option<ResponseStreamHandle>,
    pub last_pause_type: Option<PauseType>,
    pub stt_failure_timestamps_ms: Vec<u64>,
}

impl SessionOrchState {
    pub fn new() -> Self {
        Self {
            state: SessionState::Init,
            active_response: None,
            last_pause_type: None,
            stt_failure_timestamps_ms: Vec::new(),
        }
    }

    /// Transition if legal; no-op (state unchanged) otherwise. Illegal
    /// transitions are a sign the orchestrator's own bookkeeping drifted
    /// from the event stream, not something to panic over.
    pub fn transition_to(&mut self, next: SessionState) -> bool {
        if self.state.can_transition(next) {
            self.state = next;
            true
        } else {
            false
        }
    }

    pub fn record_stt_failure(&mut self, now_ms: u64, window_ms: u64) -> usize {
        self.stt_failure_timestamps_ms.push(now_ms);
        self.stt_failure_timestamps_ms
            .retain(|ts| now_ms.saturating_sub(*ts) <= window_ms);
        self.stt_failure_timestamps_ms.len()
    }
}
