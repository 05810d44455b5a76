//! Conversation Orchestrator: couples speech/transcript events to silence
//! policy and LLM generation, and drives the per-session state machine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::bus::{EventBus, EventHandler};
use crate::context::ContextManager;
use crate::data::audio::PauseType;
use crate::data::event::Event;
use crate::data::session::{SessionId, SessionState};
use crate::data::transcript::ConversationTurn;
use crate::executor::{PoolName, Scheduler};
use crate::provider::{ChatMessage, GenerateRequest, LlmProvider};
use crate::response::{ResponseStreamer, SynthesizedStream, DEFAULT_SYNTH_TOKEN_DELAY_MS};
use crate::transcript::TranscriptBufferManager;

use super::state::{OrchestratorConfig, SessionOrchState};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Shared generation-driving state, kept behind its own `Arc` so spawned
/// generation tasks can outlive the `EventHandler::handle` call that started
/// them without the handler itself needing a self-referential `Arc`.
struct GenerationDriver {
    bus: Arc<EventBus>,
    transcripts: Arc<TranscriptBufferManager>,
    contexts: Arc<ContextManager>,
    scheduler: Arc<Scheduler>,
    llm: Arc<dyn LlmProvider>,
    sessions: DashMap<SessionId, Mutex<SessionOrchState>>,
    config: OrchestratorConfig,
    next_response_id: AtomicU64,
}

impl GenerationDriver {
    fn with_session<R>(&self, session_id: &SessionId, f: impl FnOnce(&mut SessionOrchState) -> R) -> Option<R> {
        self.sessions.get(session_id).map(|entry| f(&mut entry.lock()))
    }

    /// On `SpeechStart`: barge-in cancels any active response.
    fn handle_speech_start(&self, session_id: &SessionId) {
        self.with_session(session_id, |s| {
            if let Some(handle) = s.active_response.take() {
                handle.cancel();
            }
            s.transition_to(SessionState::Speaking);
        });
    }

    fn handle_silence(&self, session_id: &SessionId, pause_type: PauseType) {
        let should_trigger = self
            .with_session(session_id, |s| {
                s.last_pause_type = Some(pause_type);
                s.transition_to(SessionState::Pausing);
                matches!(pause_type, PauseType::EndOfThought | PauseType::UserWaiting)
            })
            .unwrap_or(false);

        if should_trigger && !self.transcripts.get_context(session_id).confirmed.is_empty() {
            self.spawn_generation(session_id.clone(), pause_type);
        }
    }

    fn handle_final_transcript(&self, session_id: &SessionId, text: String, confidence: f32, ts: u64) {
        let segment = self.transcripts.confirm_final(session_id, text, confidence, ts);
        if segment.is_none() {
            return;
        }
        let idle_trigger_pause = self.with_session(session_id, |s| s.last_pause_type).flatten();
        if matches!(
            idle_trigger_pause,
            Some(PauseType::EndOfThought) | Some(PauseType::UserWaiting)
        ) {
            self.spawn_generation(session_id.clone(), idle_trigger_pause.unwrap());
        }
    }

    fn handle_session_finalized(&self, session_id: &SessionId) {
        if !self.transcripts.get_context(session_id).confirmed.is_empty() {
            self.spawn_generation(session_id.clone(), PauseType::UserWaiting);
        }
        self.bus.retire_session(session_id);
        self.transcripts.remove_session(session_id);
        self.contexts.remove_session(session_id);
        self.sessions.remove(session_id);
    }

    fn spawn_generation(self: &Arc<Self>, session_id: SessionId, pause_type: PauseType) {
        let ready = self
            .with_session(&session_id, |s| s.transition_to(SessionState::AwaitingReply))
            .unwrap_or(false);
        if !ready {
            return;
        }

        let driver = Arc::clone(self);
        let bus = Arc::clone(&self.bus);
        tokio::spawn(async move {
            bus.publish(Event::TriggerGenerate {
                session_id: session_id.clone(),
            })
            .await;
            driver.run_generation(session_id, pause_type).await;
        });
    }

    async fn run_generation(self: Arc<Self>, session_id: SessionId, pause_type: PauseType) {
        let delay = self.config.response_delay.delay_for(pause_type);
        tokio::time::sleep(delay).await;

        let transcript_ctx = self.transcripts.get_context(&session_id);
        if transcript_ctx.confirmed.is_empty() {
            self.with_session(&session_id, |s| s.transition_to(SessionState::Listening));
            return;
        }

        let now = now_ms();
        let context = self
            .contexts
            .build_context(&session_id, &transcript_ctx.confirmed, now);
        let user_text: String = transcript_ctx
            .confirmed
            .iter()
            .map(|seg| seg.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        self.transcripts.clear(&session_id);

        let response_id = self.next_response_id.fetch_add(1, Ordering::SeqCst);
        let handle = ResponseStreamer::new_handle(response_id);
        self.with_session(&session_id, |s| {
            s.active_response = Some(handle.clone());
            s.transition_to(SessionState::Replying);
        });

        let req = GenerateRequest {
            messages: context.ordered_messages.iter().map(ChatMessage::from).collect(),
            system_prompt: context.system_prompt.clone(),
            model: "default".to_string(),
            temperature: 0.7,
            max_tokens: 512,
            streaming: true,
        };

        let llm = Arc::clone(&self.llm);
        let streaming_req = req.clone();
        let stream_result = self
            .scheduler
            .submit(PoolName::Llm, move || {
                let llm = Arc::clone(&llm);
                let req = streaming_req.clone();
                async move { llm.generate_streaming(req).await }
            })
            .await;

        let stream = match stream_result {
            Ok(stream) => stream,
            Err(err) if err.is_cancellation() => {
                self.finish_generation(&session_id);
                return;
            }
            Err(err) => {
                warn!(%session_id, error = %err, "llm streaming unavailable, falling back to synthesized stream");
                let llm = Arc::clone(&self.llm);
                let fallback_req = req.clone();
                match self
                    .scheduler
                    .submit(PoolName::Llm, move || {
                        let llm = Arc::clone(&llm);
                        let req = fallback_req.clone();
                        async move { llm.generate(req).await }
                    })
                    .await
                {
                    Ok(response) => Box::new(SynthesizedStream::new(
                        &response.text,
                        std::time::Duration::from_millis(DEFAULT_SYNTH_TOKEN_DELAY_MS),
                    )) as Box<dyn crate::provider::GenerationStream>,
                    Err(err) => {
                        self.bus.try_publish(Event::Error {
                            session_id: session_id.clone(),
                            code: "ai_unavailable".to_string(),
                            message: err.to_string(),
                        });
                        self.finish_generation(&session_id);
                        return;
                    }
                }
            }
        };

        let bus = Arc::clone(&self.bus);
        let full_text = ResponseStreamer::run(&session_id, &handle, stream, |event| {
            bus.try_publish(event);
        })
        .await;

        if let Some(text) = &full_text {
            self.contexts.add_turn(
                &session_id,
                ConversationTurn {
                    user_text,
                    assistant_text: text.clone(),
                    timestamp_ms: now_ms(),
                },
                now_ms(),
            );
        }
        self.finish_generation(&session_id);
    }

    fn finish_generation(&self, session_id: &SessionId) {
        self.with_session(session_id, |s| {
            s.active_response = None;
            s.transition_to(SessionState::Listening);
        });
    }

    fn record_stt_failure(&self, session_id: &SessionId) {
        let count = self
            .with_session(session_id, |s| {
                s.record_stt_failure(now_ms(), self.config.stt_failure_window_ms)
            })
            .unwrap_or(0);
        if count as u32 > self.config.max_stt_failures_in_window {
            self.bus.try_publish(Event::Error {
                session_id: session_id.clone(),
                code: "stt_unavailable".to_string(),
                message: "speech recognition has failed repeatedly".to_string(),
            });
        }
    }
}

/// Public handle registered on the `EventBus`. Delegates to `GenerationDriver`
/// for everything that needs to outlive one event dispatch.
pub struct ConversationOrchestrator {
    driver: Arc<GenerationDriver>,
}

impl ConversationOrchestrator {
    pub fn new(
        bus: Arc<EventBus>,
        transcripts: Arc<TranscriptBufferManager>,
        contexts: Arc<ContextManager>,
        scheduler: Arc<Scheduler>,
        llm: Arc<dyn LlmProvider>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            driver: Arc::new(GenerationDriver {
                bus,
                transcripts,
                contexts,
                scheduler,
                llm,
                sessions: DashMap::new(),
                config,
                next_response_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn register_session(&self, session_id: SessionId) {
        self.driver
            .sessions
            .entry(session_id.clone())
            .or_insert_with(|| Mutex::new(SessionOrchState::new()));
        self.driver.contexts.register_session(session_id.clone(), now_ms());
        self.driver.transcripts.register_session(session_id.clone());
        self.driver
            .with_session(&session_id, |s| s.transition_to(SessionState::Listening));
    }

    /// STT pipeline failures are reported here rather than via the bus so
    /// the orchestrator can count them per session without subscribing to a
    /// new event kind just for persistent STT failure.
    pub fn report_stt_failure(&self, session_id: &SessionId) {
        self.driver.record_stt_failure(session_id);
    }
}

#[async_trait]
impl EventHandler for ConversationOrchestrator {
    async fn handle(&self, event: &Event) {
        match event {
            Event::AudioSessionInit { session_id } => {
                self.register_session(session_id.clone());
                info!(%session_id, "session registered with orchestrator");
            }
            Event::SpeechStart { session_id, .. } => {
                self.driver.handle_speech_start(session_id);
            }
            Event::SilenceDetected {
                session_id,
                pause_type,
                ..
            } => {
                self.driver.handle_silence(session_id, *pause_type);
            }
            Event::PartialTranscript {
                session_id,
                text,
                confidence,
                timestamp_ms,
            } => {
                self.driver
                    .transcripts
                    .update_partial(session_id, text.clone(), *confidence, *timestamp_ms);
            }
            Event::FinalTranscript {
                session_id,
                text,
                confidence,
                timestamp_ms,
            } => {
                self.driver
                    .handle_final_transcript(session_id, text.clone(), *confidence, *timestamp_ms);
            }
            Event::SessionFinalized { session_id } => {
                self.driver.handle_session_finalized(session_id);
            }
            _ => {}
        }
    }
}
