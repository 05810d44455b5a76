//! End-to-end conversation scenarios wiring the event bus, transcript
//! buffers, context manager, scheduler, and orchestrator together, the way
//! `server::state::AppState` does for a live connection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use convo_core::bus::{EventBus, EventHandler};
use convo_core::context::ContextManager;
use convo_core::data::event::Event;
use convo_core::data::session::SessionId;
use convo_core::error::Result;
use convo_core::executor::Scheduler;
use convo_core::orchestrator::{ConversationOrchestrator, OrchestratorConfig, ResponseDelayConfig};
use convo_core::provider::{GenerateRequest, GenerateResponse, GenerationStream, LlmProvider, StreamEvent};
use convo_core::transcript::TranscriptBufferManager;
use convo_core::Error;

struct RecordingHandler(Arc<Mutex<Vec<Event>>>);

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: &Event) {
        self.0.lock().push(event.clone());
    }
}

/// Fixed-reply stub. `token_delay` spaces out streamed tokens so a test can
/// interrupt mid-response; `fail_streaming` exercises the orchestrator's
/// fallback to a synthesized, non-streaming reply.
struct StubLlm {
    reply: &'static str,
    token_delay: Duration,
    fail_streaming: bool,
}

struct StubStream {
    tokens: std::vec::IntoIter<String>,
    delay: Duration,
    accumulated: String,
    done_emitted: bool,
}

#[async_trait]
impl GenerationStream for StubStream {
    async fn next_event(&mut self) -> Option<Result<StreamEvent>> {
        if self.done_emitted {
            return None;
        }
        match self.tokens.next() {
            Some(token) => {
                tokio::time::sleep(self.delay).await;
                self.accumulated.push_str(&token);
                Some(Ok(StreamEvent::Token(token)))
            }
            None => {
                self.done_emitted = true;
                Some(Ok(StreamEvent::Done(GenerateResponse {
                    text: self.accumulated.clone(),
                })))
            }
        }
    }

    // Cancellation is driven by `ResponseStreamHandle`, checked by the
    // streamer between calls to `next_event`; the stream itself has nothing
    // further to tear down.
    fn cancel(&mut self) {}
}

#[async_trait]
impl LlmProvider for StubLlm {
    async fn generate(&self, _req: GenerateRequest) -> Result<GenerateResponse> {
        Ok(GenerateResponse {
            text: self.reply.to_string(),
        })
    }

    async fn generate_streaming(&self, _req: GenerateRequest) -> Result<Box<dyn GenerationStream>> {
        if self.fail_streaming {
            return Err(Error::LlmTransient("stub streaming unavailable".to_string()));
        }
        let tokens = self.reply.split(' ').map(|w| format!("{w} ")).collect::<Vec<_>>();
        Ok(Box::new(StubStream {
            tokens: tokens.into_iter(),
            delay: self.token_delay,
            accumulated: String::new(),
            done_emitted: false,
        }))
    }
}

/// Orchestrator config with short, deterministic response delays so tests
/// don't wait on the production defaults (up to 3s for a natural gap).
fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        response_delay: ResponseDelayConfig {
            user_waiting_ms: 5,
            end_of_thought_ms: 5,
            natural_gap_ms: 5,
        },
        max_stt_failures_in_window: 2,
        stt_failure_window_ms: 60_000,
    }
}

struct Harness {
    bus: Arc<EventBus>,
    orchestrator: Arc<ConversationOrchestrator>,
    events: Arc<Mutex<Vec<Event>>>,
}

fn build_harness(llm: Arc<dyn LlmProvider>, config: OrchestratorConfig) -> Harness {
    let events = Arc::new(Mutex::new(Vec::new()));
    let bus = EventBus::new(vec![Arc::new(RecordingHandler(events.clone()))]);
    let transcripts = Arc::new(TranscriptBufferManager::new(50));
    let contexts = Arc::new(ContextManager::new());
    let scheduler = Arc::new(Scheduler::new());
    let orchestrator = Arc::new(ConversationOrchestrator::new(
        bus.clone(),
        transcripts,
        contexts,
        scheduler,
        llm,
        config,
    ));
    bus.register_handler(orchestrator.clone());
    Harness {
        bus,
        orchestrator,
        events,
    }
}

impl Harness {
    async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    fn events_snapshot(&self) -> Vec<Event> {
        self.events.lock().clone()
    }
}

#[tokio::test]
async fn confirmed_utterance_followed_by_end_of_thought_silence_produces_a_full_reply() {
    let llm = Arc::new(StubLlm {
        reply: "hello there",
        token_delay: Duration::from_millis(1),
        fail_streaming: false,
    });
    let h = build_harness(llm, fast_config());
    let sid = SessionId::from("s1");

    h.bus.publish(Event::AudioSessionInit { session_id: sid.clone() }).await;
    h.settle().await;

    h.bus
        .publish(Event::SpeechStart {
            session_id: sid.clone(),
            timestamp_ms: 0,
        })
        .await;
    h.bus
        .publish(Event::FinalTranscript {
            session_id: sid.clone(),
            text: "what is the weather".to_string(),
            confidence: 0.95,
            timestamp_ms: 0,
        })
        .await;
    h.bus
        .publish(Event::SilenceDetected {
            session_id: sid.clone(),
            pause_type: convo_core::data::audio::PauseType::EndOfThought,
            duration_ms: 1500,
        })
        .await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    let events = h.events_snapshot();

    assert!(events.iter().any(|e| matches!(e, Event::TriggerGenerate { .. })));
    assert!(events.iter().any(|e| matches!(e, Event::ResponseStarted { .. })));
    assert!(events.iter().any(|e| matches!(e, Event::Token { .. })));
    let done = events.iter().find_map(|e| match e {
        Event::ResponseDone { full_text, .. } => Some(full_text.clone()),
        _ => None,
    });
    assert_eq!(done, Some("hello there ".to_string()));
}

#[tokio::test]
async fn speech_start_mid_response_cancels_it_as_barge_in() {
    let llm = Arc::new(StubLlm {
        reply: "one two three four five",
        token_delay: Duration::from_millis(60),
        fail_streaming: false,
    });
    let h = build_harness(llm, fast_config());
    let sid = SessionId::from("s1");

    h.bus.publish(Event::AudioSessionInit { session_id: sid.clone() }).await;
    h.settle().await;
    h.bus
        .publish(Event::SpeechStart {
            session_id: sid.clone(),
            timestamp_ms: 0,
        })
        .await;
    h.bus
        .publish(Event::FinalTranscript {
            session_id: sid.clone(),
            text: "tell me a long story".to_string(),
            confidence: 0.9,
            timestamp_ms: 0,
        })
        .await;
    h.bus
        .publish(Event::SilenceDetected {
            session_id: sid.clone(),
            pause_type: convo_core::data::audio::PauseType::EndOfThought,
            duration_ms: 1500,
        })
        .await;

    // Let generation start and stream out the first token, then barge in.
    tokio::time::sleep(Duration::from_millis(120)).await;
    h.bus
        .publish(Event::SpeechStart {
            session_id: sid.clone(),
            timestamp_ms: 1,
        })
        .await;

    tokio::time::sleep(Duration::from_millis(150)).await;
    let events = h.events_snapshot();

    assert!(events.iter().any(|e| matches!(e, Event::ResponseCancelled { .. })));
    assert!(!events.iter().any(|e| matches!(e, Event::ResponseDone { .. })));
    let token_count = events.iter().filter(|e| matches!(e, Event::Token { .. })).count();
    assert!(token_count < 5, "barge-in should cut the stream short, got {token_count} tokens");
}

#[tokio::test]
async fn low_confidence_final_transcript_never_triggers_generation() {
    let llm = Arc::new(StubLlm {
        reply: "should not be heard",
        token_delay: Duration::from_millis(1),
        fail_streaming: false,
    });
    let h = build_harness(llm, fast_config());
    let sid = SessionId::from("s1");

    h.bus.publish(Event::AudioSessionInit { session_id: sid.clone() }).await;
    h.settle().await;
    h.bus
        .publish(Event::SpeechStart {
            session_id: sid.clone(),
            timestamp_ms: 0,
        })
        .await;
    h.bus
        .publish(Event::FinalTranscript {
            session_id: sid.clone(),
            text: "mumbled words".to_string(),
            confidence: 0.2,
            timestamp_ms: 0,
        })
        .await;
    h.bus
        .publish(Event::SilenceDetected {
            session_id: sid.clone(),
            pause_type: convo_core::data::audio::PauseType::EndOfThought,
            duration_ms: 1500,
        })
        .await;

    tokio::time::sleep(Duration::from_millis(150)).await;
    let events = h.events_snapshot();
    assert!(!events.iter().any(|e| matches!(e, Event::TriggerGenerate { .. })));
    assert!(!events.iter().any(|e| matches!(e, Event::ResponseStarted { .. })));
}

#[tokio::test]
async fn persistent_stt_failures_surface_an_error_event() {
    let llm = Arc::new(StubLlm {
        reply: "n/a",
        token_delay: Duration::from_millis(1),
        fail_streaming: false,
    });
    let h = build_harness(llm, fast_config());
    let sid = SessionId::from("s1");

    h.bus.publish(Event::AudioSessionInit { session_id: sid.clone() }).await;
    h.settle().await;

    // max_stt_failures_in_window is 2; the 3rd failure in the window trips it.
    h.orchestrator.report_stt_failure(&sid);
    h.orchestrator.report_stt_failure(&sid);
    h.orchestrator.report_stt_failure(&sid);

    h.settle().await;
    let events = h.events_snapshot();
    assert!(events.iter().any(|e| matches!(
        e,
        Event::Error { code, .. } if code == "stt_unavailable"
    )));
}

#[tokio::test]
async fn streaming_failure_falls_back_to_a_synthesized_reply() {
    let llm = Arc::new(StubLlm {
        reply: "fallback reply text",
        token_delay: Duration::from_millis(1),
        fail_streaming: true,
    });
    let h = build_harness(llm, fast_config());
    let sid = SessionId::from("s1");

    h.bus.publish(Event::AudioSessionInit { session_id: sid.clone() }).await;
    h.settle().await;
    h.bus
        .publish(Event::SpeechStart {
            session_id: sid.clone(),
            timestamp_ms: 0,
        })
        .await;
    h.bus
        .publish(Event::FinalTranscript {
            session_id: sid.clone(),
            text: "question".to_string(),
            confidence: 0.9,
            timestamp_ms: 0,
        })
        .await;
    h.bus
        .publish(Event::SilenceDetected {
            session_id: sid.clone(),
            pause_type: convo_core::data::audio::PauseType::EndOfThought,
            duration_ms: 1500,
        })
        .await;

    tokio::time::sleep(Duration::from_millis(400)).await;
    let events = h.events_snapshot();
    let done = events.iter().find_map(|e| match e {
        Event::ResponseDone { full_text, .. } => Some(full_text.clone()),
        _ => None,
    });
    assert_eq!(done, Some("fallback reply text".to_string()));
    assert!(!events.iter().any(|e| matches!(e, Event::Error { code, .. } if code == "ai_unavailable")));
}

#[tokio::test]
async fn session_finalized_drains_pending_confirmed_segments_into_a_reply() {
    let llm = Arc::new(StubLlm {
        reply: "closing reply",
        token_delay: Duration::from_millis(1),
        fail_streaming: false,
    });
    let h = build_harness(llm, fast_config());
    let sid = SessionId::from("s1");

    h.bus.publish(Event::AudioSessionInit { session_id: sid.clone() }).await;
    h.settle().await;
    h.bus
        .publish(Event::SpeechStart {
            session_id: sid.clone(),
            timestamp_ms: 0,
        })
        .await;
    h.bus
        .publish(Event::FinalTranscript {
            session_id: sid.clone(),
            text: "one last thing".to_string(),
            confidence: 0.9,
            timestamp_ms: 0,
        })
        .await;
    // A brief, non-triggering pause settles the session into `Pausing`
    // before it's torn down (idle timeout, client disconnect) with a
    // confirmed segment still pending a reply.
    h.bus
        .publish(Event::SilenceDetected {
            session_id: sid.clone(),
            pause_type: convo_core::data::audio::PauseType::NaturalGap,
            duration_ms: 3000,
        })
        .await;
    h.bus.publish(Event::SessionFinalized { session_id: sid.clone() }).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    let events = h.events_snapshot();
    let done = events.iter().find_map(|e| match e {
        Event::ResponseDone { full_text, .. } => Some(full_text.clone()),
        _ => None,
    });
    assert_eq!(done, Some("closing reply ".to_string()));
}

#[tokio::test]
async fn generation_id_counter_advances_across_consecutive_turns() {
    let llm = Arc::new(StubLlm {
        reply: "ok",
        token_delay: Duration::from_millis(1),
        fail_streaming: false,
    });
    let h = build_harness(llm, fast_config());
    let sid = SessionId::from("s1");
    h.bus.publish(Event::AudioSessionInit { session_id: sid.clone() }).await;
    h.settle().await;

    for turn in 0..2u64 {
        h.bus
            .publish(Event::SpeechStart {
                session_id: sid.clone(),
                timestamp_ms: turn * 10_000,
            })
            .await;
        h.bus
            .publish(Event::FinalTranscript {
                session_id: sid.clone(),
                text: format!("turn {turn}"),
                confidence: 0.9,
                timestamp_ms: turn * 10_000,
            })
            .await;
        h.bus
            .publish(Event::SilenceDetected {
                session_id: sid.clone(),
                pause_type: convo_core::data::audio::PauseType::EndOfThought,
                duration_ms: 1500,
            })
            .await;
        tokio::time::sleep(Duration::from_millis(150)).await;
    }

    let events = h.events_snapshot();
    let response_ids: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            Event::ResponseStarted { response_id, .. } => Some(*response_id),
            _ => None,
        })
        .collect();
    assert_eq!(response_ids.len(), 2);
    assert!(response_ids[1] > response_ids[0]);
}
