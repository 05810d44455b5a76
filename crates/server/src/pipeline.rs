//! Per-connection audio ingress → STT glue. One `SessionPipeline` lives
//! inside the WebSocket read loop for the life of a connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

use convo_core::audio::{AudioProcessorConfig, AudioStreamProcessor, ProcessOutcome, SttTrigger};
use convo_core::data::audio::AudioChunk;
use convo_core::data::event::Event;
use convo_core::data::session::SessionId;
use convo_core::executor::PoolName;
use convo_core::provider::{AudioFormat, TranscriptionResult};

use crate::state::AppState;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Whether an STT trigger flush should be reported to the client as an
/// interim or committed transcript. Neither adapter shipped with this
/// service has real incremental partial results (both target
/// whisper-shaped batch APIs), so the distinction is made by the
/// Audio Stream Processor's own trigger classification instead of anything
/// the adapter reports back.
enum FlushKind {
    Partial,
    Final,
}

pub struct SessionPipeline {
    session_id: SessionId,
    state: AppState,
    processor: AudioStreamProcessor,
    seq: AtomicU64,
    language: Option<String>,
    auto_detect_language: bool,
    detected_language: Option<String>,
}

impl SessionPipeline {
    pub fn new(session_id: SessionId, state: AppState, audio_config: AudioProcessorConfig) -> Self {
        Self {
            processor: AudioStreamProcessor::new(session_id.clone(), audio_config),
            session_id,
            state,
            seq: AtomicU64::new(0),
            language: None,
            auto_detect_language: false,
            detected_language: None,
        }
    }

    pub fn configure(&mut self, language: String, auto_detect_language: bool) {
        self.language = Some(language);
        self.auto_detect_language = auto_detect_language;
    }

    /// Ingest one binary audio frame. Publishes any VAD events and spawns an
    /// STT call if the processor decided enough speech has accumulated.
    pub async fn ingest(&mut self, pcm16le: Vec<u8>) {
        self.state.janitor.touch(&self.session_id);
        self.processor
            .set_ai_responding(self.state.ai_responding.is_responding(&self.session_id));

        let chunk = AudioChunk {
            pcm16le,
            timestamp_ms: now_ms(),
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
        };
        let outcome = self.processor.push(chunk);
        self.handle_outcome(outcome).await;
    }

    /// Flush whatever audio remains, bounded by the processor's own 5s
    /// close expectation. Called on `session.end` / socket close.
    pub async fn close(&mut self) {
        let trigger = self.processor.close();
        self.run_trigger(trigger).await;
    }

    async fn handle_outcome(&mut self, outcome: ProcessOutcome) {
        for event in outcome.events {
            self.state.bus.publish(event).await;
        }
        if let Some(trigger) = outcome.stt_trigger {
            self.run_trigger(trigger).await;
        }
    }

    async fn run_trigger(&mut self, trigger: SttTrigger) {
        let (bytes, kind) = match trigger {
            SttTrigger::Chunk(bytes) => (bytes, FlushKind::Partial),
            SttTrigger::EndOfThought(bytes) => (bytes, FlushKind::Final),
            SttTrigger::FinalFlush(bytes) => (bytes, FlushKind::Final),
        };
        if bytes.is_empty() {
            return;
        }

        if self.auto_detect_language && self.detected_language.is_none() {
            self.detect_language(&bytes).await;
        }

        let stt = self.state.stt.clone();
        let language = self
            .detected_language
            .clone()
            .or_else(|| self.language.clone())
            .or_else(|| self.state.config.stt_languages.first().cloned());
        let format = AudioFormat::Pcm16Mono16k;
        let result = self
            .state
            .scheduler
            .submit(PoolName::Stt, move || {
                let stt = stt.clone();
                let bytes = bytes.clone();
                let language = language.clone();
                async move { stt.transcribe(&bytes, format, language.as_deref()).await }
            })
            .await;

        match result {
            Ok(TranscriptionResult::Success {
                text, confidence, ..
            }) => {
                let timestamp_ms = now_ms();
                let event = match kind {
                    FlushKind::Partial => Event::PartialTranscript {
                        session_id: self.session_id.clone(),
                        text,
                        confidence,
                        timestamp_ms,
                    },
                    FlushKind::Final => Event::FinalTranscript {
                        session_id: self.session_id.clone(),
                        text,
                        confidence,
                        timestamp_ms,
                    },
                };
                self.state.bus.publish(event).await;
            }
            Ok(TranscriptionResult::Empty) => {}
            Ok(TranscriptionResult::Fail { message }) => {
                warn!(session_id = %self.session_id, %message, "STT provider reported failure");
                self.state.orchestrator.report_stt_failure(&self.session_id);
            }
            Err(err) => {
                warn!(session_id = %self.session_id, error = %err, "STT call failed");
                self.state.orchestrator.report_stt_failure(&self.session_id);
            }
        }
    }

    async fn detect_language(&mut self, bytes: &[u8]) {
        let stt = self.state.stt.clone();
        let bytes = bytes.to_vec();
        let result = self
            .state
            .scheduler
            .submit(PoolName::Stt, move || {
                let stt = stt.clone();
                let bytes = bytes.clone();
                async move { stt.detect_language(&bytes, AudioFormat::Pcm16Mono16k).await }
            })
            .await;
        if let Ok(detection) = result {
            self.detected_language = Some(detection.language);
        }
    }

    pub fn buffered_duration_ms(&self) -> u64 {
        self.processor.buffered_duration_ms()
    }
}
