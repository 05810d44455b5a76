//! Per-session audio ingestion: ring buffer, VAD invocation, STT trigger
//! decisions.

use crate::data::audio::{AudioChunk, PauseType};
use crate::data::event::Event;
use crate::data::session::SessionId;
use crate::vad::{VadConfig, VadDetector, VadTransition};

use super::ring_buffer::AudioRingBuffer;

/// A decision to hand bytes to the STT adapter. The processor only decides
/// *when*; the actual call happens on the STT pool, kept out of this
/// module so ingress never awaits an external boundary.
#[derive(Debug, Clone)]
pub enum SttTrigger {
    /// Enough new speech bytes accumulated since the last trigger.
    Chunk(Vec<u8>),
    /// An `EndOfThought` pause was observed; flush accumulated speech.
    EndOfThought(Vec<u8>),
    /// `Close()` was called; flush whatever remains, bounded externally by
    /// a 5s deadline.
    FinalFlush(Vec<u8>),
}

#[derive(Debug, Default)]
pub struct ProcessOutcome {
    pub events: Vec<Event>,
    pub stt_trigger: Option<SttTrigger>,
}

#[derive(Debug, Clone, Copy)]
pub struct AudioProcessorConfig {
    pub max_buffer_duration_ms: u64,
    pub sample_rate: u32,
    /// Accumulate at least this many new speech bytes before triggering a
    /// streaming STT chunk.
    pub trigger_bytes: usize,
    pub vad: VadConfig,
}

impl Default for AudioProcessorConfig {
    fn default() -> Self {
        Self {
            max_buffer_duration_ms: 30_000,
            sample_rate: 16_000,
            trigger_bytes: 3_200, // ~100ms at 16kHz/16-bit mono
            vad: VadConfig::default(),
        }
    }
}

/// One instance per session, owned by the orchestrator's session task.
pub struct AudioStreamProcessor {
    session_id: SessionId,
    config: AudioProcessorConfig,
    ring: AudioRingBuffer,
    vad: VadDetector,
    speech_bytes_since_trigger: Vec<u8>,
    closed: bool,
}

impl AudioStreamProcessor {
    pub fn new(session_id: SessionId, config: AudioProcessorConfig) -> Self {
        let ring = AudioRingBuffer::new(config.max_buffer_duration_ms, config.sample_rate);
        let vad = VadDetector::new(config.vad);
        Self {
            session_id,
            config,
            ring,
            vad,
            speech_bytes_since_trigger: Vec::new(),
            closed: false,
        }
    }

    /// Notify the embedded VAD that a reply stream has started/stopped,
    /// so barge-in detection works.
    pub fn set_ai_responding(&mut self, responding: bool) {
        self.vad.set_ai_responding(responding);
    }

    /// Ingest one chunk. Never awaits; callers enqueue and return.
    pub fn push(&mut self, chunk: AudioChunk) -> ProcessOutcome {
        let mut outcome = ProcessOutcome::default();
        if self.closed {
            return outcome;
        }

        let Some(vad_result) = self.vad.analyze_chunk(&chunk) else {
            // Malformed frame: dropped and counted by the detector, never
            // fatal to ingress.
            return outcome;
        };

        if vad_result.has_voice {
            self.speech_bytes_since_trigger
                .extend_from_slice(&chunk.pcm16le);
        }

        self.ring.push(chunk);

        for transition in self.vad.observe(vad_result) {
            match transition {
                VadTransition::SpeechStart { timestamp_ms } => {
                    outcome.events.push(Event::SpeechStart {
                        session_id: self.session_id.clone(),
                        timestamp_ms,
                    });
                }
                VadTransition::SilenceDetected {
                    pause_type,
                    duration_ms,
                } => {
                    outcome.events.push(Event::SilenceDetected {
                        session_id: self.session_id.clone(),
                        pause_type,
                        duration_ms,
                    });
                    if pause_type == PauseType::EndOfThought && !self.speech_bytes_since_trigger.is_empty()
                    {
                        outcome.stt_trigger = Some(SttTrigger::EndOfThought(
                            std::mem::take(&mut self.speech_bytes_since_trigger),
                        ));
                    }
                }
            }
        }

        if outcome.stt_trigger.is_none()
            && self.speech_bytes_since_trigger.len() >= self.config.trigger_bytes
        {
            outcome.stt_trigger = Some(SttTrigger::Chunk(std::mem::take(
                &mut self.speech_bytes_since_trigger,
            )));
        }

        outcome
    }

    /// Flush unprocessed audio on session close. The caller is responsible
    /// for bounding the resulting STT call at 5s.
    pub fn close(&mut self) -> SttTrigger {
        self.closed = true;
        let mut remaining = self.ring.drain_bytes();
        remaining.extend(std::mem::take(&mut self.speech_bytes_since_trigger));
        SttTrigger::FinalFlush(remaining)
    }

    pub fn buffered_duration_ms(&self) -> u64 {
        self.ring.buffered_duration_ms()
    }

    pub fn dropped_chunk_count(&self) -> u64 {
        self.ring.dropped_chunk_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voiced_chunk(seq: u64, ts: u64) -> AudioChunk {
        let samples = vec![0.5f32; 160];
        let pcm: Vec<u8> = samples
            .iter()
            .flat_map(|s| ((s * 32767.0) as i16).to_le_bytes())
            .collect();
        AudioChunk {
            pcm16le: pcm,
            timestamp_ms: ts,
            seq,
        }
    }

    fn silent_chunk(seq: u64, ts: u64) -> AudioChunk {
        AudioChunk {
            pcm16le: vec![0u8; 320],
            timestamp_ms: ts,
            seq,
        }
    }

    #[test]
    fn speech_start_emitted_on_first_voiced_chunk() {
        let mut p = AudioStreamProcessor::new(SessionId::from("s1"), AudioProcessorConfig::default());
        let outcome = p.push(voiced_chunk(0, 0));
        assert_eq!(outcome.events.len(), 1);
        assert!(matches!(outcome.events[0], Event::SpeechStart { .. }));
    }

    #[test]
    fn end_of_thought_triggers_stt_flush() {
        let mut p = AudioStreamProcessor::new(SessionId::from("s1"), AudioProcessorConfig::default());
        p.push(voiced_chunk(0, 0));
        p.push(silent_chunk(1, 100));
        let outcome = p.push(silent_chunk(2, 1100));
        assert!(matches!(outcome.stt_trigger, Some(SttTrigger::EndOfThought(_))));
    }

    #[test]
    fn close_flushes_remaining_audio() {
        let mut p = AudioStreamProcessor::new(SessionId::from("s1"), AudioProcessorConfig::default());
        p.push(voiced_chunk(0, 0));
        let trigger = p.close();
        match trigger {
            SttTrigger::FinalFlush(bytes) => assert!(!bytes.is_empty()),
            _ => panic!("expected FinalFlush"),
        }
    }
}
