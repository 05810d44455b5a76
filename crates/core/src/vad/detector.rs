//! RMS energy analysis and the pause-type state machine.

use std::collections::VecDeque;

use crate::data::audio::{AudioChunk, PauseThresholds, PauseType, VadResult};

/// Coarse per-session VAD state.
///
/// `AiResponding` is entered only via an explicit external signal from the
/// orchestrator (when a reply stream starts), not derived from audio alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadState {
    Listening,
    Speaking,
    Pausing,
    WaitingForAi,
    AiResponding,
}

/// One state-machine observation worth reporting to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum VadTransition {
    /// Low → high voice transition.
    SpeechStart { timestamp_ms: u64 },
    /// Silence has persisted at least `SILENCE_THRESHOLD_MS`; reported once
    /// per threshold crossing and then again whenever the pause escalates
    /// to a new `PauseType` tier.
    SilenceDetected {
        pause_type: PauseType,
        duration_ms: u64,
    },
}

/// Configuration for the detector.
#[derive(Debug, Clone, Copy)]
pub struct VadConfig {
    /// RMS threshold above which a chunk is considered voiced (default 0.01).
    pub energy_threshold: f32,
    /// Silence must persist this long before the first `SilenceDetected`
    /// (default 800ms).
    pub silence_threshold_ms: u64,
    /// Pause-type tier boundaries.
    pub pause_thresholds: PauseThresholds,
    /// Enable the adaptive threshold (30th-percentile of recent energies,
    /// clamped to `>= energy_threshold / 2`).
    pub adaptive: bool,
    /// How many recent energy samples to retain for the adaptive threshold.
    pub adaptive_window: usize,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            energy_threshold: 0.01,
            silence_threshold_ms: 800,
            pause_thresholds: PauseThresholds::default(),
            adaptive: false,
            adaptive_window: 64,
        }
    }
}

/// Per-session VAD: energy analysis plus the pause-classification state
/// machine. One instance per session, owned by the Audio Stream Processor.
pub struct VadDetector {
    config: VadConfig,
    state: VadState,
    recent_energies: VecDeque<f32>,
    silence_start_ms: Option<u64>,
    last_reported_pause: Option<PauseType>,
    malformed_frames: u64,
}

impl VadDetector {
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            state: VadState::Listening,
            recent_energies: VecDeque::new(),
            silence_start_ms: None,
            last_reported_pause: None,
            malformed_frames: 0,
        }
    }

    pub fn state(&self) -> VadState {
        self.state
    }

    /// Count of malformed frames dropped so far.
    pub fn malformed_frames(&self) -> u64 {
        self.malformed_frames
    }

    /// Externally signal that a reply stream has started/stopped, entering
    /// or leaving `AiResponding`.
    pub fn set_ai_responding(&mut self, responding: bool) {
        self.state = if responding {
            VadState::AiResponding
        } else {
            VadState::Listening
        };
    }

    /// Normalized RMS of a PCM16 buffer: `sqrt(sum(s^2)/N) / 32768`.
    fn rms(samples_i16: &[f32]) -> f32 {
        if samples_i16.is_empty() {
            return 0.0;
        }
        // `samples_i16` here is already normalized to [-1, 1] by
        // `AudioChunk::samples_f32`, so the RMS is already in [0, 1] without
        // a further /32768 division — see `analyze_chunk`.
        let sum_sq: f32 = samples_i16.iter().map(|s| s * s).sum();
        (sum_sq / samples_i16.len() as f32).sqrt()
    }

    fn effective_threshold(&self) -> f32 {
        if !self.config.adaptive || self.recent_energies.len() < 8 {
            return self.config.energy_threshold;
        }
        let mut sorted: Vec<f32> = self.recent_energies.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let idx = ((sorted.len() as f32) * 0.30) as usize;
        let p30 = sorted[idx.min(sorted.len() - 1)];
        p30.max(self.config.energy_threshold / 2.0)
    }

    /// Compute the `VadResult` for one chunk. Malformed (empty) chunks are
    /// dropped and counted, never fatal.
    pub fn analyze_chunk(&mut self, chunk: &AudioChunk) -> Option<VadResult> {
        let samples = chunk.samples_f32();
        if samples.is_empty() {
            self.malformed_frames += 1;
            return None;
        }

        let energy = Self::rms(&samples).min(1.0);
        self.recent_energies.push_back(energy);
        while self.recent_energies.len() > self.config.adaptive_window {
            self.recent_energies.pop_front();
        }

        let threshold = self.effective_threshold();
        let has_voice = energy > threshold;
        let confidence = if has_voice {
            ((energy - threshold) / (1.0 - threshold).max(1e-6)).clamp(0.0, 1.0)
        } else {
            ((threshold - energy) / threshold.max(1e-6)).clamp(0.0, 1.0)
        };

        Some(VadResult {
            has_voice,
            energy,
            confidence,
            timestamp_ms: chunk.timestamp_ms,
        })
    }

    /// Feed a `VadResult` into the pause/speech state machine, returning any
    /// transitions worth publishing to the event bus.
    pub fn observe(&mut self, result: VadResult) -> Vec<VadTransition> {
        let mut out = Vec::new();

        if result.has_voice {
            if matches!(self.state, VadState::Pausing | VadState::WaitingForAi)
                || self.state == VadState::Listening
            {
                let was_silent = self.state != VadState::Speaking;
                self.state = VadState::Speaking;
                self.silence_start_ms = None;
                self.last_reported_pause = None;
                if was_silent {
                    out.push(VadTransition::SpeechStart {
                        timestamp_ms: result.timestamp_ms,
                    });
                }
            } else if self.state == VadState::AiResponding {
                // Barge-in: voice arrived while the assistant is replying.
                self.state = VadState::Speaking;
                self.silence_start_ms = None;
                self.last_reported_pause = None;
                out.push(VadTransition::SpeechStart {
                    timestamp_ms: result.timestamp_ms,
                });
            }
            return out;
        }

        // Silent chunk.
        match self.state {
            VadState::Speaking => {
                self.state = VadState::Pausing;
                self.silence_start_ms = Some(result.timestamp_ms);
            }
            VadState::Pausing => {
                let start = *self.silence_start_ms.get_or_insert(result.timestamp_ms);
                let duration = result.timestamp_ms.saturating_sub(start);
                if duration >= self.config.silence_threshold_ms {
                    let pause_type = PauseType::classify(duration, &self.config.pause_thresholds);
                    if self.last_reported_pause != Some(pause_type) {
                        self.last_reported_pause = Some(pause_type);
                        if pause_type == PauseType::UserWaiting {
                            self.state = VadState::WaitingForAi;
                        }
                        out.push(VadTransition::SilenceDetected {
                            pause_type,
                            duration_ms: duration,
                        });
                    }
                }
            }
            VadState::WaitingForAi => {
                if let Some(start) = self.silence_start_ms {
                    let duration = result.timestamp_ms.saturating_sub(start);
                    let pause_type = PauseType::classify(duration, &self.config.pause_thresholds);
                    if self.last_reported_pause != Some(pause_type) {
                        self.last_reported_pause = Some(pause_type);
                        out.push(VadTransition::SilenceDetected {
                            pause_type,
                            duration_ms: duration,
                        });
                    }
                }
            }
            VadState::Listening | VadState::AiResponding => {}
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(energy_samples: &[f32], ts: u64) -> AudioChunk {
        let pcm: Vec<u8> = energy_samples
            .iter()
            .flat_map(|s| ((s * 32767.0) as i16).to_le_bytes())
            .collect();
        AudioChunk {
            pcm16le: pcm,
            timestamp_ms: ts,
            seq: ts,
        }
    }

    #[test]
    fn rms_of_silence_is_zero() {
        let mut vad = VadDetector::new(VadConfig::default());
        let result = vad.analyze_chunk(&chunk(&[0.0; 160], 0)).unwrap();
        assert!((result.energy - 0.0).abs() < 1e-6);
    }

    #[test]
    fn rms_of_full_scale_is_one() {
        let mut vad = VadDetector::new(VadConfig::default());
        let result = vad.analyze_chunk(&chunk(&[1.0; 160], 0)).unwrap();
        assert!((result.energy - 1.0).abs() < 1e-3);
    }

    #[test]
    fn empty_chunk_is_malformed_not_fatal() {
        let mut vad = VadDetector::new(VadConfig::default());
        let empty = AudioChunk {
            pcm16le: vec![],
            timestamp_ms: 0,
            seq: 0,
        };
        assert!(vad.analyze_chunk(&empty).is_none());
        assert_eq!(vad.malformed_frames(), 1);
    }

    #[test]
    fn speech_start_then_silence_detected() {
        let mut vad = VadDetector::new(VadConfig::default());

        let voiced = vad.analyze_chunk(&chunk(&[0.5; 160], 0)).unwrap();
        let transitions = vad.observe(voiced);
        assert_eq!(
            transitions,
            vec![VadTransition::SpeechStart { timestamp_ms: 0 }]
        );
        assert_eq!(vad.state(), VadState::Speaking);

        // Silence starts.
        let silent_1 = vad.analyze_chunk(&chunk(&[0.0; 160], 100)).unwrap();
        assert!(vad.observe(silent_1).is_empty());
        assert_eq!(vad.state(), VadState::Pausing);

        // Still below SILENCE_THRESHOLD_MS (800ms default).
        let silent_2 = vad.analyze_chunk(&chunk(&[0.0; 160], 700)).unwrap();
        assert!(vad.observe(silent_2).is_empty());

        // Crosses the threshold.
        let silent_3 = vad.analyze_chunk(&chunk(&[0.0; 160], 900)).unwrap();
        let transitions = vad.observe(silent_3);
        assert_eq!(transitions.len(), 1);
        match &transitions[0] {
            VadTransition::SilenceDetected {
                pause_type,
                duration_ms,
            } => {
                assert_eq!(*pause_type, PauseType::ShortPause);
                assert_eq!(*duration_ms, 900);
            }
            _ => panic!("expected SilenceDetected"),
        }
    }

    #[test]
    fn barge_in_from_ai_responding_emits_speech_start() {
        let mut vad = VadDetector::new(VadConfig::default());
        vad.set_ai_responding(true);
        assert_eq!(vad.state(), VadState::AiResponding);

        let voiced = vad.analyze_chunk(&chunk(&[0.5; 160], 0)).unwrap();
        let transitions = vad.observe(voiced);
        assert_eq!(
            transitions,
            vec![VadTransition::SpeechStart { timestamp_ms: 0 }]
        );
        assert_eq!(vad.state(), VadState::Speaking);
    }
}
