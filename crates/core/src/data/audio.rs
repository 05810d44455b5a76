//! Audio chunk and voice-activity types.

use serde::{Deserialize, Serialize};

/// One PCM16LE mono chunk pushed by the client.
///
/// Owned by the Audio Stream Processor; discarded once VAD has run and the
/// bytes have been forwarded (or buffered) for STT.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Raw little-endian PCM16 samples.
    pub pcm16le: Vec<u8>,
    /// Monotonic capture timestamp in milliseconds, client-assigned.
    pub timestamp_ms: u64,
    /// Strictly increasing per session, assigned by the processor on arrival.
    pub seq: u64,
}

impl AudioChunk {
    /// Decode the PCM16LE bytes into normalized `f32` samples in `[-1, 1]`.
    pub fn samples_f32(&self) -> Vec<f32> {
        self.pcm16le
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
            .collect()
    }
}

/// Per-chunk VAD classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VadResult {
    /// Whether this chunk was classified as containing voice.
    pub has_voice: bool,
    /// Normalized RMS energy in `[0, 1]`.
    pub energy: f32,
    /// Confidence in the voice/silence call, in `[0, 1]`.
    pub confidence: f32,
    /// Chunk timestamp, copied from the source `AudioChunk`.
    pub timestamp_ms: u64,
}

/// Classification of an ongoing silence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseType {
    /// Silence shorter than the "natural gap" threshold — not worth acting on.
    NaturalGap,
    /// Silence long enough to be a breath/pause but not end-of-thought.
    ShortPause,
    /// Silence long enough that the speaker has likely finished a thought.
    EndOfThought,
    /// Silence long enough that the user appears to be waiting for a reply.
    UserWaiting,
}

impl PauseType {
    /// Classify a silence duration against the configured thresholds.
    ///
    /// Boundaries are half-open on the lower bound: a duration exactly equal
    /// to a threshold is classified into the *next* tier, so a silence
    /// exactly at `short_pause_ms` already counts as `ShortPause`; just
    /// below it is still a `NaturalGap`.
    pub fn classify(duration_ms: u64, thresholds: &PauseThresholds) -> Self {
        if duration_ms < thresholds.natural_gap_ms {
            // Below even the natural-gap threshold: still counts as the
            // lowest tier: a pause always has *some* classification.
            PauseType::NaturalGap
        } else if duration_ms < thresholds.short_pause_ms {
            PauseType::ShortPause
        } else if duration_ms < thresholds.long_pause_ms {
            PauseType::EndOfThought
        } else {
            PauseType::UserWaiting
        }
    }
}

/// Configurable silence-duration boundaries.
#[derive(Debug, Clone, Copy)]
pub struct PauseThresholds {
    /// Below this, a silence is a natural gap (default 500ms).
    pub natural_gap_ms: u64,
    /// Below this (and at/above natural gap), a short pause (default 1000ms).
    pub short_pause_ms: u64,
    /// Below this (and at/above short pause), end-of-thought; at/above, user
    /// waiting (default 3000ms).
    pub long_pause_ms: u64,
}

impl Default for PauseThresholds {
    fn default() -> Self {
        Self {
            natural_gap_ms: 500,
            short_pause_ms: 1000,
            long_pause_ms: 3000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_boundaries() {
        let t = PauseThresholds::default();
        assert_eq!(PauseType::classify(499, &t), PauseType::NaturalGap);
        assert_eq!(PauseType::classify(500, &t), PauseType::ShortPause);
        assert_eq!(PauseType::classify(999, &t), PauseType::ShortPause);
        assert_eq!(PauseType::classify(1000, &t), PauseType::EndOfThought);
        assert_eq!(PauseType::classify(2999, &t), PauseType::EndOfThought);
        assert_eq!(PauseType::classify(3000, &t), PauseType::UserWaiting);
    }

    #[test]
    fn decode_pcm16() {
        let bytes = 0i16.to_le_bytes().to_vec();
        let chunk = AudioChunk {
            pcm16le: bytes,
            timestamp_ms: 0,
            seq: 0,
        };
        assert_eq!(chunk.samples_f32(), vec![0.0]);

        let full_scale = i16::MAX.to_le_bytes().to_vec();
        let chunk = AudioChunk {
            pcm16le: full_scale,
            timestamp_ms: 0,
            seq: 0,
        };
        assert!((chunk.samples_f32()[0] - 1.0).abs() < 1e-3);
    }
}
