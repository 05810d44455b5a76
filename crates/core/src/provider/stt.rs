//! STT Adapter contract — external, implemented by `convo-stt`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// `TranscriptionResult = Success{text,conf,final} | Empty | Fail{msg}`,
/// expressed as a tagged union rather than a class hierarchy. The core
/// treats any non-`Success` as empty text and logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum TranscriptionResult {
    Success {
        text: String,
        confidence: f32,
        #[serde(rename = "final")]
        is_final: bool,
        language: Option<String>,
    },
    Empty,
    Fail {
        message: String,
    },
}

impl TranscriptionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, TranscriptionResult::Success { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    Pcm16Mono16k,
}

#[derive(Debug, Clone)]
pub struct LanguageDetection {
    pub language: String,
    pub confidence: f32,
}

/// A handle to an in-progress streaming STT session: start, send chunks,
/// stop.
#[async_trait]
pub trait SttStreamHandle: Send + Sync {
    async fn send_chunk(&self, bytes: &[u8]) -> Result<()>;
    async fn stop(&self) -> Result<TranscriptionResult>;
}

/// Contract consumed by the core. Implemented by a concrete provider crate
/// (e.g. `convo-stt`); the core holds one `Arc<dyn SttProvider>` and never
/// chooses between adapters itself — that's a server-binary concern.
#[async_trait]
pub trait SttProvider: Send + Sync {
    /// One-shot transcription of a complete buffer.
    async fn transcribe(
        &self,
        bytes: &[u8],
        format: AudioFormat,
        language: Option<&str>,
    ) -> Result<TranscriptionResult>;

    /// Begin a streaming session; returns a handle for subsequent chunks.
    async fn start_streaming(
        &self,
        format: AudioFormat,
        language: Option<&str>,
    ) -> Result<Box<dyn SttStreamHandle>>;

    /// Detect the spoken language from a prefix of audio. Run-once-per-session
    /// cadence is the core's decision, not the adapter's.
    async fn detect_language(&self, bytes: &[u8], format: AudioFormat) -> Result<LanguageDetection>;
}
