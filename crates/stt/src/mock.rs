//! Deterministic mock provider for tests and local development.

use async_trait::async_trait;
use parking_lot::Mutex;

use convo_core::provider::{AudioFormat, LanguageDetection, SttProvider, SttStreamHandle, TranscriptionResult};
use convo_core::Result;

pub struct MockSttProvider {
    pub fixed_text: String,
    pub confidence: f32,
}

impl MockSttProvider {
    pub fn new(fixed_text: impl Into<String>, confidence: f32) -> Self {
        Self {
            fixed_text: fixed_text.into(),
            confidence,
        }
    }
}

impl Default for MockSttProvider {
    fn default() -> Self {
        Self::new("hello there", 0.95)
    }
}

#[async_trait]
impl SttProvider for MockSttProvider {
    async fn transcribe(
        &self,
        bytes: &[u8],
        _format: AudioFormat,
        _language: Option<&str>,
    ) -> Result<TranscriptionResult> {
        if bytes.is_empty() {
            return Ok(TranscriptionResult::Empty);
        }
        Ok(TranscriptionResult::Success {
            text: self.fixed_text.clone(),
            confidence: self.confidence,
            is_final: true,
            language: Some("en".to_string()),
        })
    }

    async fn start_streaming(
        &self,
        _format: AudioFormat,
        _language: Option<&str>,
    ) -> Result<Box<dyn SttStreamHandle>> {
        Ok(Box::new(MockStreamHandle {
            fixed_text: self.fixed_text.clone(),
            confidence: self.confidence,
            buffered_any: Mutex::new(false),
        }))
    }

    async fn detect_language(&self, _bytes: &[u8], _format: AudioFormat) -> Result<LanguageDetection> {
        Ok(LanguageDetection {
            language: "en".to_string(),
            confidence: 0.99,
        })
    }
}

struct MockStreamHandle {
    fixed_text: String,
    confidence: f32,
    buffered_any: Mutex<bool>,
}

#[async_trait]
impl SttStreamHandle for MockStreamHandle {
    async fn send_chunk(&self, bytes: &[u8]) -> Result<()> {
        if !bytes.is_empty() {
            *self.buffered_any.lock() = true;
        }
        Ok(())
    }

    async fn stop(&self) -> Result<TranscriptionResult> {
        if !*self.buffered_any.lock() {
            return Ok(TranscriptionResult::Empty);
        }
        Ok(TranscriptionResult::Success {
            text: self.fixed_text.clone(),
            confidence: self.confidence,
            is_final: true,
            language: Some("en".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_bytes_produce_empty_result() {
        let provider = MockSttProvider::default();
        let result = provider.transcribe(&[], AudioFormat::Pcm16Mono16k, None).await.unwrap();
        assert!(matches!(result, TranscriptionResult::Empty));
    }

    #[tokio::test]
    async fn streaming_handle_returns_empty_without_chunks() {
        let provider = MockSttProvider::default();
        let handle = provider
            .start_streaming(AudioFormat::Pcm16Mono16k, None)
            .await
            .unwrap();
        let result = handle.stop().await.unwrap();
        assert!(matches!(result, TranscriptionResult::Empty));
    }

    #[tokio::test]
    async fn streaming_handle_returns_text_after_chunks() {
        let provider = MockSttProvider::default();
        let handle = provider
            .start_streaming(AudioFormat::Pcm16Mono16k, None)
            .await
            .unwrap();
        handle.send_chunk(&[1, 2, 3]).await.unwrap();
        let result = handle.stop().await.unwrap();
        assert!(matches!(result, TranscriptionResult::Success { .. }));
    }
}
