//! Whisper-compatible transcription provider. Targets any API shaped like
//! OpenAI's `audio/transcriptions` endpoint.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;

use convo_core::provider::{AudioFormat, LanguageDetection, SttProvider, SttStreamHandle, TranscriptionResult};
use convo_core::Result;

use crate::error::SttError;
use crate::wav::wrap_pcm16_mono;

const SAMPLE_RATE: u32 = 16_000;

/// Default confidence assigned to a non-empty transcript: this family of
/// APIs does not return a calibrated per-result confidence score.
const DEFAULT_CONFIDENCE: f32 = 0.9;

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Clone)]
pub struct HttpSttProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpSttProvider {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            model,
        }
    }

    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("STT_API_KEY")
            .map_err(|_| convo_core::Error::Execution("STT_API_KEY not set".to_string()))?;
        let base_url =
            std::env::var("STT_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let model = std::env::var("STT_MODEL").unwrap_or_else(|_| "whisper-1".to_string());
        Ok(Self::new(api_key, base_url, model))
    }

    async fn transcribe_bytes(
        &self,
        pcm16le: &[u8],
        language: Option<&str>,
        verbose: bool,
    ) -> Result<TranscriptionResponse> {
        let wav = wrap_pcm16_mono(pcm16le, SAMPLE_RATE);
        let part = reqwest::multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(SttError::from)?;
        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone());
        if let Some(lang) = language {
            form = form.text("language", lang.to_string());
        }
        if verbose {
            form = form.text("response_format", "verbose_json");
        }

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(SttError::from)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SttError::Provider { status, body }.into());
        }

        response.json().await.map_err(|e| SttError::from(e).into())
    }
}

#[async_trait]
impl SttProvider for HttpSttProvider {
    async fn transcribe(
        &self,
        bytes: &[u8],
        _format: AudioFormat,
        language: Option<&str>,
    ) -> Result<TranscriptionResult> {
        let parsed = match self.transcribe_bytes(bytes, language, false).await {
            Ok(parsed) => parsed,
            Err(err) => {
                return Ok(TranscriptionResult::Fail {
                    message: err.to_string(),
                })
            }
        };

        let text = parsed.text.trim();
        if text.is_empty() {
            return Ok(TranscriptionResult::Empty);
        }

        Ok(TranscriptionResult::Success {
            text: text.to_string(),
            confidence: DEFAULT_CONFIDENCE,
            is_final: true,
            language: parsed.language,
        })
    }

    async fn start_streaming(
        &self,
        format: AudioFormat,
        language: Option<&str>,
    ) -> Result<Box<dyn SttStreamHandle>> {
        Ok(Box::new(BufferingStreamHandle {
            provider: self.clone(),
            format,
            language: language.map(str::to_string),
            buffer: Mutex::new(Vec::new()),
        }))
    }

    async fn detect_language(&self, bytes: &[u8], _format: AudioFormat) -> Result<LanguageDetection> {
        let parsed = self.transcribe_bytes(bytes, None, true).await?;
        Ok(LanguageDetection {
            language: parsed.language.unwrap_or_else(|| "und".to_string()),
            // This API family doesn't return a confidence for language
            // detection; a successful parse is treated as certain.
            confidence: 1.0,
        })
    }
}

/// Accumulates chunks and performs one batch transcription on `stop`. Many
/// whisper-style HTTP APIs have no duplex streaming surface; this preserves
/// the `SttStreamHandle` contract without pretending otherwise.
struct BufferingStreamHandle {
    provider: HttpSttProvider,
    format: AudioFormat,
    language: Option<String>,
    buffer: Mutex<Vec<u8>>,
}

#[async_trait]
impl SttStreamHandle for BufferingStreamHandle {
    async fn send_chunk(&self, bytes: &[u8]) -> Result<()> {
        self.buffer.lock().extend_from_slice(bytes);
        Ok(())
    }

    async fn stop(&self) -> Result<TranscriptionResult> {
        let bytes = std::mem::take(&mut *self.buffer.lock());
        self.provider
            .transcribe(&bytes, self.format, self.language.as_deref())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn buffering_handle_accumulates_before_stop() {
        let provider = HttpSttProvider::new(
            "key".to_string(),
            "http://localhost:1".to_string(),
            "whisper-1".to_string(),
        );
        let handle = BufferingStreamHandle {
            provider,
            format: AudioFormat::Pcm16Mono16k,
            language: None,
            buffer: Mutex::new(Vec::new()),
        };
        handle.send_chunk(&[1, 2, 3]).await.unwrap();
        handle.send_chunk(&[4, 5]).await.unwrap();
        assert_eq!(*handle.buffer.lock(), vec![1, 2, 3, 4, 5]);
    }
}
