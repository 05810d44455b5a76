//! OpenAI-compatible chat-completions provider, streaming via
//! server-sent events.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

use convo_core::context::Role;
use convo_core::provider::{
    ChatMessage, GenerateRequest, GenerateResponse, GenerationStream, LlmProvider, StreamEvent,
};
use convo_core::Result;

use crate::error::LlmError;

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

#[derive(Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

impl From<&ChatMessage> for ApiMessage {
    fn from(m: &ChatMessage) -> Self {
        Self {
            role: role_str(m.role).to_string(),
            content: m.text.clone(),
        }
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ApiMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionChunk {
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    content: Option<String>,
}

pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            model,
        }
    }

    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| convo_core::Error::Execution("OPENAI_API_KEY not set".to_string()))?;
        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        Ok(Self::new(api_key, base_url, model))
    }

    fn build_request(&self, req: &GenerateRequest, stream: bool) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(req.messages.len() + 1);
        messages.push(ApiMessage {
            role: "system".to_string(),
            content: req.system_prompt.clone(),
        });
        messages.extend(req.messages.iter().map(ApiMessage::from));

        let model = if req.model == "default" {
            self.model.clone()
        } else {
            req.model.clone()
        };

        ChatCompletionRequest {
            model,
            messages,
            temperature: req.temperature,
            max_tokens: req.max_tokens,
            stream,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse> {
        let body = self.build_request(&req, false);
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(LlmError::from)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Provider { status, body }.into());
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(LlmError::from)?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        Ok(GenerateResponse { text })
    }

    async fn generate_streaming(&self, req: GenerateRequest) -> Result<Box<dyn GenerationStream>> {
        let body = self.build_request(&req, true);
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(LlmError::from)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Provider { status, body }.into());
        }

        Ok(Box::new(SseStream::new(response)))
    }
}

/// Parses an OpenAI-style `data: {...}` / `data: [DONE]` SSE body into
/// `StreamEvent`s, accumulating the full text for the terminal `Done` event.
struct SseStream {
    byte_stream: BoxStream<'static, reqwest::Result<bytes::Bytes>>,
    buffer: String,
    accumulated: String,
    cancelled: bool,
    done: bool,
}

impl SseStream {
    fn new(response: reqwest::Response) -> Self {
        Self {
            byte_stream: response.bytes_stream().boxed(),
            buffer: String::new(),
            accumulated: String::new(),
            cancelled: false,
            done: false,
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let pos = self.buffer.find('\n')?;
        let line = self.buffer[..pos].trim_end_matches('\r').to_string();
        self.buffer.drain(..=pos);
        Some(line)
    }
}

#[async_trait]
impl GenerationStream for SseStream {
    async fn next_event(&mut self) -> Option<Result<StreamEvent>> {
        loop {
            if self.cancelled || self.done {
                return None;
            }

            if let Some(line) = self.take_line() {
                if line.is_empty() {
                    continue;
                }
                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };
                if data == "[DONE]" {
                    self.done = true;
                    return Some(Ok(StreamEvent::Done(GenerateResponse {
                        text: self.accumulated.clone(),
                    })));
                }
                return match serde_json::from_str::<ChatCompletionChunk>(data) {
                    Ok(chunk) => {
                        let delta = chunk
                            .choices
                            .into_iter()
                            .next()
                            .and_then(|c| c.delta.content)
                            .unwrap_or_default();
                        if delta.is_empty() {
                            continue;
                        }
                        self.accumulated.push_str(&delta);
                        Some(Ok(StreamEvent::Token(delta)))
                    }
                    Err(err) => Some(Err(LlmError::from(err).into())),
                };
            }

            match self.byte_stream.next().await {
                Some(Ok(bytes)) => self.buffer.push_str(&String::from_utf8_lossy(&bytes)),
                Some(Err(err)) => return Some(Err(LlmError::from(err).into())),
                None => {
                    self.done = true;
                    if self.accumulated.is_empty() {
                        return Some(Err(LlmError::StreamTruncated.into()));
                    }
                    return Some(Ok(StreamEvent::Done(GenerateResponse {
                        text: self.accumulated.clone(),
                    })));
                }
            }
        }
    }

    fn cancel(&mut self) {
        self.cancelled = true;
    }
}
