//! LLM Adapter contract — external, implemented by `convo-llm`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::{ContextMessage, Role};
use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
}

impl From<&ContextMessage> for ChatMessage {
    fn from(m: &ContextMessage) -> Self {
        Self {
            role: m.role,
            text: m.text.clone(),
        }
    }
}

/// `req = {messages, systemPrompt, model, temperature, maxTokens, streaming?}`
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub messages: Vec<ChatMessage>,
    pub system_prompt: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub streaming: bool,
}

#[derive(Debug, Clone)]
pub struct GenerateResponse {
    pub text: String,
}

/// One token-equivalent chunk pulled from a streaming generation. `Token`
/// can carry multiple tokens when the provider batches them.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Token(String),
    Done(GenerateResponse),
}

/// A typed, cancellable stream abstraction in place of a callback/observer
/// interface, so cancellation is explicit rather than a side flag the
/// callback has to check.
#[async_trait]
pub trait GenerationStream: Send {
    /// Pull the next event, or `None` once the stream is exhausted or
    /// cancelled. Cancellation is cooperative: callers must stop polling
    /// and call `cancel` rather than relying on an internal timeout.
    async fn next_event(&mut self) -> Option<Result<StreamEvent>>;
    fn cancel(&mut self);
}

/// Contract consumed by the core. The core holds one `Arc<dyn LlmProvider>`.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse>;
    async fn generate_streaming(&self, req: GenerateRequest) -> Result<Box<dyn GenerationStream>>;
}
