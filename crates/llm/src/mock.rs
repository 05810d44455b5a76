//! Deterministic mock provider for tests and local development without a
//! live LLM credential.

use async_trait::async_trait;

use convo_core::provider::{GenerateRequest, GenerateResponse, GenerationStream, LlmProvider, StreamEvent};
use convo_core::response::SynthesizedStream;
use convo_core::Result;

pub struct MockLlmProvider {
    pub default_response: String,
    pub pattern_responses: Vec<(String, String)>,
}

impl MockLlmProvider {
    pub fn new(default_response: impl Into<String>) -> Self {
        Self {
            default_response: default_response.into(),
            pattern_responses: Vec::new(),
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>, response: impl Into<String>) -> Self {
        self.pattern_responses.push((pattern.into(), response.into()));
        self
    }

    fn respond_to(&self, req: &GenerateRequest) -> String {
        let last_user_text = req
            .messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, convo_core::context::Role::User))
            .map(|m| m.text.as_str())
            .unwrap_or("");
        for (pattern, response) in &self.pattern_responses {
            if last_user_text.contains(pattern.as_str()) {
                return response.clone();
            }
        }
        self.default_response.clone()
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new("I'm not sure how to help with that yet.")
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse> {
        Ok(GenerateResponse {
            text: self.respond_to(&req),
        })
    }

    async fn generate_streaming(&self, req: GenerateRequest) -> Result<Box<dyn GenerationStream>> {
        let text = self.respond_to(&req);
        Ok(Box::new(SynthesizedStream::new(&text, std::time::Duration::from_millis(5))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convo_core::context::Role;
    use convo_core::provider::ChatMessage;

    fn req(text: &str) -> GenerateRequest {
        GenerateRequest {
            messages: vec![ChatMessage {
                role: Role::User,
                text: text.to_string(),
            }],
            system_prompt: "test".to_string(),
            model: "default".to_string(),
            temperature: 0.5,
            max_tokens: 100,
            streaming: true,
        }
    }

    #[tokio::test]
    async fn falls_back_to_default_response() {
        let provider = MockLlmProvider::default();
        let resp = provider.generate(req("hello")).await.unwrap();
        assert_eq!(resp.text, provider.default_response);
    }

    #[tokio::test]
    async fn matches_pattern_response() {
        let provider = MockLlmProvider::new("default").with_pattern("weather", "It's sunny.");
        let resp = provider.generate(req("what's the weather")).await.unwrap();
        assert_eq!(resp.text, "It's sunny.");
    }

    #[tokio::test]
    async fn streaming_yields_tokens_then_done() {
        let provider = MockLlmProvider::new("hi there");
        let mut stream = provider.generate_streaming(req("hey")).await.unwrap();
        let mut tokens = Vec::new();
        loop {
            match stream.next_event().await {
                Some(Ok(StreamEvent::Token(t))) => tokens.push(t),
                Some(Ok(StreamEvent::Done(resp))) => {
                    assert_eq!(resp.text, "hi there");
                    break;
                }
                other => panic!("unexpected: {other:?}"),
            }
        }
        assert_eq!(tokens, vec!["hi", "there"]);
    }
}
