//! Error taxonomy for the LLM adapter, collapsed into `convo_core::Error` at
//! the trait boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request to LLM provider failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("LLM provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("failed to parse LLM provider response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("streaming response ended without a terminal event")]
    StreamTruncated,
}

impl From<LlmError> for convo_core::Error {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Request(_) => convo_core::Error::LlmTransient(err.to_string()),
            LlmError::Provider { status, .. } if status >= 500 || status == 429 => {
                convo_core::Error::LlmTransient(err.to_string())
            }
            LlmError::Provider { .. } | LlmError::Decode(_) | LlmError::StreamTruncated => {
                convo_core::Error::Execution(err.to_string())
            }
        }
    }
}
