//! Error taxonomy for the STT adapter, collapsed into `convo_core::Error`
//! at the trait boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SttError {
    #[error("request to STT provider failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("STT provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("failed to parse STT provider response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("bad credentials or unsupported configuration: {0}")]
    Fatal(String),
}

impl From<SttError> for convo_core::Error {
    fn from(err: SttError) -> Self {
        match err {
            SttError::Request(_) | SttError::Provider { .. } => {
                convo_core::Error::SttTransient(err.to_string())
            }
            SttError::Decode(_) | SttError::Fatal(_) => convo_core::Error::SttFatal(err.to_string()),
        }
    }
}
