//! Error taxonomy for the conversation pipeline.

use thiserror::Error;

/// Result type alias for `convo-core` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a session through the pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed client frame; the frame is dropped, not fatal to the session.
    #[error("protocol error: {0}")]
    ClientProtocol(String),

    /// Invalid audio chunk (wrong size/rate); the chunk is dropped and counted.
    #[error("audio ingress error: {0}")]
    AudioIngress(String),

    /// STT call failed but is expected to recover (network blip, rate limit).
    #[error("STT transient error: {0}")]
    SttTransient(String),

    /// STT call failed in a way retries cannot fix (bad credentials, etc).
    #[error("STT fatal error: {0}")]
    SttFatal(String),

    /// LLM call failed but is expected to recover.
    #[error("LLM transient error: {0}")]
    LlmTransient(String),

    /// Expected cancellation (barge-in). Never surfaced to the client as an
    /// error; callers translate this into `Event::ResponseCancelled` /
    /// `assistant.interrupted`.
    #[error("cancelled")]
    Cancelled,

    /// A core invariant was violated. The session is closed.
    #[error("internal invariant violation: {0}")]
    InvariantViolation(String),

    /// No session exists for the given id.
    #[error("unknown session: {0}")]
    UnknownSession(String),

    /// A scheduled job exceeded its deadline.
    #[error("deadline exceeded: {0}")]
    Timeout(String),

    /// A scheduler pool rejected a submission (queue full).
    #[error("pool '{pool}' rejected submission: {reason}")]
    PoolRejected {
        /// Name of the pool that rejected the job.
        pool: String,
        /// Human-readable reason.
        reason: String,
    },

    /// Circuit breaker is open for a named dependency.
    #[error("circuit breaker open for '{0}'")]
    CircuitOpen(String),

    /// Generic execution error not covered by a more specific variant.
    #[error("execution error: {0}")]
    Execution(String),

    /// Serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error represents an expected cancellation rather than a
    /// real failure. `Cancelled` must never surface as an error event.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Execution(err.to_string())
    }
}
