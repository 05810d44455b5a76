//! Response Streamer: token fan-out with cooperative barge-in cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::data::event::Event;
use crate::data::session::SessionId;
use crate::error::Result;
use crate::provider::{GenerationStream, StreamEvent};

/// Default inter-token delay when synthesizing a stream from a
/// non-streaming result.
pub const DEFAULT_SYNTH_TOKEN_DELAY_MS: u64 = 50;

/// Shared cancellation flag for one `ResponseStream`. Cheap to
/// clone; the orchestrator holds one side, the streaming task the other.
#[derive(Clone)]
pub struct ResponseStreamHandle {
    response_id: u64,
    cancelled: Arc<AtomicBool>,
}

impl ResponseStreamHandle {
    fn new(response_id: u64) -> Self {
        Self {
            response_id,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn response_id(&self) -> u64 {
        self.response_id
    }

    /// Signal barge-in cancellation. Checked cooperatively between token
    /// deliveries.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A `GenerationStream` that synthesizes tokens from a complete text via
/// whitespace tokenization, used when the LLM provider has streaming
/// disabled or unavailable.
pub struct SynthesizedStream {
    tokens: std::vec::IntoIter<String>,
    delay: Duration,
    accumulated: String,
    done_emitted: bool,
    cancelled: bool,
}

impl SynthesizedStream {
    pub fn new(text: &str, delay: Duration) -> Self {
        let tokens: Vec<String> = text.split_whitespace().map(str::to_string).collect();
        Self {
            tokens: tokens.into_iter(),
            delay,
            accumulated: String::new(),
            done_emitted: false,
            cancelled: false,
        }
    }
}

#[async_trait]
impl GenerationStream for SynthesizedStream {
    async fn next_event(&mut self) -> Option<Result<StreamEvent>> {
        if self.cancelled || self.done_emitted {
            return None;
        }
        match self.tokens.next() {
            Some(token) => {
                tokio::time::sleep(self.delay).await;
                if !self.accumulated.is_empty() {
                    self.accumulated.push(' ');
                }
                self.accumulated.push_str(&token);
                Some(Ok(StreamEvent::Token(token)))
            }
            None => {
                self.done_emitted = true;
                Some(Ok(StreamEvent::Done(crate::provider::GenerateResponse {
                    text: self.accumulated.clone(),
                })))
            }
        }
    }

    fn cancel(&mut self) {
        self.cancelled = true;
    }
}

/// Drives one `GenerationStream` to completion or cancellation, emitting
/// `Event`s via `sink`. Returns the accumulated text on normal completion,
/// or `None` if cancelled — partial text is discarded from conversation
/// history on cancellation.
pub struct ResponseStreamer;

impl ResponseStreamer {
    /// Start a response stream. Returns the handle (for barge-in cancel)
    /// immediately; the caller drives `run` concurrently, typically as a
    /// job on the LLM pool.
    pub fn new_handle(response_id: u64) -> ResponseStreamHandle {
        ResponseStreamHandle::new(response_id)
    }

    pub async fn run(
        session_id: &SessionId,
        handle: &ResponseStreamHandle,
        mut stream: Box<dyn GenerationStream>,
        mut sink: impl FnMut(Event),
    ) -> Option<String> {
        sink(Event::ResponseStarted {
            session_id: session_id.clone(),
            response_id: handle.response_id(),
        });

        let mut accumulated = String::new();
        loop {
            if handle.is_cancelled() {
                stream.cancel();
                sink(Event::ResponseCancelled {
                    session_id: session_id.clone(),
                    response_id: handle.response_id(),
                });
                return None;
            }

            match stream.next_event().await {
                Some(Ok(StreamEvent::Token(text))) => {
                    accumulated.push_str(&text);
                    sink(Event::Token {
                        session_id: session_id.clone(),
                        response_id: handle.response_id(),
                        text,
                    });
                }
                Some(Ok(StreamEvent::Done(response))) => {
                    sink(Event::ResponseDone {
                        session_id: session_id.clone(),
                        response_id: handle.response_id(),
                        full_text: response.text.clone(),
                    });
                    return Some(response.text);
                }
                Some(Err(err)) if err.is_cancellation() => {
                    sink(Event::ResponseCancelled {
                        session_id: session_id.clone(),
                        response_id: handle.response_id(),
                    });
                    return None;
                }
                Some(Err(err)) => {
                    sink(Event::Error {
                        session_id: session_id.clone(),
                        code: "ai_unavailable".to_string(),
                        message: err.to_string(),
                    });
                    return None;
                }
                None => {
                    // Stream ended without an explicit Done: treat as
                    // completion with whatever was accumulated.
                    sink(Event::ResponseDone {
                        session_id: session_id.clone(),
                        response_id: handle.response_id(),
                        full_text: accumulated.clone(),
                    });
                    return Some(accumulated);
                }
            }
        }
    }
}
