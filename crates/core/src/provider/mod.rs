//! External adapter contracts consumed by the core.

mod llm;
mod stt;

pub use llm::{ChatMessage, GenerateRequest, GenerateResponse, GenerationStream, LlmProvider, StreamEvent};
pub use stt::{AudioFormat, LanguageDetection, SttProvider, SttStreamHandle, TranscriptionResult};
