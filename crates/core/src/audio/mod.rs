//! Audio Stream Processor: ring buffer, VAD invocation, STT
//! trigger decisions.

mod ring_buffer;
mod stream_processor;

pub use ring_buffer::AudioRingBuffer;
pub use stream_processor::{AudioProcessorConfig, AudioStreamProcessor, ProcessOutcome, SttTrigger};
