//! Response Streamer: token fan-out with cooperative barge-in cancellation.

mod streamer;

pub use streamer::{
    ResponseStreamHandle, ResponseStreamer, SynthesizedStream, DEFAULT_SYNTH_TOKEN_DELAY_MS,
};
