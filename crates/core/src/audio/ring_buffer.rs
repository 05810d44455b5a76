//! Lock-free per-session audio ring buffer.
//!
//! Caps on wall-clock duration rather than chunk count, since chunk sizes
//! vary with the client's frame cadence. Built on `crossbeam::ArrayQueue`
//! for lock-free push/pop under single-writer-per-session access, with a
//! generous fixed slot count so duration is the real cap.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::queue::ArrayQueue;

use crate::data::audio::AudioChunk;

/// Bounds how many chunks the underlying `ArrayQueue` can ever hold. Real
/// eviction is duration-based (`max_duration_ms`); this only needs to be
/// larger than any plausible chunk count within that duration.
const SLOT_CAPACITY: usize = 8192;

pub struct AudioRingBuffer {
    queue: Arc<ArrayQueue<AudioChunk>>,
    max_duration_ms: u64,
    sample_rate: u32,
    current_duration_ms: AtomicU64,
    dropped_chunks: AtomicU64,
}

impl AudioRingBuffer {
    pub fn new(max_duration_ms: u64, sample_rate: u32) -> Self {
        Self {
            queue: Arc::new(ArrayQueue::new(SLOT_CAPACITY)),
            max_duration_ms,
            sample_rate,
            current_duration_ms: AtomicU64::new(0),
            dropped_chunks: AtomicU64::new(0),
        }
    }

    fn duration_ms(&self, chunk: &AudioChunk) -> u64 {
        let samples = (chunk.pcm16le.len() / 2) as u64;
        samples.saturating_mul(1000) / self.sample_rate.max(1) as u64
    }

    /// Append a chunk, evicting the oldest chunks (drop-oldest backpressure)
    /// until the buffer is back under `max_duration_ms`.
    pub fn push(&self, chunk: AudioChunk) {
        let added = self.duration_ms(&chunk);

        if self.queue.push(chunk).is_err() {
            // Slot table exhausted (pathological chunk sizing); drop oldest
            // slot to make room rather than reject ingress.
            if let Some(evicted) = self.queue.pop() {
                self.current_duration_ms
                    .fetch_sub(self.duration_ms(&evicted), Ordering::Relaxed);
                self.dropped_chunks.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.current_duration_ms
            .fetch_add(added, Ordering::Relaxed);

        while self.current_duration_ms.load(Ordering::Relaxed) > self.max_duration_ms {
            match self.queue.pop() {
                Some(evicted) => {
                    self.current_duration_ms
                        .fetch_sub(self.duration_ms(&evicted), Ordering::Relaxed);
                    self.dropped_chunks.fetch_add(1, Ordering::Relaxed);
                }
                None => break,
            }
        }
    }

    /// Drain all buffered chunks in arrival order, concatenating their PCM
    /// bytes (used for the final STT flush on `Close`).
    pub fn drain_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = self.queue.pop() {
            out.extend_from_slice(&chunk.pcm16le);
        }
        self.current_duration_ms.store(0, Ordering::Relaxed);
        out
    }

    pub fn buffered_duration_ms(&self) -> u64 {
        self.current_duration_ms.load(Ordering::Relaxed)
    }

    pub fn dropped_chunk_count(&self) -> u64 {
        self.dropped_chunks.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(num_samples: usize, seq: u64) -> AudioChunk {
        AudioChunk {
            pcm16le: vec![0u8; num_samples * 2],
            timestamp_ms: seq * 10,
            seq,
        }
    }

    #[test]
    fn evicts_oldest_past_duration_cap() {
        // 16kHz, cap at 100ms => 1600 samples.
        let buf = AudioRingBuffer::new(100, 16_000);
        // Each chunk is 80 samples = 5ms.
        for i in 0..40 {
            buf.push(chunk(80, i));
        }
        assert!(buf.buffered_duration_ms() <= 100);
        assert!(buf.dropped_chunk_count() > 0);
    }

    #[test]
    fn drain_concatenates_in_order() {
        let buf = AudioRingBuffer::new(10_000, 16_000);
        buf.push(AudioChunk {
            pcm16le: vec![1, 2],
            timestamp_ms: 0,
            seq: 0,
        });
        buf.push(AudioChunk {
            pcm16le: vec![3, 4],
            timestamp_ms: 10,
            seq: 1,
        });
        assert_eq!(buf.drain_bytes(), vec![1, 2, 3, 4]);
        assert_eq!(buf.buffered_duration_ms(), 0);
    }
}
