//! Minimal WAV container for wrapping raw PCM16LE mono frames before upload.
//! The adapter is responsible for WAV framing if the provider needs it.

pub fn wrap_pcm16_mono(pcm16le: &[u8], sample_rate: u32) -> Vec<u8> {
    let data_len = pcm16le.len() as u32;
    let byte_rate = sample_rate * 2;
    let mut wav = Vec::with_capacity(44 + pcm16le.len());

    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&1u16.to_le_bytes()); // mono
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&2u16.to_le_bytes()); // block align
    wav.extend_from_slice(&16u16.to_le_bytes()); // bits per sample

    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    wav.extend_from_slice(pcm16le);

    wav
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_with_correct_header_sizes() {
        let pcm = vec![0u8; 320];
        let wav = wrap_pcm16_mono(&pcm, 16_000);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(wav.len(), 44 + pcm.len());
    }
}
