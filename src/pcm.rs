//! PCM and base64 codec helpers shared by the TTS and live-audio paths.
//!
//! Everything in here is a pure function: bytes in, bytes out. The Gemini
//! audio endpoints exchange 16-bit little-endian mono PCM wrapped in base64,
//! so every audio path in the app goes through these conversions.

use base64::{engine::general_purpose, Engine as _};

/// Encode raw bytes as standard base64 text.
pub fn encode_base64(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

/// Decode standard base64 text back to raw bytes.
pub fn decode_base64(text: &str) -> anyhow::Result<Vec<u8>> {
    Ok(general_purpose::STANDARD.decode(text)?)
}

/// Interpret raw bytes as 16-bit little-endian PCM samples.
/// A trailing odd byte is dropped.
pub fn bytes_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Serialize 16-bit PCM samples as little-endian bytes.
pub fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    bytes
}

/// Convert floating-point samples in [-1.0, 1.0] to 16-bit signed PCM.
pub fn f32_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}

/// Convert 16-bit signed PCM to floating-point samples in [-1.0, 1.0].
pub fn i16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

/// Duration in seconds of `sample_count` mono samples at `sample_rate`.
pub fn duration_secs(sample_count: usize, sample_rate: u32) -> f64 {
    sample_count as f64 / sample_rate as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_round_trip_awkward_lengths() {
        // 0, 1 and non-multiple-of-3 lengths exercise the padding cases.
        for len in [0usize, 1, 2, 4, 5, 7, 256] {
            let bytes: Vec<u8> = (0..len).map(|i| (i * 37 % 251) as u8).collect();
            let text = encode_base64(&bytes);
            let back = decode_base64(&text).unwrap();
            assert_eq!(back, bytes, "length {}", len);
        }
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_base64("not base64!!").is_err());
    }

    #[test]
    fn pcm_byte_round_trip() {
        let samples = vec![0i16, 1, -1, i16::MAX, i16::MIN, 12345, -32000];
        let bytes = samples_to_bytes(&samples);
        assert_eq!(bytes_to_samples(&bytes), samples);
    }

    #[test]
    fn odd_trailing_byte_is_dropped() {
        let bytes = [0x34, 0x12, 0xff];
        assert_eq!(bytes_to_samples(&bytes), vec![0x1234]);
    }

    #[test]
    fn float_conversion_clamps() {
        let converted = f32_to_i16(&[0.0, 1.0, -1.0, 2.0, -2.0]);
        assert_eq!(converted[0], 0);
        assert_eq!(converted[1], i16::MAX);
        assert_eq!(converted[3], i16::MAX);
        assert_eq!(converted[4], -i16::MAX);
    }

    #[test]
    fn duration_matches_rate() {
        assert!((duration_secs(24000, 24000) - 1.0).abs() < 1e-9);
        assert!((duration_secs(4096, 16000) - 0.256).abs() < 1e-9);
    }
}
