//! PCM16 sample codec and the base64 transform used on the wire.

use base64::prelude::*;

use crate::error::{LiveError, Result};

const SCALE: f32 = 32_768.0;

/// Convert one float sample to signed 16-bit PCM.
///
/// Clamps to [-1, 1], scales by 32768 and saturates at `i16::MAX`.
/// Deterministic: no dithering.
pub fn f32_to_pcm16(sample: f32) -> i16 {
    let clamped = if sample.is_nan() {
        0.0
    } else {
        sample.clamp(-1.0, 1.0)
    };
    (clamped * SCALE).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

pub fn pcm16_to_f32(sample: i16) -> f32 {
    sample as f32 / SCALE
}

/// Encode float samples as little-endian PCM16 bytes.
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&f32_to_pcm16(*sample).to_le_bytes());
    }
    bytes
}

/// Decode little-endian PCM16 bytes into float samples.
pub fn decode_pcm16(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 2 != 0 {
        return Err(LiveError::Encoding(format!(
            "PCM16 payload has odd length {}",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| pcm16_to_f32(i16::from_le_bytes([pair[0], pair[1]])))
        .collect())
}

pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64_STANDARD.encode(bytes)
}

pub fn decode_base64(text: &str) -> Result<Vec<u8>> {
    Ok(BASE64_STANDARD.decode(text.trim())?)
}

/// Float samples → PCM16 → base64, ready for a realtime audio frame.
pub fn encode_pcm16_base64(samples: &[f32]) -> String {
    encode_base64(&encode_pcm16(samples))
}

/// Base64 → PCM16 → float samples.
pub fn decode_pcm16_base64(text: &str) -> Result<Vec<f32>> {
    decode_pcm16(&decode_base64(text)?)
}
