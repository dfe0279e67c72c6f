//! # Resampling and PCM Conversion
//!
//! Converts captured float samples between sample rates by linear
//! interpolation and quantizes them to the 16-bit little-endian PCM the wire
//! protocol carries (base64-encoded).
//!
//! ## Conversion Laws:
//! - Output length is `round(input_len / (from_rate / to_rate))`
//! - The end boundary clamps to the last source sample (no extrapolation)
//! - Quantization is `round(clamp(s, -1, 1) * 32768)` clamped to the i16 range

use crate::error::{EngineError, EngineResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use byteorder::{ByteOrder, LittleEndian};

/// Resample by linear interpolation between neighboring source samples.
///
/// Equal rates are an identity copy; an empty input yields an empty output.
pub fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || input.is_empty() {
        return input.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let new_len = (input.len() as f64 / ratio).round() as usize;
    let mut output = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_index = i as f64 * ratio;
        let floor = src_index as usize;
        let ceil = (floor + 1).min(input.len() - 1);
        let t = (src_index - floor as f64) as f32;
        let floor = floor.min(input.len() - 1);
        output.push(input[floor] * (1.0 - t) + input[ceil] * t);
    }

    output
}

/// Quantize float samples in [-1.0, 1.0] to signed 16-bit PCM.
pub fn quantize_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&sample| {
            let scaled = (f64::from(sample.clamp(-1.0, 1.0)) * 32768.0).round();
            scaled.clamp(-32768.0, 32767.0) as i16
        })
        .collect()
}

/// Convert signed 16-bit PCM samples back to floats in [-1.0, 1.0].
pub fn pcm16_to_float(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&sample| sample as f32 / 32768.0).collect()
}

/// Serialize PCM16 samples as little-endian bytes.
pub fn pcm16_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = vec![0u8; samples.len() * 2];
    LittleEndian::write_i16_into(samples, &mut bytes);
    bytes
}

/// Parse little-endian bytes as PCM16 samples.
///
/// An odd byte count cannot be valid 16-bit audio and is rejected.
pub fn bytes_to_pcm16(bytes: &[u8]) -> EngineResult<Vec<i16>> {
    if bytes.len() % 2 != 0 {
        return Err(EngineError::AudioDecode(
            "PCM data length must be even for 16-bit samples".to_string(),
        ));
    }

    let mut samples = vec![0i16; bytes.len() / 2];
    LittleEndian::read_i16_into(bytes, &mut samples);
    Ok(samples)
}

/// Resample, quantize and base64-encode one outbound chunk payload.
pub fn encode_chunk_payload(samples: &[f32], from_rate: u32, to_rate: u32) -> String {
    let resampled = resample_linear(samples, from_rate, to_rate);
    let pcm = quantize_pcm16(&resampled);
    BASE64.encode(pcm16_to_bytes(&pcm))
}

/// Decode a base64 wire payload back to raw bytes.
pub fn decode_base64_payload(payload: &str) -> EngineResult<Vec<u8>> {
    BASE64
        .decode(payload)
        .map_err(|err| EngineError::AudioDecode(format!("invalid base64 audio: {}", err)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_law_on_silence() {
        // 48kHz -> 16kHz over one second of silence: 48000 in, 16000 out, all zero
        let input = vec![0.0f32; 48000];
        let output = resample_linear(&input, 48000, 16000);
        assert_eq!(output.len(), 16000);
        assert!(output.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_identity_when_rates_match() {
        let input = vec![0.25f32, -0.5, 0.75];
        assert_eq!(resample_linear(&input, 16000, 16000), input);
    }

    #[test]
    fn test_upsample_interpolates_and_clamps_boundary() {
        // Two samples upsampled 3x: interpolated ramp, then the boundary
        // clamps to the last source sample
        let output = resample_linear(&[0.0, 1.0], 16000, 48000);
        assert_eq!(output.len(), 6);
        assert!((output[0] - 0.0).abs() < 1e-6);
        assert!((output[1] - 1.0 / 3.0).abs() < 1e-6);
        assert!((output[2] - 2.0 / 3.0).abs() < 1e-6);
        assert!((output[3] - 1.0).abs() < 1e-6);
        assert!((output[4] - 1.0).abs() < 1e-6);
        assert!((output[5] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_input() {
        assert!(resample_linear(&[], 48000, 16000).is_empty());
    }

    #[test]
    fn test_quantization_clamps_to_i16_range() {
        let pcm = quantize_pcm16(&[0.0, 0.5, -0.5, 1.0, -1.0, 2.0, -2.0]);
        assert_eq!(pcm, vec![0, 16384, -16384, 32767, -32768, 32767, -32768]);
    }

    #[test]
    fn test_pcm_round_trip_accuracy() {
        let pcm = vec![0i16, 16384, -16384, 32767, -32768];
        let floats = pcm16_to_float(&pcm);
        let back = quantize_pcm16(&floats);
        for (original, converted) in pcm.iter().zip(back.iter()) {
            let diff = (i32::from(*original) - i32::from(*converted)).abs();
            assert!(diff <= 1, "conversion error too large: {} vs {}", original, converted);
        }
    }

    #[test]
    fn test_byte_round_trip() {
        let pcm = vec![-1i16, 0, 1, 256, -256, i16::MAX, i16::MIN];
        let bytes = pcm16_to_bytes(&pcm);
        assert_eq!(bytes.len(), pcm.len() * 2);
        assert_eq!(bytes_to_pcm16(&bytes).unwrap(), pcm);
    }

    #[test]
    fn test_odd_byte_count_rejected() {
        assert!(bytes_to_pcm16(&[0u8, 1, 2]).is_err());
    }

    #[test]
    fn test_chunk_payload_encoding() {
        let payload = encode_chunk_payload(&[0.0f32; 480], 48000, 16000);
        let bytes = decode_base64_payload(&payload).unwrap();
        // 480 samples at 48kHz resample to 160 at 16kHz, two bytes each
        assert_eq!(bytes.len(), 320);
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_bad_base64_rejected() {
        assert!(decode_base64_payload("!!not base64!!").is_err());
    }
}
