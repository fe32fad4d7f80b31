//! Sample format, layout, and channel conversion.
//!
//! All backends funnel through the same two-step pipeline: decode whatever
//! the platform delivers into `f32` in `[-1.0, 1.0]`, then clip and
//! quantize to interleaved signed 16-bit little-endian. Keeping the
//! decoders here (rather than inside the platform modules) makes the
//! numeric rules testable on every host.

/// Quantizes one `f32` sample to `i16`.
///
/// The sample is clipped to `[-1.0, 1.0]` first and then scaled by 32767,
/// so both extremes map symmetrically: `1.0 → 32767`, `-1.0 → -32767`.
/// Out-of-range input saturates at those same values.
#[inline]
#[must_use]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0) as i16
}

/// Converts an `i16` sample to `f32` in `[-1.0, 1.0)`.
#[inline]
#[must_use]
pub fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / 32768.0
}

/// Quantizes a float buffer to 16-bit little-endian PCM bytes.
#[must_use]
pub fn quantize_f32_le(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        out.extend_from_slice(&f32_to_i16(sample).to_le_bytes());
    }
    out
}

/// Re-encodes interleaved `i16` samples as little-endian bytes.
#[must_use]
pub fn i16_slice_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

/// Decodes 16-bit PCM bytes to `f32` (scale 1/2^15).
///
/// Trailing bytes that do not form a whole sample are ignored.
#[must_use]
pub fn decode_pcm16(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|b| f32::from(i16::from_le_bytes([b[0], b[1]])) / 32768.0)
        .collect()
}

/// Decodes packed 24-bit PCM bytes to `f32`.
///
/// Each 3-byte sample is placed in the high 24 bits of an `i32`, which
/// sign-extends arithmetically by construction, then scaled by 1/2^31.
/// The lowest negative sample `[00 00 80]` therefore decodes to exactly
/// `-1.0` and the highest positive `[FF FF 7F]` to just under `1.0`.
#[must_use]
pub fn decode_pcm24(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(3)
        .map(|b| {
            let packed =
                (u32::from(b[0]) << 8 | u32::from(b[1]) << 16 | u32::from(b[2]) << 24) as i32;
            packed as f32 / 2_147_483_648.0
        })
        .collect()
}

/// Decodes 32-bit PCM bytes to `f32` (scale 1/2^31).
#[must_use]
pub fn decode_pcm32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32 / 2_147_483_648.0)
        .collect()
}

/// Reinterprets 32-bit IEEE float bytes as `f32` samples.
#[must_use]
pub fn decode_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Interleaves planar (non-interleaved) float channels by frame.
///
/// `planes[c]` holds channel `c`'s samples; output index `frame * C + c`
/// receives `planes[c][frame]`. The frame count is the shortest plane so
/// a short channel never produces a partial frame.
#[must_use]
pub fn interleave_planar_f32(planes: &[&[f32]]) -> Vec<f32> {
    let channels = planes.len();
    if channels == 0 {
        return Vec::new();
    }
    let frames = planes.iter().map(|p| p.len()).min().unwrap_or(0);

    let mut out = Vec::with_capacity(frames * channels);
    for frame in 0..frames {
        for plane in planes {
            out.push(plane[frame]);
        }
    }
    out
}

/// Normalizes interleaved `i16` frames to stereo.
///
/// Mono frames are duplicated into both channels; stereo passes through;
/// wider layouts keep their first two channels (no remapping). Trailing
/// samples short of a whole frame are dropped.
#[must_use]
pub fn to_stereo(samples: &[i16], channels: u16) -> Vec<i16> {
    match channels {
        0 => Vec::new(),
        1 => samples.iter().flat_map(|&s| [s, s]).collect(),
        2 => samples.to_vec(),
        n => samples
            .chunks_exact(usize::from(n))
            .flat_map(|frame| [frame[0], frame[1]])
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_to_i16_reference_points() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(1.0), 32767);
        assert_eq!(f32_to_i16(-1.0), -32767);
    }

    #[test]
    fn test_f32_to_i16_saturates_out_of_range() {
        assert_eq!(f32_to_i16(2.0), 32767);
        assert_eq!(f32_to_i16(-2.0), -32767);
    }

    #[test]
    fn test_i16_round_trip_within_one_lsb() {
        for &original in &[0i16, 1, -1, 1000, -1000, 32767, -32767] {
            let back = f32_to_i16(i16_to_f32(original));
            assert!((i32::from(original) - i32::from(back)).abs() <= 1);
        }
    }

    #[test]
    fn test_quantize_f32_le_layout() {
        let bytes = quantize_f32_le(&[0.0, 1.0, -1.0]);
        assert_eq!(bytes.len(), 6);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), 0);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), 32767);
        assert_eq!(i16::from_le_bytes([bytes[4], bytes[5]]), -32767);
    }

    #[test]
    fn test_decode_pcm16_scale() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&i16::MIN.to_le_bytes());
        bytes.extend_from_slice(&i16::MAX.to_le_bytes());
        bytes.extend_from_slice(&0i16.to_le_bytes());

        let samples = decode_pcm16(&bytes);
        assert_eq!(samples[0], -1.0);
        assert!((samples[1] - 0.99997).abs() < 1e-4);
        assert_eq!(samples[2], 0.0);
    }

    #[test]
    fn test_decode_pcm24_boundaries() {
        // Lowest negative and highest positive 24-bit samples.
        let samples = decode_pcm24(&[0x00, 0x00, 0x80, 0xFF, 0xFF, 0x7F]);
        assert_eq!(samples[0], -1.0);
        assert!(samples[1] > 0.9999 && samples[1] < 1.0);

        // Quantized output lands within one step of the 16-bit extremes.
        let min = f32_to_i16(samples[0]);
        let max = f32_to_i16(samples[1]);
        assert!((i32::from(min) - (-32768)).abs() <= 1);
        assert!((i32::from(max) - 32767).abs() <= 1);
    }

    #[test]
    fn test_decode_pcm24_sign_extension() {
        // 0x800001 is barely above the negative extreme, not a large
        // positive value: the top byte must carry the sign.
        let samples = decode_pcm24(&[0x01, 0x00, 0x80]);
        assert!(samples[0] < -0.999);
    }

    #[test]
    fn test_decode_pcm32_scale() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&i32::MIN.to_le_bytes());
        bytes.extend_from_slice(&(i32::MAX / 2).to_le_bytes());

        let samples = decode_pcm32(&bytes);
        assert_eq!(samples[0], -1.0);
        assert!((samples[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_decode_f32_verbatim() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0.25f32.to_le_bytes());
        bytes.extend_from_slice(&(-0.5f32).to_le_bytes());
        assert_eq!(decode_f32(&bytes), vec![0.25, -0.5]);
    }

    #[test]
    fn test_decode_ignores_trailing_partial_sample() {
        assert_eq!(decode_pcm16(&[0x00, 0x00, 0x7F]).len(), 1);
        assert_eq!(decode_pcm24(&[0, 0, 0, 0]).len(), 1);
    }

    #[test]
    fn test_interleave_planar_orders_by_frame() {
        let left = [1.0f32, 2.0, 3.0];
        let right = [-1.0f32, -2.0, -3.0];
        let interleaved = interleave_planar_f32(&[&left, &right]);
        assert_eq!(interleaved, vec![1.0, -1.0, 2.0, -2.0, 3.0, -3.0]);
    }

    #[test]
    fn test_interleave_planar_truncates_to_shortest_plane() {
        let left = [1.0f32, 2.0, 3.0];
        let right = [-1.0f32];
        let interleaved = interleave_planar_f32(&[&left, &right]);
        assert_eq!(interleaved, vec![1.0, -1.0]);
    }

    #[test]
    fn test_interleave_planar_empty() {
        assert!(interleave_planar_f32(&[]).is_empty());
    }

    #[test]
    fn test_planar_sine_and_silence_quantize() {
        // One channel carries a 440 Hz sine, the other is silent; after
        // interleaving, even samples follow the sine and odd samples are
        // zero, with the full buffer sized frames * channels * 2 bytes.
        let frames = 1024;
        let sine: Vec<f32> = (0..frames)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 48000.0).sin())
            .collect();
        let silence = vec![0.0f32; frames];

        let interleaved = interleave_planar_f32(&[&sine, &silence]);
        let bytes = quantize_f32_le(&interleaved);
        assert_eq!(bytes.len(), frames * 2 * 2);

        let samples: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        for (i, pair) in samples.chunks_exact(2).enumerate() {
            assert_eq!(pair[0], f32_to_i16(sine[i]));
            assert_eq!(pair[1], 0);
        }
    }

    #[test]
    fn test_to_stereo_duplicates_mono() {
        assert_eq!(to_stereo(&[100, 200], 1), vec![100, 100, 200, 200]);
    }

    #[test]
    fn test_to_stereo_passes_stereo_through() {
        assert_eq!(to_stereo(&[1, 2, 3, 4], 2), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_to_stereo_truncates_wider_layouts() {
        // Two 4-channel frames keep only their front pair.
        let quad = [1i16, 2, 3, 4, 5, 6, 7, 8];
        assert_eq!(to_stereo(&quad, 4), vec![1, 2, 5, 6]);
    }

    #[test]
    fn test_to_stereo_zero_channels_is_empty() {
        assert!(to_stereo(&[1, 2, 3], 0).is_empty());
    }
}
