//! Audio format conversion utilities.
//!
//! Every backend normalizes to the same output here:
//! - Sample decode (PCM 16/24/32 and IEEE float → `f32` in `[-1, 1]`)
//! - Layout conversion (planar → interleaved)
//! - Channel normalization (mono/multichannel → stereo where forced)
//! - Quantization (clip, scale by 32767, 16-bit little-endian)
//! - Sample rate conversion (linear interpolation)

mod convert;
mod resample;

pub use convert::{
    decode_f32, decode_pcm16, decode_pcm24, decode_pcm32, f32_to_i16, i16_slice_to_le_bytes,
    i16_to_f32, interleave_planar_f32, quantize_f32_le, to_stereo,
};
pub use resample::{resample, resample_stereo};
