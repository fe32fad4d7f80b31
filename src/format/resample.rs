//! Sample rate conversion.
//!
//! Linear interpolation only: fast, allocation-light, and good enough for
//! the 44.1 kHz → 48 kHz normalization the microphone path needs. Large
//! ratio changes would want a polyphase resampler instead.

/// Resamples a mono buffer from `from_rate` to `to_rate`.
///
/// Returns the input unchanged when the rates already match. A zero
/// `from_rate` or `to_rate` yields an empty buffer rather than panicking;
/// backends validate rates before calling.
#[must_use]
pub fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate {
        return samples.to_vec();
    }
    if samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return Vec::new();
    }

    let step = f64::from(from_rate) / f64::from(to_rate);
    let output_len = (samples.len() as f64 / step).ceil() as usize;
    let mut out = Vec::with_capacity(output_len);

    let mut pos = 0.0f64;
    for _ in 0..output_len {
        let idx = pos as usize;
        let frac = pos - idx as f64;

        let sample = match (samples.get(idx), samples.get(idx + 1)) {
            (Some(&a), Some(&b)) => {
                (f64::from(a) + (f64::from(b) - f64::from(a)) * frac) as i16
            }
            (Some(&a), None) => a,
            // pos ran past the input; hold the final sample.
            (None, _) => *samples.last().unwrap_or(&0),
        };
        out.push(sample);
        pos += step;
    }

    out
}

/// Resamples interleaved stereo by processing each channel independently.
///
/// A trailing half-frame (odd sample count) is dropped so the output is
/// always whole frames.
#[must_use]
pub fn resample_stereo(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate {
        return samples[..samples.len() & !1].to_vec();
    }

    let frames = samples.len() / 2;
    let mut left = Vec::with_capacity(frames);
    let mut right = Vec::with_capacity(frames);
    for frame in samples.chunks_exact(2) {
        left.push(frame[0]);
        right.push(frame[1]);
    }

    let left = resample(&left, from_rate, to_rate);
    let right = resample(&right, from_rate, to_rate);

    let mut out = Vec::with_capacity(left.len() * 2);
    for (l, r) in left.into_iter().zip(right) {
        out.push(l);
        out.push(r);
    }
    out
}
