//! Sample-rate conversion, channel downmix and wire packing.
//!
//! The outbound channel expects **16 kHz mono 16-bit little-endian** PCM;
//! capture devices deliver interleaved `f32` at their native rate (commonly
//! 44.1 or 48 kHz).  These helpers run inside the capture callback, so they
//! are allocation-minimal and strictly linear in the frame size — no
//! blocking, no waiting, no unbounded work.
//!
//! The resampler is linear interpolation.  Speech headed for a remote model
//! does not need a windowed-sinc kernel, and the interpolation loop fits the
//! callback's timing budget on every platform.

// ---------------------------------------------------------------------------
// downmix_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging channels.
///
/// * `channels == 1` returns an owned copy (fast path, no averaging).
/// * `channels == 0` returns an empty vector.
///
/// # Example
///
/// ```rust
/// use live_grounding::audio::downmix_to_mono;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, -0.2]; // L R L R
/// let mono = downmix_to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!(mono[0].abs() < 1e-6);
/// ```
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// resample_linear
// ---------------------------------------------------------------------------

/// Resample mono `samples` from `from_rate` Hz to `to_rate` Hz using linear
/// interpolation.
///
/// * Equal rates return the input unchanged (no-op fast path).
/// * Empty input or a zero rate returns an empty vector.
///
/// The output length is approximately `samples.len() * to_rate / from_rate`.
///
/// # Example
///
/// ```rust
/// use live_grounding::audio::resample_linear;
///
/// // 10 ms @ 48 kHz → 10 ms @ 16 kHz
/// let out = resample_linear(&vec![0.5_f32; 480], 48_000, 16_000);
/// assert_eq!(out.len(), 160);
/// ```
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate {
        return samples.to_vec();
    }

    if samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return Vec::new();
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;

        let sample = if idx + 1 < samples.len() {
            // Linear interpolation between adjacent samples
            samples[idx] * (1.0 - frac as f32) + samples[idx + 1] * frac as f32
        } else if idx < samples.len() {
            samples[idx]
        } else {
            0.0
        };

        output.push(sample);
    }

    output
}

// ---------------------------------------------------------------------------
// pack_i16_le
// ---------------------------------------------------------------------------

/// Convert `f32` samples in `[-1.0, 1.0]` to 16-bit signed little-endian
/// bytes, clamping out-of-range input.
///
/// Output length is `samples.len() * 2`.
pub fn pack_i16_le(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
