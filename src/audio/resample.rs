//! Rate conversion for capture normalization and playback-speed change.
//!
//! Linear interpolation with an FIR low-pass ahead of any decimation. Speed
//! change is the same primitive driven by a raw ratio, which is why a speed
//! multiplier also shifts pitch.

use std::f32::consts::PI;

// Practical guard rails for device rates and conversion ratios.
pub(super) const MIN_RATE: u32 = 2_000;
pub(super) const MAX_RATE: u32 = 384_000;
pub(super) const MIN_RATIO: f32 = 0.01;
pub(super) const MAX_RATIO: f32 = 16.0;
const MAX_DOWNSAMPLING_TAPS: usize = 129;

/// Convert `input` from `from_rate` to `to_rate`. Out-of-range rates and
/// empty input fall back to a copy rather than an error; capture cadence is
/// not under our control.
pub(super) fn resample_to_rate(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == 0 || to_rate == 0 {
        return input.to_vec();
    }
    if input.is_empty() || from_rate == to_rate {
        return input.to_vec();
    }
    if !(MIN_RATE..=MAX_RATE).contains(&from_rate) || !(MIN_RATE..=MAX_RATE).contains(&to_rate) {
        return input.to_vec();
    }

    let ratio = (to_rate as f32 / from_rate as f32).clamp(MIN_RATIO, MAX_RATIO);
    let filtered = if from_rate > to_rate {
        // Decimation needs a low-pass first so high frequencies do not alias.
        let taps = downsampling_tap_count(from_rate, to_rate);
        low_pass_fir(input, from_rate, to_rate, taps)
    } else {
        input.to_vec()
    };
    resample_linear(&filtered, ratio)
}

/// Linear resampler over a raw length ratio; output length is
/// `round(input.len() * ratio)`.
pub(super) fn resample_linear(input: &[f32], ratio: f32) -> Vec<f32> {
    if input.is_empty() || !ratio.is_finite() || ratio <= 0.0 {
        return Vec::new();
    }
    let ratio = ratio.clamp(MIN_RATIO, MAX_RATIO);
    let input_len = input.len();
    let output_len = ((input_len as f32 * ratio).round() as usize).max(1);
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_idx = i as f32 / ratio;
        let idx = src_idx.floor() as usize;
        let frac = src_idx - idx as f32;

        if idx + 1 < input_len {
            let sample = input[idx] * (1.0 - frac) + input[idx + 1] * frac;
            output.push(sample);
        } else {
            let pad = input.last().copied().unwrap_or(0.0);
            output.push(pad);
        }
    }

    output
}

/// Pick a tap count from the decimation ratio so the FIR stays short for
/// near-equal rates and longer for aggressive downsampling.
pub(super) fn downsampling_tap_count(from_rate: u32, to_rate: u32) -> usize {
    let decimation_ratio = from_rate as f32 / to_rate.max(1) as f32;
    let mut taps = (decimation_ratio * 4.0).ceil().max(11.0) as usize;
    if taps % 2 == 0 {
        taps += 1;
    }
    taps.min(MAX_DOWNSAMPLING_TAPS)
}

/// FIR low-pass that tames frequencies above the destination Nyquist before
/// samples are dropped.
pub(super) fn low_pass_fir(input: &[f32], from_rate: u32, to_rate: u32, taps: usize) -> Vec<f32> {
    if input.is_empty() || taps <= 1 {
        return input.to_vec();
    }

    let normalized_cutoff = (to_rate as f32 * 0.5 / from_rate as f32).min(0.499);
    let coeffs = design_low_pass(normalized_cutoff, taps);
    let half = taps / 2;
    let mut output = Vec::with_capacity(input.len());

    for n in 0..input.len() {
        let mut acc = 0.0;
        for (k, coeff) in coeffs.iter().enumerate() {
            if let Some(idx) = n.checked_add(k).and_then(|sum| sum.checked_sub(half)) {
                if let Some(sample) = input.get(idx) {
                    acc += *sample * coeff;
                }
            }
        }
        output.push(acc);
    }

    output
}

/// Build the normalized Hamming-windowed sinc taps used by the FIR filter.
pub(super) fn design_low_pass(normalized_cutoff: f32, taps: usize) -> Vec<f32> {
    let mut coeffs = Vec::with_capacity(taps);
    let m = (taps - 1) as f32;

    for n in 0..taps {
        let centered = n as f32 - m / 2.0;
        let x = 2.0 * PI * normalized_cutoff * centered;
        let sinc = if centered == 0.0 {
            2.0 * normalized_cutoff
        } else {
            (2.0 * normalized_cutoff * x.sin()) / x
        };
        let window = if taps <= 1 {
            1.0
        } else {
            0.54 - 0.46 * ((2.0 * PI * n as f32) / m).cos()
        };
        coeffs.push(sinc * window);
    }

    let sum: f32 = coeffs.iter().sum();
    if sum != 0.0 {
        for coeff in coeffs.iter_mut() {
            *coeff /= sum;
        }
    }

    coeffs
}
