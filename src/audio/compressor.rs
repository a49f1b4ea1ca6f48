//! Soft-knee dynamics compression for clipping safety.
//!
//! A fresh instance processes each scheduled block after gain, so a hot gain
//! setting cannot push the output into hard clipping. Feed-forward design:
//! a static gain curve smoothed by an exponential attack/release envelope.

/// Static curve and ballistics for one compressor pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressorParams {
    pub threshold_db: f32,
    pub knee_db: f32,
    pub ratio: f32,
    pub attack_secs: f32,
    pub release_secs: f32,
}

impl CompressorParams {
    /// Fixed clipping-safety curve applied to every replayed block.
    pub const fn block_safety() -> Self {
        Self {
            threshold_db: -3.0,
            knee_db: 18.0,
            ratio: 2.5,
            attack_secs: 0.002,
            release_secs: 0.2,
        }
    }
}

/// Feed-forward compressor with exponential envelope smoothing.
pub struct Compressor {
    params: CompressorParams,
    attack_coeff: f32,
    release_coeff: f32,
    /// Smoothed gain reduction in dB, always <= 0.
    reduction_db: f32,
}

impl Compressor {
    pub fn new(params: CompressorParams, sample_rate: u32) -> Self {
        let rate = sample_rate.max(1) as f32;
        // First-order exponential: coeff = exp(-1 / (tau * fs)).
        let attack_coeff = (-1.0 / (params.attack_secs.max(1e-5) * rate)).exp();
        let release_coeff = (-1.0 / (params.release_secs.max(1e-5) * rate)).exp();
        Self {
            params,
            attack_coeff,
            release_coeff,
            reduction_db: 0.0,
        }
    }

    /// Compress `samples` in place.
    pub fn process(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            let level_db = 20.0 * sample.abs().max(1e-6).log10();
            let target_db = self.static_gain_db(level_db);
            // Attack pulls reduction down fast; release recovers slowly.
            let coeff = if target_db < self.reduction_db {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.reduction_db = self.reduction_db * coeff + target_db * (1.0 - coeff);
            *sample *= 10.0_f32.powf(self.reduction_db / 20.0);
        }
    }

    /// Gain reduction in dB (<= 0) for an input level, with a soft knee
    /// centered on the threshold.
    fn static_gain_db(&self, level_db: f32) -> f32 {
        let p = &self.params;
        let over = level_db - p.threshold_db;
        let out_db = if 2.0 * over < -p.knee_db {
            level_db
        } else if 2.0 * over.abs() <= p.knee_db {
            let knee_term = over + p.knee_db / 2.0;
            level_db + (1.0 / p.ratio - 1.0) * knee_term * knee_term / (2.0 * p.knee_db)
        } else {
            p.threshold_db + over / p.ratio
        };
        (out_db - level_db).min(0.0)
    }
}
