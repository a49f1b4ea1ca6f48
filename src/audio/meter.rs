use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

const METER_FLOOR_DB: f32 = -60.0;

/// Lock-free input level readout shared between the engine thread and the
/// control surface.
#[derive(Clone, Debug)]
pub struct LevelMeter {
    level_bits: Arc<AtomicU32>,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self {
            level_bits: Arc::new(AtomicU32::new(METER_FLOOR_DB.to_bits())),
        }
    }

    pub fn set_db(&self, db: f32) {
        self.level_bits.store(db.to_bits(), Ordering::Relaxed);
    }

    pub fn level_db(&self) -> f32 {
        f32::from_bits(self.level_bits.load(Ordering::Relaxed))
    }

    /// Reset to the floor, used when capture stops.
    pub fn reset(&self) {
        self.set_db(METER_FLOOR_DB);
    }
}

impl Default for LevelMeter {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn rms_db(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return METER_FLOOR_DB;
    }
    let energy: f32 = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    let rms = energy.sqrt().max(1e-6);
    20.0 * rms.log10()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meter_defaults_to_floor() {
        let meter = LevelMeter::new();
        assert_eq!(meter.level_db(), METER_FLOOR_DB);
    }

    #[test]
    fn meter_updates_and_resets() {
        let meter = LevelMeter::new();
        meter.set_db(-18.5);
        assert_eq!(meter.level_db(), -18.5);
        meter.reset();
        assert_eq!(meter.level_db(), METER_FLOOR_DB);
    }

    #[test]
    fn rms_db_handles_empty() {
        assert_eq!(rms_db(&[]), METER_FLOOR_DB);
    }

    #[test]
    fn rms_db_of_full_scale_is_near_zero() {
        let samples = vec![1.0_f32; 512];
        assert!(rms_db(&samples).abs() < 0.01);
    }
}
