//! Optional in-graph sample transform stage.
//!
//! Placeholder seam for future real-time pitch/time processing. `start`
//! treats installation as a capability negotiation: a failure here is logged
//! and recorded, never allowed to abort the primary capture path.

use anyhow::Result;

/// Per-chunk transform applied to capture audio before block accumulation.
pub trait SampleTransform: Send {
    fn process(&mut self, samples: &mut [f32]);
    fn name(&self) -> &'static str {
        "unknown_transform"
    }
}

/// Identity stage; real-time pitch/time processing is not implemented in this
/// version (speed change happens at schedule time as linear resampling).
pub struct PassthroughTransform;

impl PassthroughTransform {
    /// Fallible by contract so callers exercise the capability path even
    /// though the pass-through itself cannot fail.
    pub fn install() -> Result<Self> {
        Ok(Self)
    }
}

impl SampleTransform for PassthroughTransform {
    fn process(&mut self, _samples: &mut [f32]) {}

    fn name(&self) -> &'static str {
        "passthrough"
    }
}
