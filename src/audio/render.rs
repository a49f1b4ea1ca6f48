//! Per-block rendering and the output timeline seam.
//!
//! Each block pulled off the queue is rendered into final PCM (speed change,
//! gain, compression) and handed to a [`RenderSink`] with an absolute start
//! time on the sink's monotonic clock.

use super::block::AudioBlock;
use super::compressor::{Compressor, CompressorParams};
use super::resample::{resample_linear, MAX_RATIO, MIN_RATIO};
use anyhow::Result;

/// Callback fired once playback of a scheduled program ends.
pub type CompletionFn = Box<dyn FnOnce() + Send>;

/// Rendered playback unit ready for the output timeline.
#[derive(Debug, Clone)]
pub struct BlockProgram {
    /// Identifier of the block this program was rendered from.
    pub block_id: u64,
    /// Final mono PCM at the sink's sample rate.
    pub samples: Vec<f32>,
    /// Sample rate the payload is rendered at.
    pub sample_rate: u32,
}

impl BlockProgram {
    /// Playback duration on the sink's timeline.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }
}

/// Output timeline accepting rendered programs at absolute start times.
///
/// Implementations must not invoke `on_complete` from inside `schedule`; the
/// scheduler re-enters itself through that callback and holds no lock while
/// calling `schedule`, but a synchronous completion would recurse.
pub trait RenderSink: Send + Sync {
    /// Current position on the monotonic render clock, in seconds.
    fn now(&self) -> f64;

    /// Sample rate programs should be rendered at.
    fn sample_rate(&self) -> u32;

    /// Place a program on the timeline starting at `start_at` seconds.
    fn schedule(&self, program: BlockProgram, start_at: f64, on_complete: CompletionFn)
        -> Result<()>;

    /// Drop everything scheduled and suppress pending completions.
    fn clear(&self);
}

/// Resample ratio for a block landing on a sink: rate conversion divided by
/// playback speed, clamped to the resampler's working range. Non-finite or
/// non-positive speeds fall back to unity.
pub(super) fn conversion_ratio(block_rate: u32, sink_rate: u32, speed: f32) -> f32 {
    let speed = if speed.is_finite() && speed > 0.0 {
        speed
    } else {
        1.0
    };
    let rate_ratio = if block_rate == 0 {
        1.0
    } else {
        sink_rate as f32 / block_rate as f32
    };
    (rate_ratio / speed).clamp(MIN_RATIO, MAX_RATIO)
}

/// Playback time `render_block` will occupy on the sink's timeline. Computed
/// from the same clamped ratio as the render itself, so the reserved interval
/// never outruns the rendered payload.
pub(super) fn scheduled_duration_secs(block: &AudioBlock, speed: f32, sink_rate: u32) -> f64 {
    if sink_rate == 0 {
        return 0.0;
    }
    let ratio = conversion_ratio(block.sample_rate, sink_rate, speed);
    block.samples.len() as f64 * f64::from(ratio) / f64::from(sink_rate)
}

/// Render a block through its processing chain: playback-speed resample,
/// gain (floored at zero), then a fresh clipping-safety compressor.
///
/// The output length is `len * (sink_rate / block_rate) / speed`, so playback
/// duration equals `block duration / speed` regardless of a rate mismatch.
pub fn render_block(
    block: &AudioBlock,
    gain: f32,
    speed: f32,
    comp: CompressorParams,
    sink_rate: u32,
) -> BlockProgram {
    let ratio = conversion_ratio(block.sample_rate, sink_rate, speed);

    let mut samples = resample_linear(&block.samples, ratio);

    let gain = if gain.is_finite() { gain.max(0.0) } else { 0.0 };
    for sample in samples.iter_mut() {
        *sample *= gain;
    }

    let mut compressor = Compressor::new(comp, sink_rate);
    compressor.process(&mut samples);

    BlockProgram {
        block_id: block.id,
        samples,
        sample_rate: sink_rate,
    }
}
