//! Capture-buffering engine and block scheduler.
//!
//! Captures a live mono input stream, closes fixed-duration blocks into a
//! FIFO, and replays them back-to-back on the output timeline while the next
//! blocks are still being recorded. Each scheduled block applies gain, a
//! playback-speed change (linear resampling, pitch moves with it), and a
//! clipping-safety compressor.

mod block;
mod capture;
mod compressor;
mod engine;
mod input;
mod meter;
mod output;
mod render;
mod resample;
mod scheduler;
#[cfg(test)]
mod tests;
mod transform;

pub use block::{AudioBlock, BlockQueue};
pub use capture::CaptureBuffer;
pub use compressor::{Compressor, CompressorParams};
pub use engine::{AudioEngine, EngineCallbacks, EngineState, EngineStatus};
pub use input::InputDevice;
pub use meter::LevelMeter;
pub use output::CpalOutput;
pub use render::{render_block, BlockProgram, CompletionFn, RenderSink};
pub use scheduler::{PlaybackScheduler, RunParams, LOOKAHEAD_SECS, MIN_START_OFFSET_SECS};
pub use transform::{PassthroughTransform, SampleTransform};
