//! Command-line parsing and validation helpers.

mod defaults;
#[cfg(test)]
mod tests;
mod validation;

use clap::Parser;

use crate::audio::RunParams;
pub use defaults::{
    DEFAULT_BLOCK_SECONDS, DEFAULT_CHANNEL_CAPACITY, DEFAULT_GAIN, DEFAULT_SAMPLE_RATE,
    DEFAULT_SPEED, MAX_BLOCK_SECONDS, MAX_CHANNEL_CAPACITY, MAX_GAIN, MAX_SAMPLE_RATE, MAX_SPEED,
    MIN_BLOCK_SECONDS, MIN_CHANNEL_CAPACITY, MIN_SAMPLE_RATE, MIN_SPEED,
};

/// CLI options for the blockrelay pipeline. Validated values keep the audio
/// threads free of range checks.
#[derive(Debug, Parser, Clone)]
#[command(about = "blockrelay store-and-forward audio relay", author, version)]
pub struct AppConfig {
    /// Preferred audio input device name
    #[arg(long)]
    pub input_device: Option<String>,

    /// Preferred audio output device name
    #[arg(long)]
    pub output_device: Option<String>,

    /// Print detected audio input devices and exit
    #[arg(long = "list-input-devices", default_value_t = false)]
    pub list_input_devices: bool,

    /// Print detected audio output devices and exit
    #[arg(long = "list-output-devices", default_value_t = false)]
    pub list_output_devices: bool,

    /// Block duration in seconds (2-10)
    #[arg(long = "block-seconds", default_value_t = DEFAULT_BLOCK_SECONDS)]
    pub block_seconds: u64,

    /// Gain multiplier applied to each replayed block
    #[arg(long, default_value_t = DEFAULT_GAIN)]
    pub gain: f32,

    /// Playback speed multiplier applied to each replayed block
    #[arg(long, default_value_t = DEFAULT_SPEED)]
    pub speed: f32,

    /// Sample rate for captured blocks (Hz)
    #[arg(long = "sample-rate", default_value_t = DEFAULT_SAMPLE_RATE)]
    pub sample_rate: u32,

    /// Capture chunk channel capacity between device and engine threads
    #[arg(long = "channel-capacity", default_value_t = DEFAULT_CHANNEL_CAPACITY)]
    pub channel_capacity: usize,

    /// Stop automatically after this many seconds (otherwise reads stdin)
    #[arg(long = "run-seconds")]
    pub run_seconds: Option<u64>,

    /// Emit status lines as JSON instead of plain text
    #[arg(long)]
    pub json: bool,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "BLOCKRELAY_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "BLOCKRELAY_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Enable verbose timing logs
    #[arg(long)]
    pub log_timings: bool,
}

impl AppConfig {
    /// Snapshot of the per-block parameters the scheduler reads.
    pub fn run_params(&self) -> RunParams {
        RunParams {
            gain: self.gain,
            speed: self.speed,
            block_seconds: self.block_seconds,
        }
    }
}
