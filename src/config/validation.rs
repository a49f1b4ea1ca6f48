use super::defaults::{
    FORBIDDEN_DEVICE_CHARS, MAX_BLOCK_SECONDS, MAX_CHANNEL_CAPACITY, MAX_GAIN, MAX_SAMPLE_RATE,
    MAX_SPEED, MIN_BLOCK_SECONDS, MIN_CHANNEL_CAPACITY, MIN_SAMPLE_RATE, MIN_SPEED,
};
use super::AppConfig;
use anyhow::{bail, Result};
use clap::Parser;

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values before any audio device is touched.
    pub fn validate(&mut self) -> Result<()> {
        if !(MIN_BLOCK_SECONDS..=MAX_BLOCK_SECONDS).contains(&self.block_seconds) {
            bail!(
                "--block-seconds must be between {MIN_BLOCK_SECONDS} and {MAX_BLOCK_SECONDS}, got {}",
                self.block_seconds
            );
        }
        if !self.gain.is_finite() || !(0.0..=MAX_GAIN).contains(&self.gain) {
            bail!("--gain must be between 0.0 and {MAX_GAIN}, got {}", self.gain);
        }
        if !self.speed.is_finite() || !(MIN_SPEED..=MAX_SPEED).contains(&self.speed) {
            bail!(
                "--speed must be between {MIN_SPEED} and {MAX_SPEED}, got {}",
                self.speed
            );
        }
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            bail!(
                "--sample-rate must be between {MIN_SAMPLE_RATE} and {MAX_SAMPLE_RATE} Hz, got {}",
                self.sample_rate
            );
        }
        if !(MIN_CHANNEL_CAPACITY..=MAX_CHANNEL_CAPACITY).contains(&self.channel_capacity) {
            bail!(
                "--channel-capacity must be between {MIN_CHANNEL_CAPACITY} and {MAX_CHANNEL_CAPACITY}, got {}",
                self.channel_capacity
            );
        }
        if let Some(run_seconds) = self.run_seconds {
            if run_seconds == 0 {
                bail!("--run-seconds must be at least 1");
            }
        }
        validate_device_name("--input-device", self.input_device.as_deref())?;
        validate_device_name("--output-device", self.output_device.as_deref())?;
        Ok(())
    }
}

fn validate_device_name(flag: &str, name: Option<&str>) -> Result<()> {
    let Some(name) = name else {
        return Ok(());
    };
    if name.trim().is_empty() {
        bail!("{flag} must not be empty");
    }
    if name.chars().any(|c| FORBIDDEN_DEVICE_CHARS.contains(&c)) {
        bail!("{flag} contains control characters");
    }
    Ok(())
}
