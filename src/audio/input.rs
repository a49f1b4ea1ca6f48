//! Capture device acquisition and chunk delivery via CPAL.
//!
//! The device runs at its native rate and channel layout; every callback is
//! downmixed to mono f32 and forwarded to the engine thread over a bounded
//! channel. cpal streams are not `Send`, so the stream lives on a dedicated
//! worker thread torn down through a shutdown channel.

use crate::log_debug;
use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Audio input device wrapper.
pub struct InputDevice {
    device: cpal::Device,
}

impl InputDevice {
    /// List input device names so the CLI can expose a selector.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.input_devices().context("no input devices available")?;
        let mut names = Vec::new();
        for device in devices {
            if let Ok(name) = device.name() {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Open the default input, or a specific device when the user picked one.
    pub fn new(preferred_device: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();
        let device = match preferred_device {
            Some(name) => {
                let mut devices = host.input_devices().context("no input devices available")?;
                devices
                    .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                    .ok_or_else(|| anyhow!("input device '{name}' not found"))?
            }
            None => host.default_input_device().with_context(|| {
                format!("no default input device available. {}", mic_permission_hint())
            })?,
        };
        Ok(Self { device })
    }

    /// Name of the active capture device.
    pub fn device_name(&self) -> String {
        self.device
            .name()
            .unwrap_or_else(|_| "Unknown Device".to_string())
    }

    /// Start streaming mono chunks into `chunk_tx` from a worker thread.
    /// Overfull sends bump `dropped` instead of blocking the device callback.
    pub(crate) fn spawn_capture(
        self,
        chunk_tx: Sender<Vec<f32>>,
        dropped: Arc<AtomicUsize>,
    ) -> Result<CaptureWorker> {
        let (ready_tx, ready_rx) = bounded::<Result<u32>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

        let handle = thread::spawn(move || {
            let default_config = match self.device.default_input_config() {
                Ok(config) => config,
                Err(err) => {
                    let _ = ready_tx.send(Err(anyhow!("no usable input config: {err}")));
                    return;
                }
            };
            let format = default_config.sample_format();
            let device_config: StreamConfig = default_config.into();
            let device_rate = device_config.sample_rate.0;
            let channels = usize::from(device_config.channels.max(1));

            log_debug(&format!(
                "capture config: format={format:?} sample_rate={device_rate}Hz channels={channels}"
            ));

            let err_fn = |err| log_debug(&format!("input_stream_error: {err}"));
            let stream = match format {
                SampleFormat::F32 => {
                    let tx = chunk_tx.clone();
                    let dropped = dropped.clone();
                    self.device.build_input_stream(
                        &device_config,
                        move |data: &[f32], _| {
                            forward_chunk(data, channels, |sample| sample, &tx, &dropped);
                        },
                        err_fn,
                        None,
                    )
                }
                SampleFormat::I16 => {
                    let tx = chunk_tx.clone();
                    let dropped = dropped.clone();
                    self.device.build_input_stream(
                        &device_config,
                        move |data: &[i16], _| {
                            forward_chunk(
                                data,
                                channels,
                                |sample| sample as f32 / 32_768.0,
                                &tx,
                                &dropped,
                            );
                        },
                        err_fn,
                        None,
                    )
                }
                SampleFormat::U16 => {
                    let tx = chunk_tx.clone();
                    let dropped = dropped.clone();
                    self.device.build_input_stream(
                        &device_config,
                        move |data: &[u16], _| {
                            forward_chunk(
                                data,
                                channels,
                                |sample| (sample as f32 - 32_768.0) / 32_768.0,
                                &tx,
                                &dropped,
                            );
                        },
                        err_fn,
                        None,
                    )
                }
                other => {
                    let _ = ready_tx.send(Err(anyhow!("unsupported sample format: {other:?}")));
                    return;
                }
            };

            let stream = match stream {
                Ok(stream) => stream,
                Err(err) => {
                    let _ = ready_tx.send(Err(anyhow!(
                        "failed to open input stream: {err}. {}",
                        mic_permission_hint()
                    )));
                    return;
                }
            };
            if let Err(err) = stream.play() {
                let _ = ready_tx.send(Err(anyhow!("failed to start input stream: {err}")));
                return;
            }
            let _ = ready_tx.send(Ok(device_rate));

            // Park until the engine stops; either a shutdown signal or a
            // dropped sender ends the stream.
            let _ = shutdown_rx.recv();
            if let Err(err) = stream.pause() {
                log_debug(&format!("failed to pause input stream: {err}"));
            }
            drop(stream);
        });

        let device_rate = match ready_rx.recv() {
            Ok(Ok(rate)) => rate,
            Ok(Err(err)) => {
                let _ = handle.join();
                return Err(err);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(anyhow!("capture worker exited before reporting readiness"));
            }
        };

        Ok(CaptureWorker {
            shutdown_tx,
            handle: Some(handle),
            device_rate,
        })
    }
}

/// Handle to the capture worker thread.
pub(crate) struct CaptureWorker {
    shutdown_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
    pub(crate) device_rate: u32,
}

impl CaptureWorker {
    pub(crate) fn stop(mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn forward_chunk<T, F>(
    data: &[T],
    channels: usize,
    convert: F,
    tx: &Sender<Vec<f32>>,
    dropped: &Arc<AtomicUsize>,
) where
    T: Copy,
    F: FnMut(T) -> f32,
{
    let mut chunk = Vec::with_capacity(data.len() / channels.max(1) + 1);
    append_downmixed_samples(&mut chunk, data, channels, convert);
    if tx.try_send(chunk).is_err() {
        dropped.fetch_add(1, Ordering::Relaxed);
    }
}

/// Downmix multi-channel input to mono while applying the provided converter
/// so the block pipeline sees a single channel regardless of the microphone
/// layout.
pub(super) fn append_downmixed_samples<T, F>(
    buf: &mut Vec<f32>,
    data: &[T],
    channels: usize,
    mut convert: F,
) where
    T: Copy,
    F: FnMut(T) -> f32,
{
    if channels <= 1 {
        buf.extend(data.iter().copied().map(&mut convert));
        return;
    }

    // Average each interleaved frame to produce a mono representation.
    let mut acc = 0.0f32;
    let mut count = 0usize;
    for sample in data.iter().copied() {
        acc += convert(sample);
        count += 1;
        if count == channels {
            buf.push(acc / channels as f32);
            acc = 0.0;
            count = 0;
        }
    }
    if count > 0 {
        buf.push(acc / count as f32);
    }
}

fn mic_permission_hint() -> &'static str {
    #[cfg(target_os = "macos")]
    {
        "macOS: System Settings > Privacy & Security > Microphone (enable your terminal)."
    }
    #[cfg(target_os = "linux")]
    {
        "Linux: check PipeWire/PulseAudio permissions and ensure the device is not muted."
    }
    #[cfg(target_os = "windows")]
    {
        "Windows: Settings > Privacy & Security > Microphone (allow access for your terminal)."
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        "Check OS microphone permissions."
    }
}
