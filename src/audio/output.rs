//! CPAL-backed render sink.
//!
//! Owns an output stream on a worker thread and a timeline of scheduled
//! programs addressed in absolute output frames. The render clock is the
//! number of frames the device has consumed divided by its sample rate, so it
//! is monotonic and independent of wall-clock time. Completions are routed
//! through a pump thread; the audio callback never runs scheduler code.

use super::render::{BlockProgram, CompletionFn, RenderSink};
use crate::log_debug;
use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, unbounded, Sender};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

struct ScheduledProgram {
    start_frame: u64,
    samples: Vec<f32>,
    on_complete: Option<CompletionFn>,
}

struct OutputShared {
    /// Device sample rate, set once the stream worker reports ready.
    sample_rate: AtomicU32,
    /// Frames the device has consumed since the stream started.
    frames_elapsed: AtomicU64,
    timeline: Mutex<Vec<ScheduledProgram>>,
}

impl OutputShared {
    fn lock_timeline(&self) -> MutexGuard<'_, Vec<ScheduledProgram>> {
        self.timeline
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct StreamWorker {
    shutdown_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

/// Output device, stream worker, and completion pump bundled behind the
/// [`RenderSink`] seam.
pub struct CpalOutput {
    shared: Arc<OutputShared>,
    device: Mutex<Option<cpal::Device>>,
    stream_worker: Mutex<Option<StreamWorker>>,
    completions_tx: Mutex<Option<Sender<CompletionFn>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    name: String,
}

impl CpalOutput {
    /// List output device names so the CLI can expose a selector.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .context("no output devices available")?;
        let mut names = Vec::new();
        for device in devices {
            if let Ok(name) = device.name() {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Open the default output, or a specific device when the user picked one.
    pub fn new(preferred_device: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();
        let device = match preferred_device {
            Some(name) => {
                let mut devices = host
                    .output_devices()
                    .context("no output devices available")?;
                devices
                    .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                    .ok_or_else(|| anyhow!("output device '{name}' not found"))?
            }
            None => host
                .default_output_device()
                .context("no default output device available")?,
        };
        let name = device.name().unwrap_or_else(|_| "Unknown Device".to_string());
        Ok(Self {
            shared: Arc::new(OutputShared {
                sample_rate: AtomicU32::new(0),
                frames_elapsed: AtomicU64::new(0),
                timeline: Mutex::new(Vec::new()),
            }),
            device: Mutex::new(Some(device)),
            stream_worker: Mutex::new(None),
            completions_tx: Mutex::new(None),
            pump: Mutex::new(None),
            name,
        })
    }

    /// Name of the active output device.
    pub fn device_name(&self) -> String {
        self.name.clone()
    }

    /// Build and start the output stream; returns once the device is running.
    pub fn start(&self) -> Result<()> {
        let device = self
            .lock_device()
            .take()
            .ok_or_else(|| anyhow!("output already started"))?;

        let (completions_tx, completions_rx) = unbounded::<CompletionFn>();
        let pump = thread::spawn(move || {
            // Runs completion callbacks off the audio thread; exits when all
            // senders are gone.
            while let Ok(on_complete) = completions_rx.recv() {
                on_complete();
            }
        });

        let (ready_tx, ready_rx) = bounded::<Result<u32>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let shared = self.shared.clone();
        let callback_tx = completions_tx.clone();

        let handle = thread::spawn(move || {
            let default_config = match device.default_output_config() {
                Ok(config) => config,
                Err(err) => {
                    let _ = ready_tx.send(Err(anyhow!("no usable output config: {err}")));
                    return;
                }
            };
            let format = default_config.sample_format();
            let device_config: StreamConfig = default_config.into();
            let device_rate = device_config.sample_rate.0;
            let channels = usize::from(device_config.channels.max(1));

            log_debug(&format!(
                "render config: format={format:?} sample_rate={device_rate}Hz channels={channels}"
            ));
            shared.sample_rate.store(device_rate, Ordering::Release);

            let err_fn = |err| log_debug(&format!("output_stream_error: {err}"));
            let stream = match format {
                SampleFormat::F32 => {
                    let shared = shared.clone();
                    let tx = callback_tx.clone();
                    device.build_output_stream(
                        &device_config,
                        move |data: &mut [f32], _| {
                            mix_output(&shared, &tx, data, channels, |mix| mix);
                        },
                        err_fn,
                        None,
                    )
                }
                SampleFormat::I16 => {
                    let shared = shared.clone();
                    let tx = callback_tx.clone();
                    device.build_output_stream(
                        &device_config,
                        move |data: &mut [i16], _| {
                            mix_output(&shared, &tx, data, channels, |mix| {
                                (mix.clamp(-1.0, 1.0) * 32_767.0) as i16
                            });
                        },
                        err_fn,
                        None,
                    )
                }
                SampleFormat::U16 => {
                    let shared = shared.clone();
                    let tx = callback_tx.clone();
                    device.build_output_stream(
                        &device_config,
                        move |data: &mut [u16], _| {
                            mix_output(&shared, &tx, data, channels, |mix| {
                                ((mix.clamp(-1.0, 1.0) * 0.5 + 0.5) * 65_535.0) as u16
                            });
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
                    let _ = ready_tx.send(Err(anyhow!("failed to open output stream: {err}")));
                    return;
                }
            };
            if let Err(err) = stream.play() {
                let _ = ready_tx.send(Err(anyhow!("failed to start output stream: {err}")));
                return;
            }
            let _ = ready_tx.send(Ok(device_rate));

            let _ = shutdown_rx.recv();
            if let Err(err) = stream.pause() {
                log_debug(&format!("failed to pause output stream: {err}"));
            }
            drop(stream);
        });

        match ready_rx.recv() {
            Ok(Ok(_rate)) => {}
            Ok(Err(err)) => {
                let _ = handle.join();
                return Err(err);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(anyhow!("output worker exited before reporting readiness"));
            }
        }

        *self.lock_completions() = Some(completions_tx);
        *self.lock_stream_worker() = Some(StreamWorker {
            shutdown_tx,
            handle: Some(handle),
        });
        *self.lock_pump() = Some(pump);
        Ok(())
    }

    /// Stop the stream, drop everything scheduled, and join the worker and
    /// pump threads. Idempotent.
    pub fn stop(&self) {
        self.clear();
        if let Some(mut worker) = self.lock_stream_worker().take() {
            let _ = worker.shutdown_tx.send(());
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }
        // Dropping the last sender disconnects the pump.
        self.lock_completions().take();
        if let Some(pump) = self.lock_pump().take() {
            let _ = pump.join();
        }
    }

    fn lock_device(&self) -> MutexGuard<'_, Option<cpal::Device>> {
        self.device.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_stream_worker(&self) -> MutexGuard<'_, Option<StreamWorker>> {
        self.stream_worker.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_completions(&self) -> MutexGuard<'_, Option<Sender<CompletionFn>>> {
        self.completions_tx.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_pump(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pump.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl RenderSink for CpalOutput {
    fn now(&self) -> f64 {
        let rate = self.shared.sample_rate.load(Ordering::Acquire);
        if rate == 0 {
            return 0.0;
        }
        self.shared.frames_elapsed.load(Ordering::Acquire) as f64 / f64::from(rate)
    }

    fn sample_rate(&self) -> u32 {
        self.shared.sample_rate.load(Ordering::Acquire)
    }

    fn schedule(
        &self,
        program: BlockProgram,
        start_at: f64,
        on_complete: CompletionFn,
    ) -> Result<()> {
        let rate = self.shared.sample_rate.load(Ordering::Acquire);
        if rate == 0 {
            return Err(anyhow!("output stream not running"));
        }
        let start_frame = (start_at.max(0.0) * f64::from(rate)).round() as u64;
        self.shared.lock_timeline().push(ScheduledProgram {
            start_frame,
            samples: program.samples,
            on_complete: Some(on_complete),
        });
        Ok(())
    }

    fn clear(&self) {
        // Suppresses pending completions: the boxes drop unfired.
        self.shared.lock_timeline().clear();
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Mix scheduled programs into one device buffer and retire finished ones.
fn mix_output<T, F>(
    shared: &Arc<OutputShared>,
    completions_tx: &Sender<CompletionFn>,
    data: &mut [T],
    channels: usize,
    mut convert: F,
) where
    T: Copy,
    F: FnMut(f32) -> T,
{
    let channels = channels.max(1);
    let frames = data.len() / channels;
    let base = shared
        .frames_elapsed
        .fetch_add(frames as u64, Ordering::AcqRel);

    let mut timeline = shared.lock_timeline();
    for i in 0..frames {
        let pos = base + i as u64;
        let mut mix = 0.0f32;
        for program in timeline.iter() {
            if pos < program.start_frame {
                continue;
            }
            let idx = (pos - program.start_frame) as usize;
            if let Some(sample) = program.samples.get(idx) {
                mix += *sample;
            }
        }
        let value = convert(mix);
        for ch in 0..channels {
            data[i * channels + ch] = value;
        }
    }

    let horizon = base + frames as u64;
    timeline.retain_mut(|program| {
        let end_frame = program.start_frame + program.samples.len() as u64;
        if end_frame <= horizon {
            if let Some(on_complete) = program.on_complete.take() {
                let _ = completions_tx.send(on_complete);
            }
            false
        } else {
            true
        }
    });
}
