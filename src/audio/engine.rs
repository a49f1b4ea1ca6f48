//! Capture-to-playback session lifecycle.
//!
//! `AudioEngine` owns the whole relay path: it acquires the input and output
//! devices, runs an engine thread that accumulates capture chunks into blocks,
//! and feeds the playback scheduler. `start` and `stop` are the only state
//! transitions; parameter changes take effect per block without restarting.

use super::capture::CaptureBuffer;
use super::input::{CaptureWorker, InputDevice};
use super::meter::{rms_db, LevelMeter};
use super::output::CpalOutput;
use super::resample::resample_to_rate;
use super::scheduler::PlaybackScheduler;
use super::transform::{PassthroughTransform, SampleTransform};
use crate::config::{AppConfig, MAX_BLOCK_SECONDS, MIN_BLOCK_SECONDS};
use crate::log_debug;
use anyhow::{bail, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use tracing::info;

/// Lifecycle states reported through status callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineState {
    Idle,
    RequestingPermission,
    Recording,
    Stopped,
    Error,
}

impl EngineState {
    pub fn label(self) -> &'static str {
        match self {
            EngineState::Idle => "idle",
            EngineState::RequestingPermission => "requesting-permission",
            EngineState::Recording => "recording",
            EngineState::Stopped => "stopped",
            EngineState::Error => "error",
        }
    }
}

/// Snapshot pushed to the status callback on every transition.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub state: EngineState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub queue_length: usize,
}

/// Host hooks: status transitions, queue depth changes, and the live
/// parameter snapshot read once per scheduled block.
pub struct EngineCallbacks {
    pub on_status: Arc<dyn Fn(EngineStatus) + Send + Sync>,
    pub on_queue_update: Arc<dyn Fn(usize) + Send + Sync>,
    pub get_params: Arc<dyn Fn() -> super::scheduler::RunParams + Send + Sync>,
}

struct Session {
    stop_tx: crossbeam_channel::Sender<()>,
    engine_thread: Option<JoinHandle<()>>,
    capture: Option<CaptureWorker>,
    scheduler: Arc<PlaybackScheduler>,
    output: Arc<CpalOutput>,
    dropped: Arc<AtomicUsize>,
}

/// One engine per process run; `start`/`stop` may be called repeatedly.
pub struct AudioEngine {
    callbacks: EngineCallbacks,
    input_device: Option<String>,
    output_device: Option<String>,
    sample_rate: u32,
    channel_capacity: usize,
    state: Mutex<EngineState>,
    session: Mutex<Option<Session>>,
    meter: LevelMeter,
    /// Live block size in seconds; picked up at the next block boundary.
    block_seconds: Arc<AtomicU64>,
    queue_len: Arc<AtomicUsize>,
}

impl AudioEngine {
    pub fn new(config: &AppConfig, callbacks: EngineCallbacks) -> Self {
        Self {
            callbacks,
            input_device: config.input_device.clone(),
            output_device: config.output_device.clone(),
            sample_rate: config.sample_rate,
            channel_capacity: config.channel_capacity,
            state: Mutex::new(EngineState::Idle),
            session: Mutex::new(None),
            meter: LevelMeter::new(),
            block_seconds: Arc::new(AtomicU64::new(clamp_block_seconds(config.block_seconds))),
            queue_len: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn state(&self) -> EngineState {
        *self.lock_state()
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn meter(&self) -> LevelMeter {
        self.meter.clone()
    }

    /// Effective block size after clamping.
    pub fn block_seconds(&self) -> u64 {
        self.block_seconds.load(Ordering::Relaxed)
    }

    /// Change the block size for blocks not yet started. The block currently
    /// filling keeps the size it was allocated with.
    pub fn set_block_duration(&self, seconds: u64) -> u64 {
        let effective = clamp_block_seconds(seconds);
        self.block_seconds.store(effective, Ordering::Relaxed);
        log_debug(&format!("block size set to {effective}s"));
        effective
    }

    /// Acquire devices and begin the capture/playback session.
    pub fn start(&self, block_seconds: u64) -> Result<()> {
        {
            let state = self.lock_state();
            if matches!(
                *state,
                EngineState::Recording | EngineState::RequestingPermission
            ) {
                bail!("already recording; call stop() first");
            }
        }
        let effective_block = clamp_block_seconds(block_seconds);
        self.block_seconds.store(effective_block, Ordering::Relaxed);

        self.set_state(EngineState::RequestingPermission);
        self.emit_status(Some("requesting microphone access".to_string()));

        let input = match InputDevice::new(self.input_device.as_deref()) {
            Ok(input) => input,
            Err(err) => return Err(self.fail(err)),
        };
        let input_name = input.device_name();

        let output = match CpalOutput::new(self.output_device.as_deref()) {
            Ok(output) => Arc::new(output),
            Err(err) => return Err(self.fail(err)),
        };
        if let Err(err) = output.start() {
            return Err(self.fail(err));
        }
        let output_name = output.device_name();

        // Optional processing stage; its absence never blocks capture.
        let transform: Option<Box<dyn SampleTransform>> = match PassthroughTransform::install() {
            Ok(stage) => {
                log_debug(&format!("transform installed: {}", stage.name()));
                Some(Box::new(stage))
            }
            Err(err) => {
                log_debug(&format!("transform unavailable: {err}"));
                None
            }
        };

        let queue_len = self.queue_len.clone();
        let on_queue_update = self.callbacks.on_queue_update.clone();
        let scheduler = PlaybackScheduler::new(
            output.clone(),
            self.callbacks.get_params.clone(),
            Arc::new(move |len| {
                queue_len.store(len, Ordering::Relaxed);
                on_queue_update(len);
            }),
            {
                let on_status = self.callbacks.on_status.clone();
                let queue_len = self.queue_len.clone();
                Arc::new(move |block_id, remaining: usize| {
                    info!(block_id, remaining, "block scheduled");
                    on_status(EngineStatus {
                        state: EngineState::Recording,
                        message: Some(format!("scheduled block #{block_id}")),
                        queue_length: queue_len.load(Ordering::Relaxed),
                    });
                })
            },
        );

        let (chunk_tx, chunk_rx) = crossbeam_channel::bounded::<Vec<f32>>(self.channel_capacity);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let dropped = Arc::new(AtomicUsize::new(0));

        let capture = match input.spawn_capture(chunk_tx, dropped.clone()) {
            Ok(worker) => worker,
            Err(err) => {
                output.stop();
                return Err(self.fail(err));
            }
        };
        let device_rate = capture.device_rate;

        let engine_rate = self.sample_rate;
        let meter = self.meter.clone();
        let shared_block_seconds = self.block_seconds.clone();
        let scheduler_for_thread = scheduler.clone();
        let engine_thread = thread::spawn(move || {
            let mut transform = transform;
            let mut buffer = CaptureBuffer::new(effective_block, engine_rate);
            loop {
                crossbeam_channel::select! {
                    recv(chunk_rx) -> msg => {
                        let mut chunk = match msg {
                            Ok(chunk) => chunk,
                            Err(_) => break,
                        };
                        meter.set_db(rms_db(&chunk));
                        if let Some(stage) = transform.as_mut() {
                            stage.process(&mut chunk);
                        }
                        let chunk = if device_rate == engine_rate {
                            chunk
                        } else {
                            resample_to_rate(&chunk, device_rate, engine_rate)
                        };
                        buffer.set_block_seconds(shared_block_seconds.load(Ordering::Relaxed));
                        buffer.fill(&chunk, |block| scheduler_for_thread.enqueue(block));
                    }
                    recv(stop_rx) -> _ => break,
                }
            }
            meter.reset();
        });

        *self.lock_session() = Some(Session {
            stop_tx,
            engine_thread: Some(engine_thread),
            capture: Some(capture),
            scheduler,
            output,
            dropped,
        });

        self.set_state(EngineState::Recording);
        info!(
            input = %input_name,
            output = %output_name,
            block_seconds = effective_block,
            "recording started"
        );
        self.emit_status(Some(format!(
            "recording from '{input_name}' to '{output_name}' ({effective_block}s blocks)"
        )));
        Ok(())
    }

    /// Tear the session down. Queued and scheduled audio is discarded.
    /// Idempotent; a stop with no session is a no-op.
    pub fn stop(&self) {
        let Some(mut session) = self.lock_session().take() else {
            return;
        };

        // Deactivate first so completions firing during teardown do nothing.
        session.scheduler.deactivate();
        let _ = session.stop_tx.send(());
        if let Some(capture) = session.capture.take() {
            capture.stop();
        }
        if let Some(handle) = session.engine_thread.take() {
            let _ = handle.join();
        }
        session.scheduler.clear();
        session.output.stop();
        self.meter.reset();

        let dropped = session.dropped.load(Ordering::Relaxed);
        if dropped > 0 {
            log_debug(&format!("capture dropped {dropped} chunks under backpressure"));
        }
        info!(dropped_chunks = dropped, "recording stopped");

        self.queue_len.store(0, Ordering::Relaxed);
        (self.callbacks.on_queue_update)(0);
        self.set_state(EngineState::Stopped);
        self.emit_status(Some("stopped".to_string()));
    }

    fn fail(&self, err: anyhow::Error) -> anyhow::Error {
        self.set_state(EngineState::Error);
        self.emit_status(Some(err.to_string()));
        err
    }

    fn set_state(&self, state: EngineState) {
        *self.lock_state() = state;
    }

    fn emit_status(&self, message: Option<String>) {
        let status = EngineStatus {
            state: self.state(),
            message,
            queue_length: self.queue_len(),
        };
        (self.callbacks.on_status)(status);
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn clamp_block_seconds(seconds: u64) -> u64 {
    seconds.clamp(MIN_BLOCK_SECONDS, MAX_BLOCK_SECONDS)
}
