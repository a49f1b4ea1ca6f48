//! Lookahead-bounded greedy block scheduler.
//!
//! `try_advance` is invoked from two independent trigger sources: the engine
//! thread whenever a block is enqueued, and the sink's completion pump when a
//! scheduled program finishes. Both paths funnel through one mutex around the
//! dequeue-and-marker update, so the schedule-end marker has a single logical
//! mutator and no block can be dequeued twice.

use super::block::{AudioBlock, BlockQueue};
use super::compressor::CompressorParams;
use super::render::{render_block, scheduled_duration_secs, CompletionFn, RenderSink};
use crate::log_debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// How far ahead of the render clock the timeline is kept populated.
pub const LOOKAHEAD_SECS: f64 = 0.2;

/// Safety offset for the very first block so it never starts in the past.
pub const MIN_START_OFFSET_SECS: f64 = 0.05;

/// Per-block parameters read fresh each time a block is pulled for scheduling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunParams {
    pub gain: f32,
    pub speed: f32,
    pub block_seconds: u64,
}

pub(crate) type ParamsFn = Arc<dyn Fn() -> RunParams + Send + Sync>;
pub(crate) type QueueUpdateFn = Arc<dyn Fn(usize) + Send + Sync>;
pub(crate) type ScheduledFn = Arc<dyn Fn(u64, usize) + Send + Sync>;

struct SchedulerInner {
    queue: BlockQueue,
    /// End of the last scheduled interval on the render clock, `None` until
    /// the first block is placed and after every `clear`.
    scheduled_end: Option<f64>,
}

/// Drains the block queue onto the output timeline.
pub struct PlaybackScheduler {
    inner: Mutex<SchedulerInner>,
    sink: Arc<dyn RenderSink>,
    params: ParamsFn,
    on_queue_update: QueueUpdateFn,
    on_scheduled: ScheduledFn,
    comp_params: CompressorParams,
    /// Recording guard: completions that fire after stop become no-ops.
    active: AtomicBool,
}

impl PlaybackScheduler {
    pub(crate) fn new(
        sink: Arc<dyn RenderSink>,
        params: ParamsFn,
        on_queue_update: QueueUpdateFn,
        on_scheduled: ScheduledFn,
    ) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(SchedulerInner {
                queue: BlockQueue::new(),
                scheduled_end: None,
            }),
            sink,
            params,
            on_queue_update,
            on_scheduled,
            comp_params: CompressorParams::block_safety(),
            active: AtomicBool::new(true),
        })
    }

    /// Number of blocks currently owned by the queue.
    pub fn queue_len(&self) -> usize {
        self.lock_inner().queue.len()
    }

    /// End of the scheduled timeline, if anything has been placed.
    pub fn scheduled_end(&self) -> Option<f64> {
        self.lock_inner().scheduled_end
    }

    /// Hand a completed block to the queue and attempt to extend the schedule.
    pub fn enqueue(self: &Arc<Self>, block: AudioBlock) {
        let len = {
            let mut inner = self.lock_inner();
            inner.queue.enqueue(block);
            inner.queue.len()
        };
        (self.on_queue_update)(len);
        self.try_advance();
    }

    /// Stop accepting scheduling work; pending completions become no-ops.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Relaxed);
    }

    /// Discard all queued blocks, reset the schedule marker, and drop
    /// everything already placed on the sink.
    pub fn clear(&self) {
        {
            let mut inner = self.lock_inner();
            inner.queue.clear();
            inner.scheduled_end = None;
        }
        self.sink.clear();
        (self.on_queue_update)(0);
    }

    /// Greedily pull blocks while the timeline is short of the lookahead
    /// bound. Safe to call from any trigger at any time; idempotent when the
    /// queue is empty or the lookahead is already satisfied.
    pub fn try_advance(self: &Arc<Self>) {
        loop {
            if !self.active.load(Ordering::Relaxed) {
                return;
            }
            let now = self.sink.now();
            let sink_rate = self.sink.sample_rate();

            // Dequeue and marker update happen under one lock with nothing
            // blocking in between; callbacks and sink calls stay outside it.
            let (job, queue_len) = {
                let mut inner = self.lock_inner();
                let within_lookahead = match inner.scheduled_end {
                    None => true,
                    Some(end) => end < now + LOOKAHEAD_SECS,
                };
                if inner.queue.is_empty() || !within_lookahead {
                    return;
                }
                let Some(block) = inner.queue.dequeue() else {
                    return;
                };
                let queue_len = inner.queue.len();

                if block.samples.is_empty() {
                    // Malformed capture payload; drop it rather than placing
                    // a zero-length program.
                    log_debug(&format!("skipping empty block #{}", block.id));
                    (None, queue_len)
                } else {
                    let params = (self.params)();
                    let speed = sanitize_speed(params.speed);
                    let start_at = match inner.scheduled_end {
                        Some(end) => end.max(now + MIN_START_OFFSET_SECS),
                        None => now + MIN_START_OFFSET_SECS,
                    };
                    let duration = scheduled_duration_secs(&block, speed, sink_rate);
                    inner.scheduled_end = Some(start_at + duration);
                    (Some((block, params, start_at)), queue_len)
                }
            };
            (self.on_queue_update)(queue_len);
            let Some((block, params, start_at)) = job else {
                continue;
            };

            let speed = sanitize_speed(params.speed);
            let program = render_block(&block, params.gain, speed, self.comp_params, sink_rate);
            let block_id = block.id;

            let this = Arc::clone(self);
            let on_complete: CompletionFn = Box::new(move || this.try_advance());
            match self.sink.schedule(program, start_at, on_complete) {
                Ok(()) => (self.on_scheduled)(block_id, queue_len),
                Err(err) => {
                    // The marker already advanced; the timeline keeps its
                    // shape and the next trigger continues from here.
                    log_debug(&format!("failed to schedule block #{block_id}: {err}"));
                }
            }
        }
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, SchedulerInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn sanitize_speed(speed: f32) -> f32 {
    if speed.is_finite() && speed > 0.0 {
        speed
    } else {
        1.0
    }
}
