use super::compressor::{Compressor, CompressorParams};
use super::render::{render_block, BlockProgram, CompletionFn, RenderSink};
use super::resample::{resample_linear, resample_to_rate};
use super::scheduler::{PlaybackScheduler, RunParams, MIN_START_OFFSET_SECS};
use super::*;
use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Test sink with a manually advanced render clock.

struct ScheduledEntry {
    block_id: u64,
    start_at: f64,
    duration: f64,
    samples_len: usize,
    on_complete: Option<CompletionFn>,
}

struct FakeSink {
    clock_bits: AtomicU64,
    rate: u32,
    scheduled: Mutex<Vec<ScheduledEntry>>,
    cleared: AtomicBool,
    reject_schedule: AtomicBool,
}

impl FakeSink {
    fn new(rate: u32) -> Arc<Self> {
        Arc::new(Self {
            clock_bits: AtomicU64::new(0.0_f64.to_bits()),
            rate,
            scheduled: Mutex::new(Vec::new()),
            cleared: AtomicBool::new(false),
            reject_schedule: AtomicBool::new(false),
        })
    }

    fn advance_clock_to(&self, secs: f64) {
        self.clock_bits.store(secs.to_bits(), Ordering::Relaxed);
    }

    fn scheduled_count(&self) -> usize {
        self.scheduled.lock().unwrap().len()
    }

    fn entry(&self, index: usize) -> (u64, f64, f64, usize) {
        let scheduled = self.scheduled.lock().unwrap();
        let entry = &scheduled[index];
        (
            entry.block_id,
            entry.start_at,
            entry.duration,
            entry.samples_len,
        )
    }

    /// Take and invoke one stored completion outside the lock, the way a real
    /// sink fires them from a pump thread.
    fn fire_completion(&self, index: usize) {
        let on_complete = {
            let mut scheduled = self.scheduled.lock().unwrap();
            scheduled[index].on_complete.take()
        };
        if let Some(on_complete) = on_complete {
            on_complete();
        }
    }
}

impl RenderSink for FakeSink {
    fn now(&self) -> f64 {
        f64::from_bits(self.clock_bits.load(Ordering::Relaxed))
    }

    fn sample_rate(&self) -> u32 {
        self.rate
    }

    fn schedule(
        &self,
        program: BlockProgram,
        start_at: f64,
        on_complete: CompletionFn,
    ) -> Result<()> {
        if self.reject_schedule.load(Ordering::Relaxed) {
            return Err(anyhow!("sink rejected the program"));
        }
        self.scheduled.lock().unwrap().push(ScheduledEntry {
            block_id: program.block_id,
            start_at,
            duration: program.duration_secs(),
            samples_len: program.samples.len(),
            on_complete: Some(on_complete),
        });
        Ok(())
    }

    fn clear(&self) {
        self.cleared.store(true, Ordering::Relaxed);
        self.scheduled.lock().unwrap().clear();
    }
}

fn make_block(id: u64, samples: usize, rate: u32, value: f32) -> AudioBlock {
    AudioBlock {
        id,
        captured_at: Instant::now(),
        samples: vec![value; samples],
        sample_rate: rate,
    }
}

struct Harness {
    scheduler: Arc<PlaybackScheduler>,
    sink: Arc<FakeSink>,
    params: Arc<Mutex<RunParams>>,
    queue_reports: Arc<Mutex<Vec<usize>>>,
}

fn harness(rate: u32, params: RunParams) -> Harness {
    let sink = FakeSink::new(rate);
    let params = Arc::new(Mutex::new(params));
    let queue_reports = Arc::new(Mutex::new(Vec::new()));

    let params_src = params.clone();
    let reports = queue_reports.clone();
    let scheduler = PlaybackScheduler::new(
        sink.clone(),
        Arc::new(move || *params_src.lock().unwrap()),
        Arc::new(move |len| reports.lock().unwrap().push(len)),
        Arc::new(|_, _| {}),
    );
    Harness {
        scheduler,
        sink,
        params,
        queue_reports,
    }
}

fn default_params() -> RunParams {
    RunParams {
        gain: 1.0,
        speed: 1.0,
        block_seconds: 5,
    }
}

fn assert_close(a: f64, b: f64) {
    assert!((a - b).abs() < 1e-9, "expected {a} ~= {b}");
}

// ---------------------------------------------------------------------------
// CaptureBuffer

#[test]
fn exact_chunks_close_sequential_blocks() {
    let rate = 100;
    let mut buffer = CaptureBuffer::new(2, rate);
    let chunk = vec![0.5_f32; 200];
    let mut ids = Vec::new();

    for _ in 0..3 {
        buffer.fill(&chunk, |block| {
            assert_eq!(block.samples.len(), 200);
            ids.push(block.id);
        });
    }
    assert_eq!(ids, vec![1, 2, 3]);
}

#[test]
fn one_chunk_can_close_multiple_blocks() {
    let rate = 100;
    let mut buffer = CaptureBuffer::new(2, rate);
    // Partially fill, then deliver one chunk covering the remainder of the
    // current block plus two full blocks.
    buffer.fill(&vec![0.1_f32; 150], |_| panic!("no block should close yet"));

    let mut closed = Vec::new();
    let n = buffer.fill(&vec![0.2_f32; 450], |block| closed.push(block));
    assert_eq!(n, 3);
    assert_eq!(closed.len(), 3);
    assert_eq!(closed[0].id, 1);
    assert_eq!(closed[1].id, 2);
    assert_eq!(closed[2].id, 3);
    // First block keeps the early partial samples.
    assert_eq!(closed[0].samples[0], 0.1);
    assert_eq!(closed[0].samples[199], 0.2);
    assert!(closed[2].samples.iter().all(|s| *s == 0.2));
    assert_eq!(buffer.offset(), 0);
}

#[test]
fn trailing_partial_fill_carries_forward() {
    let rate = 100;
    let mut buffer = CaptureBuffer::new(2, rate);
    buffer.fill(&vec![0.1_f32; 150], |_| panic!("no block should close yet"));

    // 150 + 300 = two closed 200-sample blocks and 50 samples carried over.
    let n = buffer.fill(&vec![0.2_f32; 300], |_| {});
    assert_eq!(n, 2);
    assert_eq!(buffer.offset(), 50);
}

#[test]
fn duration_change_applies_to_next_allocation_only() {
    let rate = 100;
    let mut buffer = CaptureBuffer::new(5, rate);
    // 60% full, then shrink-to-grow: current buffer must keep its size.
    buffer.fill(&vec![0.0_f32; 300], |_| panic!("not full yet"));
    buffer.set_block_seconds(8);
    assert_eq!(buffer.block_len(), 500);

    let mut closed = Vec::new();
    buffer.fill(&vec![0.0_f32; 200], |block| closed.push(block));
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].samples.len(), 500);
    assert_eq!(buffer.block_len(), 800);
}

#[test]
fn block_duration_matches_sample_count() {
    let block = make_block(1, 220_500, 44_100, 0.0);
    assert_close(block.duration_secs(), 5.0);
}

// ---------------------------------------------------------------------------
// PlaybackScheduler

#[test]
fn first_block_starts_after_safety_offset() {
    let h = harness(1_000, default_params());
    h.scheduler.enqueue(make_block(1, 100, 1_000, 0.1));

    assert_eq!(h.sink.scheduled_count(), 1);
    let (id, start_at, duration, _) = h.sink.entry(0);
    assert_eq!(id, 1);
    assert_close(start_at, MIN_START_OFFSET_SECS);
    assert_close(duration, 0.1);
}

#[test]
fn scheduled_intervals_are_contiguous() {
    let h = harness(1_000, default_params());
    // 0.1s blocks: both land within the lookahead window immediately.
    h.scheduler.enqueue(make_block(1, 100, 1_000, 0.1));
    h.scheduler.enqueue(make_block(2, 100, 1_000, 0.1));

    assert_eq!(h.sink.scheduled_count(), 2);
    let (_, start1, dur1, _) = h.sink.entry(0);
    let (_, start2, _, _) = h.sink.entry(1);
    assert_close(start2, start1 + dur1);
}

#[test]
fn lookahead_bounds_how_far_the_timeline_extends() {
    let h = harness(1_000, default_params());
    for id in 1..=3 {
        h.scheduler.enqueue(make_block(id, 5_000, 1_000, 0.1));
    }
    // First block covers [0.05, 5.05]; the rest wait in the queue.
    assert_eq!(h.sink.scheduled_count(), 1);
    assert_eq!(h.scheduler.queue_len(), 2);

    h.sink.advance_clock_to(4.9);
    h.sink.fire_completion(0);

    assert_eq!(h.sink.scheduled_count(), 2);
    let (id, start_at, _, _) = h.sink.entry(1);
    assert_eq!(id, 2);
    assert_close(start_at, 5.05);
    assert_eq!(h.scheduler.queue_len(), 1);
}

#[test]
fn params_are_read_fresh_for_every_block() {
    let h = harness(1_000, default_params());
    h.scheduler.enqueue(make_block(1, 100, 1_000, 0.1));
    h.params.lock().unwrap().speed = 2.0;
    h.scheduler.enqueue(make_block(2, 100, 1_000, 0.1));

    assert_eq!(h.sink.scheduled_count(), 2);
    let (_, _, dur1, len1) = h.sink.entry(0);
    let (_, _, dur2, len2) = h.sink.entry(1);
    assert_close(dur1, 0.1);
    assert_eq!(len1, 100);
    assert_close(dur2, 0.05);
    assert_eq!(len2, 50);
}

#[test]
fn queue_reports_track_true_length() {
    let h = harness(1_000, default_params());
    for id in 1..=3 {
        h.scheduler.enqueue(make_block(id, 5_000, 1_000, 0.1));
    }
    assert_eq!(h.scheduler.queue_len(), 2);
    let reports = h.queue_reports.lock().unwrap();
    assert_eq!(reports.last().copied(), Some(2));
}

#[test]
fn completions_after_stop_do_not_reschedule() {
    let h = harness(1_000, default_params());
    h.scheduler.enqueue(make_block(1, 5_000, 1_000, 0.1));
    h.scheduler.enqueue(make_block(2, 5_000, 1_000, 0.1));
    assert_eq!(h.sink.scheduled_count(), 1);

    h.scheduler.deactivate();
    h.scheduler.clear();
    assert!(h.sink.cleared.load(Ordering::Relaxed));
    assert_eq!(h.scheduler.queue_len(), 0);
    assert_eq!(h.scheduler.scheduled_end(), None);

    // A late completion from the torn-down timeline must be a no-op.
    h.sink.advance_clock_to(10.0);
    h.scheduler.enqueue(make_block(3, 100, 1_000, 0.1));
    assert_eq!(h.sink.scheduled_count(), 0);
    assert_eq!(h.scheduler.queue_len(), 1);
}

#[test]
fn empty_payload_blocks_are_skipped() {
    let h = harness(1_000, default_params());
    h.scheduler.enqueue(AudioBlock {
        id: 1,
        captured_at: Instant::now(),
        samples: Vec::new(),
        sample_rate: 1_000,
    });
    h.scheduler.enqueue(make_block(2, 100, 1_000, 0.1));

    assert_eq!(h.sink.scheduled_count(), 1);
    let (id, _, _, _) = h.sink.entry(0);
    assert_eq!(id, 2);
}

#[test]
fn queue_callbacks_can_read_the_scheduler_back() {
    // A queue-update callback that re-reads scheduler state must not run
    // under the scheduler's internal lock; the empty-payload skip path used
    // to hold it across the callback.
    let sink = FakeSink::new(1_000);
    let slot: Arc<Mutex<Option<Arc<PlaybackScheduler>>>> = Arc::new(Mutex::new(None));
    let observed = Arc::new(Mutex::new(Vec::new()));

    let cb_slot = slot.clone();
    let cb_observed = observed.clone();
    let scheduler = PlaybackScheduler::new(
        sink.clone(),
        Arc::new(default_params),
        Arc::new(move |len| {
            if let Some(scheduler) = cb_slot.lock().unwrap().as_ref() {
                cb_observed.lock().unwrap().push((len, scheduler.queue_len()));
            }
        }),
        Arc::new(|_, _| {}),
    );
    *slot.lock().unwrap() = Some(scheduler.clone());

    let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(1);
    let worker = scheduler.clone();
    let handle = thread::spawn(move || {
        worker.enqueue(AudioBlock {
            id: 1,
            captured_at: Instant::now(),
            samples: Vec::new(),
            sample_rate: 1_000,
        });
        let _ = done_tx.send(());
    });
    assert!(
        done_rx.recv_timeout(Duration::from_secs(2)).is_ok(),
        "enqueue of an empty block stalled in a queue callback"
    );
    handle.join().unwrap();

    assert_eq!(sink.scheduled_count(), 0);
    let observed = observed.lock().unwrap();
    assert!(!observed.is_empty());
    for (reported, live) in observed.iter() {
        assert_eq!(reported, live);
    }
}

#[test]
fn rejected_sink_schedule_is_not_reported_as_scheduled() {
    let sink = FakeSink::new(1_000);
    sink.reject_schedule.store(true, Ordering::Relaxed);

    let scheduled_ids = Arc::new(Mutex::new(Vec::new()));
    let ids = scheduled_ids.clone();
    let scheduler = PlaybackScheduler::new(
        sink.clone(),
        Arc::new(default_params),
        Arc::new(|_| {}),
        Arc::new(move |block_id, _| ids.lock().unwrap().push(block_id)),
    );
    scheduler.enqueue(make_block(1, 100, 1_000, 0.1));

    assert_eq!(sink.scheduled_count(), 0);
    assert!(scheduled_ids.lock().unwrap().is_empty());
}

#[test]
fn reserved_interval_matches_rendered_duration_at_ratio_limits() {
    // 1s block at 2 kHz onto a 44.1 kHz sink at quarter speed asks for an
    // 88.2x ratio; the resampler caps it, so the schedule marker has to use
    // the capped duration too or the timeline would reserve a silent tail.
    let h = harness(
        44_100,
        RunParams {
            gain: 1.0,
            speed: 0.25,
            block_seconds: 5,
        },
    );
    h.scheduler.enqueue(make_block(1, 2_000, 2_000, 0.1));

    assert_eq!(h.sink.scheduled_count(), 1);
    let (_, start_at, program_duration, _) = h.sink.entry(0);
    let end = h.scheduler.scheduled_end().expect("marker set");
    assert!(
        (end - start_at - program_duration).abs() <= 1.0 / 44_100.0,
        "reserved {} vs rendered {program_duration}",
        end - start_at
    );
}

#[test]
fn chunks_to_playback_end_to_end() {
    let rate = 44_100;
    let h = harness(rate, default_params());
    let mut buffer = CaptureBuffer::new(5, rate);

    // ~10.03s of capture in device-sized chunks.
    let chunk = vec![0.05_f32; 4_096];
    let mut closed = 0;
    for _ in 0..108 {
        closed += buffer.fill(&chunk, |block| h.scheduler.enqueue(block));
    }
    assert_eq!(closed, 2);

    // Only the first block fits the lookahead until its playback ends.
    assert_eq!(h.sink.scheduled_count(), 1);
    let (id1, start1, dur1, len1) = h.sink.entry(0);
    assert_eq!(id1, 1);
    assert_eq!(len1, 220_500);
    assert_close(start1, MIN_START_OFFSET_SECS);
    assert_close(dur1, 5.0);

    h.sink.advance_clock_to(start1 + dur1 - 0.1);
    h.sink.fire_completion(0);
    assert_eq!(h.sink.scheduled_count(), 2);
    let (id2, start2, dur2, len2) = h.sink.entry(1);
    assert_eq!(id2, 2);
    assert_eq!(len2, 220_500);
    assert_close(start2, start1 + dur1);
    assert_close(dur2, 5.0);
}

// ---------------------------------------------------------------------------
// render_block

#[test]
fn render_applies_gain_below_compression_threshold() {
    let block = make_block(1, 1_000, 1_000, 0.1);
    let program = render_block(&block, 2.0, 1.0, CompressorParams::block_safety(), 1_000);
    assert_eq!(program.samples.len(), 1_000);
    // 0.2 peak sits well under the knee, so the compressor is transparent.
    for sample in &program.samples {
        assert!((sample - 0.2).abs() < 1e-4);
    }
}

#[test]
fn render_floors_negative_gain_at_silence() {
    let block = make_block(1, 500, 1_000, 0.5);
    let program = render_block(&block, -3.0, 1.0, CompressorParams::block_safety(), 1_000);
    assert!(program.samples.iter().all(|s| *s == 0.0));
}

#[test]
fn render_speed_controls_output_length() {
    let block = make_block(1, 1_000, 1_000, 0.1);
    let double = render_block(&block, 1.0, 2.0, CompressorParams::block_safety(), 1_000);
    assert_eq!(double.samples.len(), 500);
    assert_close(double.duration_secs(), 0.5);

    let half = render_block(&block, 1.0, 0.5, CompressorParams::block_safety(), 1_000);
    assert_eq!(half.samples.len(), 2_000);
    assert_close(half.duration_secs(), 2.0);
}

#[test]
fn render_normalizes_block_rate_to_sink_rate() {
    // 1s at 22050 rendered onto a 44100 sink stays 1s of playback.
    let block = make_block(1, 22_050, 22_050, 0.05);
    let program = render_block(&block, 1.0, 1.0, CompressorParams::block_safety(), 44_100);
    assert_eq!(program.samples.len(), 44_100);
    assert_close(program.duration_secs(), 1.0);
}

#[test]
fn render_sanitizes_non_finite_speed() {
    let block = make_block(1, 1_000, 1_000, 0.1);
    let program = render_block(
        &block,
        1.0,
        f32::NAN,
        CompressorParams::block_safety(),
        1_000,
    );
    assert_eq!(program.samples.len(), 1_000);
}

// ---------------------------------------------------------------------------
// Compressor

#[test]
fn compressor_is_transparent_below_the_knee() {
    let mut comp = Compressor::new(CompressorParams::block_safety(), 44_100);
    let mut samples = vec![0.05_f32; 2_048];
    comp.process(&mut samples);
    for sample in &samples {
        assert!((sample - 0.05).abs() < 1e-4);
    }
}

#[test]
fn compressor_reduces_hot_signal() {
    let mut comp = Compressor::new(CompressorParams::block_safety(), 44_100);
    let mut samples = vec![1.0_f32; 4_410];
    comp.process(&mut samples);
    // 0 dBFS over a -3 dB threshold settles near -2.4 dB of reduction.
    let last = samples[samples.len() - 1];
    assert!(last < 0.9, "expected gain reduction, got {last}");
    assert!(last > 0.6, "over-compressed to {last}");
}

// ---------------------------------------------------------------------------
// Resampling

#[test]
fn resample_linear_scales_length_by_ratio() {
    let input: Vec<f32> = (0..100).map(|i| i as f32 / 100.0).collect();
    assert_eq!(resample_linear(&input, 1.0).len(), 100);
    assert_eq!(resample_linear(&input, 0.5).len(), 50);
    assert_eq!(resample_linear(&input, 2.0).len(), 200);
}

#[test]
fn resample_linear_rejects_invalid_input() {
    assert!(resample_linear(&[], 1.0).is_empty());
    assert!(resample_linear(&[0.5], f32::NAN).is_empty());
    assert!(resample_linear(&[0.5], 0.0).is_empty());
}

#[test]
fn resample_to_rate_passes_through_matching_rates() {
    let input = vec![0.1_f32, 0.2, 0.3];
    assert_eq!(resample_to_rate(&input, 48_000, 48_000), input);
}

#[test]
fn resample_to_rate_halves_length_when_downsampling() {
    let input = vec![0.5_f32; 960];
    let output = resample_to_rate(&input, 96_000, 48_000);
    assert_eq!(output.len(), 480);
}

#[test]
fn resample_to_rate_falls_back_on_out_of_range_rates() {
    let input = vec![0.5_f32; 10];
    assert_eq!(resample_to_rate(&input, 1, 48_000), input);
}
