//! Completed audio blocks and the FIFO that holds them until playback.

use std::collections::VecDeque;
use std::time::Instant;

/// A fixed-duration unit of captured mono audio.
///
/// Closed by [`super::CaptureBuffer`] and never mutated afterwards; ownership
/// moves from the capture path into the queue and then into the scheduler.
#[derive(Debug, Clone)]
pub struct AudioBlock {
    /// Monotonically increasing identifier, assigned at close time (first block is 1).
    pub id: u64,
    /// Monotonic timestamp of the moment the block closed.
    pub captured_at: Instant,
    /// Mono f32 payload, exactly `block_seconds * sample_rate` samples.
    pub samples: Vec<f32>,
    /// Sample rate the payload was captured at.
    pub sample_rate: u32,
}

impl AudioBlock {
    /// Payload duration in seconds at unity playback speed.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }
}

/// FIFO of completed blocks awaiting playback.
///
/// Carries no locking of its own; the engine thread and the scheduler's
/// critical section are the only mutators.
#[derive(Debug, Default)]
pub struct BlockQueue {
    queue: VecDeque<AudioBlock>,
}

impl BlockQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a block at the tail.
    pub fn enqueue(&mut self, block: AudioBlock) {
        self.queue.push_back(block);
    }

    /// Remove and return the head, or `None` when empty. Never blocks.
    pub fn dequeue(&mut self) -> Option<AudioBlock> {
        self.queue.pop_front()
    }

    /// Inspect the head without removing it.
    pub fn peek(&self) -> Option<&AudioBlock> {
        self.queue.front()
    }

    /// Discard all held blocks immediately.
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(id: u64) -> AudioBlock {
        AudioBlock {
            id,
            captured_at: Instant::now(),
            samples: vec![0.0; 8],
            sample_rate: 8,
        }
    }

    #[test]
    fn queue_preserves_insertion_order() {
        let mut queue = BlockQueue::new();
        queue.enqueue(block(1));
        queue.enqueue(block(2));
        queue.enqueue(block(3));
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.peek().map(|b| b.id), Some(1));
        assert_eq!(queue.dequeue().map(|b| b.id), Some(1));
        assert_eq!(queue.dequeue().map(|b| b.id), Some(2));
        assert_eq!(queue.dequeue().map(|b| b.id), Some(3));
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn clear_empties_the_queue() {
        let mut queue = BlockQueue::new();
        queue.enqueue(block(1));
        queue.enqueue(block(2));
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
        assert!(queue.peek().is_none());
    }

    #[test]
    fn duration_reflects_payload_and_rate() {
        let b = AudioBlock {
            id: 1,
            captured_at: Instant::now(),
            samples: vec![0.0; 22_050],
            sample_rate: 44_100,
        };
        assert!((b.duration_secs() - 0.5).abs() < 1e-9);
    }
}
