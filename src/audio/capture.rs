//! Accumulates raw capture chunks into fixed-duration blocks.
//!
//! Incoming chunk sizes are device-determined and never aligned to block
//! boundaries, so one chunk may close zero, one, or several blocks.

use super::block::AudioBlock;
use std::time::Instant;

/// In-progress capture buffer plus write offset.
///
/// The buffer is replaced, never reused, once it fills; a duration change
/// only affects buffers allocated after the next close.
pub struct CaptureBuffer {
    buffer: Vec<f32>,
    offset: usize,
    sample_rate: u32,
    next_block_seconds: u64,
    next_id: u64,
}

impl CaptureBuffer {
    /// Allocate the first zero-filled buffer for `block_seconds` of audio.
    pub fn new(block_seconds: u64, sample_rate: u32) -> Self {
        let block_seconds = block_seconds.max(1);
        let len = (block_seconds * u64::from(sample_rate)).max(1) as usize;
        Self {
            buffer: vec![0.0; len],
            offset: 0,
            sample_rate,
            next_block_seconds: block_seconds,
            next_id: 1,
        }
    }

    /// Store a new block duration. The buffer currently being filled keeps
    /// its length; only the next allocation picks this up.
    pub fn set_block_seconds(&mut self, seconds: u64) {
        self.next_block_seconds = seconds.max(1);
    }

    /// Length in samples of the buffer currently being filled.
    pub fn block_len(&self) -> usize {
        self.buffer.len()
    }

    /// Write offset into the current buffer; always `<= block_len()`.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Consume an incoming chunk, invoking `on_block` for every block that
    /// closes. Returns the number of blocks closed by this call.
    ///
    /// Handles chunks smaller than the remaining space (partial fill), chunks
    /// that exactly fill the buffer, and chunks spanning multiple blocks.
    pub fn fill<F>(&mut self, chunk: &[f32], mut on_block: F) -> usize
    where
        F: FnMut(AudioBlock),
    {
        let mut cursor = 0;
        let mut closed = 0;
        while cursor < chunk.len() {
            let remaining = self.buffer.len() - self.offset;
            let to_copy = remaining.min(chunk.len() - cursor);
            self.buffer[self.offset..self.offset + to_copy]
                .copy_from_slice(&chunk[cursor..cursor + to_copy]);
            self.offset += to_copy;
            cursor += to_copy;
            if self.offset == self.buffer.len() {
                on_block(self.close_block());
                closed += 1;
            }
        }
        closed
    }

    /// Close the filled buffer into a block and start a fresh buffer sized
    /// to the current duration setting.
    fn close_block(&mut self) -> AudioBlock {
        let next_len = (self.next_block_seconds * u64::from(self.sample_rate)).max(1) as usize;
        let payload = std::mem::replace(&mut self.buffer, vec![0.0; next_len]);
        self.offset = 0;
        let id = self.next_id;
        self.next_id += 1;
        AudioBlock {
            id,
            captured_at: Instant::now(),
            samples: payload,
            sample_rate: self.sample_rate,
        }
    }
}
