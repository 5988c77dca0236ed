use std::sync::Arc;

use crate::chunk::{Chunk, ChunkQueue};
use crate::error::PipelineError;
use crate::scheduler::{UnitReport, WorkUnit};

/// Distributes interleaved samples over two output queues.
///
/// Samples at even positions go to one side and odd positions to the other.
/// For even-length chunks the left side always takes the even positions. An
/// odd-length chunk has one more even position than odd; a toggle decides
/// which side takes it and flips after every odd chunk, so the leftover
/// samples stay balanced between both outputs.
pub struct Splitter {
    from: Arc<ChunkQueue>,
    left: Arc<ChunkQueue>,
    right: Arc<ChunkQueue>,
    odd_toggle: bool,
    chunks_split: u64,
}

impl Splitter {
    pub fn new(from: Arc<ChunkQueue>, left: Arc<ChunkQueue>, right: Arc<ChunkQueue>) -> Self {
        Self {
            from,
            left,
            right,
            odd_toggle: false,
            chunks_split: 0,
        }
    }

    /// `true` when the next odd-length chunk hands its leftover to the right.
    pub fn odd_toggle(&self) -> bool {
        self.odd_toggle
    }

    /// Partition `chunk` into `(left, right)`, advancing the toggle.
    pub fn split(&mut self, chunk: &Chunk) -> (Chunk, Chunk) {
        let samples = chunk.samples();
        let odd = samples.len() % 2 == 1;
        let evens_to_left = !(odd && self.odd_toggle);
        // Even-length chunks have no leftover and leave the toggle untouched.
        if odd {
            self.odd_toggle = !self.odd_toggle;
        }

        let evens: Vec<f32> = samples.iter().step_by(2).copied().collect();
        let odds: Vec<f32> = samples.iter().skip(1).step_by(2).copied().collect();

        if evens_to_left {
            (Chunk::from(evens), Chunk::from(odds))
        } else {
            (Chunk::from(odds), Chunk::from(evens))
        }
    }
}

impl WorkUnit for Splitter {
    fn name(&self) -> &str {
        "splitter"
    }

    fn run(&mut self) -> Result<bool, PipelineError> {
        let Some(chunk) = self.from.pop() else {
            self.left.finish();
            self.right.finish();
            return Ok(false);
        };

        let (left, right) = self.split(&chunk);
        self.chunks_split += 1;
        self.left.push(left)?;
        self.right.push(right)?;
        Ok(true)
    }

    fn close(&mut self) {
        self.from.finish();
        self.left.finish();
        self.right.finish();
    }

    fn finish(&mut self) -> Result<UnitReport, PipelineError> {
        Ok(UnitReport::new(self.name(), self.chunks_split))
    }
}

impl Drop for Splitter {
    fn drop(&mut self) {
        self.close();
    }
}
