use crate::queue::BoundedQueue;

/// Batch of normalised samples handed from one pipeline stage to the next.
///
/// A chunk is never modified after it has been created; ownership moves
/// through the queues without copying the sample buffer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Chunk {
    samples: Vec<f32>,
}

impl Chunk {
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}

impl From<Vec<f32>> for Chunk {
    fn from(samples: Vec<f32>) -> Self {
        Self { samples }
    }
}

impl AsRef<[f32]> for Chunk {
    fn as_ref(&self) -> &[f32] {
        &self.samples
    }
}

/// Queue type connecting the pipeline stages.
pub type ChunkQueue = BoundedQueue<Chunk>;
