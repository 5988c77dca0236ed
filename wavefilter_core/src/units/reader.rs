use std::io::Read;
use std::num::NonZeroUsize;
use std::sync::Arc;

use log::info;

use crate::chunk::ChunkQueue;
use crate::error::PipelineError;
use crate::progress::{ProgressCallback, ProgressEvent};
use crate::scheduler::{UnitReport, WorkUnit};
use crate::wav::{FormatDescriptor, WavHeader, WavReader};

/// Decodes the source container and feeds fixed-size chunks downstream.
pub struct Reader {
    source: WavReader<Box<dyn Read + Send>>,
    to: Arc<ChunkQueue>,
    chunk_frames: usize,
    samples_read: u64,
    bytes_read: u64,
    progress: Option<ProgressCallback>,
}

impl Reader {
    /// Parse the source header. Format errors surface here, before any
    /// worker is started.
    pub fn new<R>(
        source: R,
        to: Arc<ChunkQueue>,
        chunk_frames: NonZeroUsize,
    ) -> Result<Self, PipelineError>
    where
        R: Read + Send + 'static,
    {
        let source: Box<dyn Read + Send> = Box::new(source);
        Ok(Self {
            source: WavReader::open(source)?,
            to,
            chunk_frames: chunk_frames.get(),
            samples_read: 0,
            bytes_read: 0,
            progress: None,
        })
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn header(&self) -> &WavHeader {
        self.source.header()
    }

    pub fn format(&self) -> &FormatDescriptor {
        self.source.format()
    }
}

impl WorkUnit for Reader {
    fn name(&self) -> &str {
        "reader"
    }

    fn run(&mut self) -> Result<bool, PipelineError> {
        let Some(chunk) = self.source.read_chunk(self.chunk_frames)? else {
            self.to.finish();
            return Ok(false);
        };

        let samples = chunk.len() as u64;
        self.samples_read += samples;
        self.bytes_read += samples * self.format().bytes_per_sample() as u64;
        if let Some(progress) = &self.progress {
            progress(ProgressEvent::Advance {
                bytes_read: self.bytes_read,
            });
        }

        self.to.push(chunk)?;
        Ok(true)
    }

    fn close(&mut self) {
        self.to.finish();
    }

    fn finish(&mut self) -> Result<UnitReport, PipelineError> {
        info!("samples read: {}", self.samples_read);
        Ok(UnitReport::new(self.name(), self.samples_read))
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        self.close();
    }
}
