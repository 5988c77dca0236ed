use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;

use log::{info, warn};

use crate::chunk::ChunkQueue;
use crate::error::PipelineError;
use crate::scheduler::{UnitReport, WorkUnit};
use crate::wav::{PcmSink, WavWriter};

/// Re-encodes chunks from one queue into an 8-bit mono container.
///
/// The header is written on construction; the size fields are patched in
/// [`WorkUnit::finish`], or on drop if the unit never reached teardown.
pub struct Writer {
    name: String,
    from: Arc<ChunkQueue>,
    output: WavWriter,
}

impl Writer {
    pub fn new(
        name: impl Into<String>,
        sink: PcmSink,
        from: Arc<ChunkQueue>,
    ) -> Result<Self, PipelineError> {
        Ok(Self {
            name: name.into(),
            from,
            output: WavWriter::create(sink)?,
        })
    }

    /// Create (or truncate) `path` and write the header to it.
    pub fn create<P: AsRef<Path>>(
        name: impl Into<String>,
        path: P,
        from: Arc<ChunkQueue>,
    ) -> Result<Self, PipelineError> {
        let file = File::create(path)?;
        Self::new(name, PcmSink::seekable(BufWriter::new(file)), from)
    }

    /// Sample bytes appended so far.
    pub fn data_bytes(&self) -> u64 {
        self.output.data_bytes()
    }
}

impl WorkUnit for Writer {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self) -> Result<bool, PipelineError> {
        let Some(chunk) = self.from.pop() else {
            return Ok(false);
        };

        self.output.write_samples(chunk.samples())?;
        Ok(true)
    }

    fn close(&mut self) {
        // Upstream pushes fail from here on instead of blocking on a full queue.
        self.from.finish();
    }

    fn finish(&mut self) -> Result<UnitReport, PipelineError> {
        if self.output.finalize()? {
            info!(
                "{}: finalised header with {} data bytes",
                self.name,
                self.output.data_bytes()
            );
        }
        Ok(UnitReport::new(self.name.clone(), self.output.data_bytes()))
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        self.close();
        if !self.output.is_finalized() {
            if let Err(err) = self.output.finalize() {
                warn!("{}: failed to finalise header: {err}", self.name);
            }
        }
    }
}
