//! Threaded PCM WAV filter.
//!
//! A [`units::Reader`] decodes the source container into chunks, a
//! [`units::Splitter`] distributes every chunk over two queues and two
//! [`units::Writer`]s re-encode them into separate 8-bit mono containers.
//! Each unit runs on its own worker thread; the stages are connected by
//! [`BoundedQueue`]s and shut down by propagating the queues' finished flag.

mod chunk;
pub mod error;
mod progress;
pub mod queue;
pub mod scheduler;
pub mod units;
pub mod wav;

use std::fs::{self, File};
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use parking_lot::Mutex;

pub use chunk::{Chunk, ChunkQueue};
pub use error::PipelineError;
pub use progress::{ProgressCallback, ProgressEvent};
pub use queue::{BoundedQueue, DEFAULT_QUEUE_CAPACITY};
pub use scheduler::{run_units, Scheduler, UnitReport, WorkUnit};
pub use wav::{FormatDescriptor, PcmSink};

use crate::units::{Reader, Splitter, Writer};

/// Frames decoded per chunk unless configured otherwise.
pub const DEFAULT_CHUNK_FRAMES: usize = 1000;
pub const DEFAULT_LEFT_NAME: &str = "left.wav";
pub const DEFAULT_RIGHT_NAME: &str = "right.wav";

/// Sizing of the chunks and queues of a pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamOptions {
    pub chunk_frames: NonZeroUsize,
    /// Chunks a queue holds before producers block; `0` is unbounded.
    pub queue_capacity: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            chunk_frames: NonZeroUsize::new(DEFAULT_CHUNK_FRAMES).unwrap_or(NonZeroUsize::MIN),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Configuration for a file-to-file run.
#[derive(Clone, Debug)]
pub struct Config {
    /// Canonicalized path of the source container.
    pub input_path: PathBuf,
    /// Canonicalized directory receiving both outputs.
    pub output_dir: PathBuf,
    pub left_name: String,
    pub right_name: String,
    pub options: StreamOptions,
    /// Replace existing output files instead of failing.
    pub overwrite: bool,
}

impl Config {
    /// Construct a [`Config`] with default options.
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(input: P, output: Q) -> Result<Self, PipelineError> {
        Self::builder(input, output).build()
    }

    pub fn builder<P: AsRef<Path>, Q: AsRef<Path>>(input: P, output: Q) -> ConfigBuilder {
        ConfigBuilder {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            left_name: DEFAULT_LEFT_NAME.to_owned(),
            right_name: DEFAULT_RIGHT_NAME.to_owned(),
            chunk_frames: DEFAULT_CHUNK_FRAMES,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overwrite: false,
        }
    }

    pub fn left_path(&self) -> PathBuf {
        self.output_dir.join(&self.left_name)
    }

    pub fn right_path(&self) -> PathBuf {
        self.output_dir.join(&self.right_name)
    }
}

/// Builder returned by [`Config::builder`].
#[derive(Clone, Debug)]
pub struct ConfigBuilder {
    input: PathBuf,
    output: PathBuf,
    left_name: String,
    right_name: String,
    chunk_frames: usize,
    queue_capacity: usize,
    overwrite: bool,
}

impl ConfigBuilder {
    pub fn chunk_frames(mut self, frames: usize) -> Self {
        self.chunk_frames = frames;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn left_name<S: Into<String>>(mut self, name: S) -> Self {
        self.left_name = name.into();
        self
    }

    pub fn right_name<S: Into<String>>(mut self, name: S) -> Self {
        self.right_name = name.into();
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Validate the settings and canonicalize both paths.
    pub fn build(self) -> Result<Config, PipelineError> {
        let chunk_frames =
            NonZeroUsize::new(self.chunk_frames).ok_or(PipelineError::InvalidChunkSize)?;

        if !self.output.is_dir() {
            return Err(PipelineError::MissingOutputDirectory(self.output));
        }

        Ok(Config {
            input_path: fs::canonicalize(&self.input)?,
            output_dir: fs::canonicalize(&self.output)?,
            left_name: self.left_name,
            right_name: self.right_name,
            options: StreamOptions {
                chunk_frames,
                queue_capacity: self.queue_capacity,
            },
            overwrite: self.overwrite,
        })
    }
}

/// Outcome of a completed pipeline run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineReport {
    /// Format of the source stream.
    pub format: FormatDescriptor,
    pub samples_read: u64,
    pub chunks_split: u64,
    /// Sample bytes written to the left output.
    pub left_bytes: u64,
    /// Sample bytes written to the right output.
    pub right_bytes: u64,
}

/// Split the configured input file into the two output files.
pub fn run(config: Config) -> Result<PipelineReport, PipelineError> {
    run_with_progress(config, |_| {})
}

/// Like [`run`], reporting progress through `progress`.
pub fn run_with_progress<F>(config: Config, progress: F) -> Result<PipelineReport, PipelineError>
where
    F: Fn(ProgressEvent) + Send + Sync + 'static,
{
    if !config.output_dir.is_dir() {
        return Err(PipelineError::MissingOutputDirectory(config.output_dir));
    }

    let left_path = config.left_path();
    let right_path = config.right_path();
    if !config.overwrite {
        for path in [&left_path, &right_path] {
            if path.exists() {
                return Err(PipelineError::OutputExists(path.clone()));
            }
        }
    }

    info!(
        "splitting '{}' into '{}' and '{}'",
        config.input_path.display(),
        left_path.display(),
        right_path.display()
    );

    let source = BufReader::new(File::open(&config.input_path)?);
    let progress: ProgressCallback = Arc::new(progress);
    let outputs = Outputs::Files {
        left: &left_path,
        right: &right_path,
    };
    split_with(source, outputs, config.options, Some(progress))
}

/// Run the pipeline over arbitrary streams.
///
/// The source header is parsed before the sinks are touched, so format errors
/// are reported before any output is written.
pub fn split_stream<R>(
    source: R,
    left: PcmSink,
    right: PcmSink,
    options: StreamOptions,
    progress: Option<ProgressCallback>,
) -> Result<PipelineReport, PipelineError>
where
    R: Read + Send + 'static,
{
    split_with(source, Outputs::Sinks { left, right }, options, progress)
}

enum Outputs<'a> {
    Files { left: &'a Path, right: &'a Path },
    Sinks { left: PcmSink, right: PcmSink },
}

fn split_with<R>(
    source: R,
    outputs: Outputs<'_>,
    options: StreamOptions,
    progress: Option<ProgressCallback>,
) -> Result<PipelineReport, PipelineError>
where
    R: Read + Send + 'static,
{
    let read_queue = Arc::new(ChunkQueue::new(options.queue_capacity));
    let left_queue = Arc::new(ChunkQueue::new(options.queue_capacity));
    let right_queue = Arc::new(ChunkQueue::new(options.queue_capacity));

    let mut reader = Reader::new(source, Arc::clone(&read_queue), options.chunk_frames)?;
    let format = *reader.format();
    let total_bytes = u64::from(reader.header().data_size);
    if let Some(progress) = &progress {
        progress(ProgressEvent::Start { total_bytes });
        reader = reader.with_progress(Arc::clone(progress));
    }

    let splitter = Splitter::new(read_queue, Arc::clone(&left_queue), Arc::clone(&right_queue));
    let (left, right) = match outputs {
        Outputs::Files { left, right } => {
            let left_writer = Writer::create("left-writer", left, left_queue)?;
            match Writer::create("right-writer", right, right_queue) {
                Ok(right_writer) => (left_writer, right_writer),
                Err(err) => {
                    drop(left_writer);
                    if let Err(remove_err) = fs::remove_file(left) {
                        warn!("failed to remove '{}': {remove_err}", left.display());
                    }
                    return Err(err);
                }
            }
        }
        Outputs::Sinks { left, right } => (
            Writer::new("left-writer", left, left_queue)?,
            Writer::new("right-writer", right, right_queue)?,
        ),
    };

    let units: Vec<Box<dyn WorkUnit>> = vec![
        Box::new(reader),
        Box::new(splitter),
        Box::new(left),
        Box::new(right),
    ];
    let reports = run_units(units)?;

    if let Some(progress) = &progress {
        progress(ProgressEvent::Finish);
    }

    let processed = |index: usize| reports.get(index).map_or(0, |report| report.processed);
    Ok(PipelineReport {
        format,
        samples_read: processed(0),
        chunks_split: processed(1),
        left_bytes: processed(2),
        right_bytes: processed(3),
    })
}

/// Split a source held entirely in memory; returns the two encoded containers.
pub fn split_bytes(
    source: Vec<u8>,
    options: StreamOptions,
) -> Result<(PipelineReport, Vec<u8>, Vec<u8>), PipelineError> {
    let left = SharedBuffer::default();
    let right = SharedBuffer::default();
    let report = split_stream(
        Cursor::new(source),
        PcmSink::seekable(left.clone()),
        PcmSink::seekable(right.clone()),
        options,
        None,
    )?;
    Ok((report, left.into_inner(), right.into_inner()))
}

/// Seekable in-memory sink whose contents survive the writer that owns it.
#[derive(Clone, Debug, Default)]
struct SharedBuffer(Arc<Mutex<Cursor<Vec<u8>>>>);

impl SharedBuffer {
    fn into_inner(self) -> Vec<u8> {
        self.0.lock().get_ref().clone()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for SharedBuffer {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.0.lock().seek(pos)
    }
}
