use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Container name reported by [`PipelineError::Format`].
pub const WAVE_FORMAT: &str = "WAVE";

/// Errors produced while reading, splitting or writing PCM streams.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The container is malformed or uses something this crate cannot decode.
    #[error("{format} format error: {message}")]
    Format {
        format: &'static str,
        message: String,
    },

    /// A queue or scheduler was used in a way the pipeline wiring forbids.
    #[error("illegal operation: {0}")]
    IllegalOperation(String),

    /// Wrapper around IO errors encountered while reading or writing streams.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// A worker thread could not be created.
    #[error("failed to spawn worker '{name}'")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },

    /// A work unit panicked inside its worker thread.
    #[error("worker '{0}' panicked")]
    WorkerPanicked(String),

    /// The configured output directory is missing.
    #[error("output directory does not exist: {0}")]
    MissingOutputDirectory(PathBuf),

    /// An output file already exists and overwriting was not requested.
    #[error("output file already exists: {0}")]
    OutputExists(PathBuf),

    /// Chunks must hold at least one frame.
    #[error("chunk size must be greater than zero frames")]
    InvalidChunkSize,

    /// Units cannot be added to or restarted on a running scheduler.
    #[error("scheduler has already been started")]
    AlreadyStarted,
}

impl PipelineError {
    pub(crate) fn format(message: impl Into<String>) -> Self {
        Self::Format {
            format: WAVE_FORMAT,
            message: message.into(),
        }
    }

    /// `true` for errors that are a consequence of another unit shutting down
    /// rather than a root cause.
    pub fn is_illegal_operation(&self) -> bool {
        matches!(self, Self::IllegalOperation(_))
    }
}
