use std::sync::Arc;

/// Progress notifications emitted while a pipeline runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgressEvent {
    /// The source header was parsed; `total_bytes` is the declared data size.
    Start { total_bytes: u64 },
    /// The reader has consumed `bytes_read` data bytes in total.
    Advance { bytes_read: u64 },
    /// Every worker has stopped and the outputs are finalised.
    Finish,
}

/// Observer shared with the worker threads.
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;
