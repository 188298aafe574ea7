//! Progress hooks.
//!
//! The processor reports file-level events to a [`ProgressObserver`]. Hooks run
//! on the worker's thread between lines, so implementations should return
//! quickly; nothing in the pipeline depends on what they do.

use crate::results::{FileOutcome, FileTask};

pub trait ProgressObserver: Send + Sync {
    /// A file passed discovery
    fn file_discovered(&self, _task: &FileTask) {}

    /// A worker was admitted for the file
    fn file_started(&self, _task: &FileTask) {}

    /// Called after a line whenever more compressed input has been consumed
    fn bytes_processed(&self, _task: &FileTask, _compressed_bytes: u64) {}

    /// The worker for the file reached a terminal state
    fn file_finished(&self, _task: &FileTask, _outcome: &FileOutcome) {}
}

/// Observer that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {}
