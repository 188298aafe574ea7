use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Counters shared by every worker of a run
#[derive(Debug, Clone)]
pub struct ProcessMetrics {
    // File lifecycle
    files_discovered: Arc<AtomicU64>,
    files_completed: Arc<AtomicU64>,
    files_cancelled: Arc<AtomicU64>,
    files_failed: Arc<AtomicU64>,
    files_skipped: Arc<AtomicU64>,

    // Line processing
    lines_read: Arc<AtomicU64>,
    lines_matched: Arc<AtomicU64>,
    empty_fields: Arc<AtomicU64>,
    write_failures: Arc<AtomicU64>,
    compressed_bytes: Arc<AtomicU64>,

    // Concurrency
    active_workers: Arc<AtomicU64>,
    peak_workers: Arc<AtomicU64>,
}

impl ProcessMetrics {
    /// Creates a new ProcessMetrics instance
    pub fn new() -> Self {
        Self {
            files_discovered: Arc::new(AtomicU64::new(0)),
            files_completed: Arc::new(AtomicU64::new(0)),
            files_cancelled: Arc::new(AtomicU64::new(0)),
            files_failed: Arc::new(AtomicU64::new(0)),
            files_skipped: Arc::new(AtomicU64::new(0)),
            lines_read: Arc::new(AtomicU64::new(0)),
            lines_matched: Arc::new(AtomicU64::new(0)),
            empty_fields: Arc::new(AtomicU64::new(0)),
            write_failures: Arc::new(AtomicU64::new(0)),
            compressed_bytes: Arc::new(AtomicU64::new(0)),
            active_workers: Arc::new(AtomicU64::new(0)),
            peak_workers: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn record_discovered(&self, files: u64) {
        self.files_discovered.fetch_add(files, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.files_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.files_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.files_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a file that was never admitted because shutdown had begun
    pub fn record_skipped(&self) {
        self.files_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_line(&self) {
        self.lines_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_match(&self) {
        self.lines_matched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_empty_field(&self) {
        self.empty_fields.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_compressed_bytes(&self, bytes: u64) {
        self.compressed_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Records a worker entering its file and tracks the concurrency peak
    pub fn record_worker_started(&self) {
        let active = self.active_workers.fetch_add(1, Ordering::SeqCst) + 1;
        let mut peak = self.peak_workers.load(Ordering::Relaxed);
        while active > peak {
            match self.peak_workers.compare_exchange_weak(
                peak,
                active,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(current) => peak = current,
            }
        }
        debug!("Worker started, {} active", active);
    }

    pub fn record_worker_finished(&self) {
        let active = self.active_workers.fetch_sub(1, Ordering::SeqCst) - 1;
        debug!("Worker finished, {} active", active);
    }

    /// Gets a snapshot of the counters
    pub fn get_stats(&self) -> ProcessStats {
        ProcessStats {
            files_discovered: self.files_discovered.load(Ordering::Relaxed),
            files_completed: self.files_completed.load(Ordering::Relaxed),
            files_cancelled: self.files_cancelled.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
            lines_read: self.lines_read.load(Ordering::Relaxed),
            lines_matched: self.lines_matched.load(Ordering::Relaxed),
            empty_fields: self.empty_fields.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            compressed_bytes: self.compressed_bytes.load(Ordering::Relaxed),
            active_workers: self.active_workers.load(Ordering::SeqCst),
            peak_workers: self.peak_workers.load(Ordering::Relaxed),
        }
    }

    /// Logs the current counters
    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Processing stats:\n\
             Files discovered: {}\n\
             Files completed/cancelled/failed/skipped: {}/{}/{}/{}\n\
             Lines read/matched/empty field: {}/{}/{}\n\
             Write failures: {}\n\
             Compressed bytes read: {}\n\
             Peak concurrent workers: {}",
            stats.files_discovered,
            stats.files_completed,
            stats.files_cancelled,
            stats.files_failed,
            stats.files_skipped,
            stats.lines_read,
            stats.lines_matched,
            stats.empty_fields,
            stats.write_failures,
            stats.compressed_bytes,
            stats.peak_workers
        );
    }
}

impl Default for ProcessMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`ProcessMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessStats {
    pub files_discovered: u64,
    pub files_completed: u64,
    pub files_cancelled: u64,
    pub files_failed: u64,
    pub files_skipped: u64,
    pub lines_read: u64,
    pub lines_matched: u64,
    pub empty_fields: u64,
    pub write_failures: u64,
    pub compressed_bytes: u64,
    pub active_workers: u64,
    pub peak_workers: u64,
}
