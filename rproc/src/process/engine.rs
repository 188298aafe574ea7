use ignore::WalkBuilder;
use rayon::prelude::*;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::matcher::ValueMatcher;
use super::worker::FileProcessor;
use crate::config::ProcessorConfig;
use crate::errors::{ProcessError, ProcessResult};
use crate::filters::should_include_file;
use crate::metrics::ProcessMetrics;
use crate::observer::{NoopObserver, ProgressObserver};
use crate::results::{FileOutcome, FileReport, FileTask, RunSummary};
use crate::shutdown::{ShutdownCoordinator, ShutdownToken};

/// Filters a directory of compressed record dumps with a bounded pool of workers.
///
/// One `Processor` serves one run. Share it behind an [`Arc`] so another
/// thread can call [`shutdown`](Processor::shutdown) while
/// [`process_and_serve`](Processor::process_and_serve) is running.
pub struct Processor {
    config: ProcessorConfig,
    file_filter: Regex,
    processor: FileProcessor,
    shutdown: ShutdownCoordinator,
    metrics: ProcessMetrics,
    observer: Arc<dyn ProgressObserver>,
}

impl Processor {
    /// Builds a processor, compiling the file filter and every value.
    ///
    /// # Errors
    ///
    /// Returns a configuration error before any file is touched, including for
    /// an empty value list or an empty value.
    pub fn new(config: ProcessorConfig) -> ProcessResult<Self> {
        let file_filter = Regex::new(&config.file_filter)
            .map_err(|e| ProcessError::invalid_pattern(config.file_filter.as_str(), e))?;
        let matcher = ValueMatcher::new(&config.values, config.match_mode)?;
        let metrics = ProcessMetrics::new();
        let processor = FileProcessor::new(
            config.field,
            matcher,
            config.output.clone(),
            metrics.clone(),
        );

        Ok(Self {
            config,
            file_filter,
            processor,
            shutdown: ShutdownCoordinator::new(),
            metrics,
            observer: Arc::new(NoopObserver),
        })
    }

    /// Replaces the progress observer
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn metrics(&self) -> &ProcessMetrics {
        &self.metrics
    }

    /// Token polled by the workers of this processor
    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown.token()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_shutting_down()
    }

    /// Walks the input tree and returns every eligible file, in walk order.
    ///
    /// # Errors
    ///
    /// Any walk error aborts discovery; no partial list is returned.
    pub fn discover(&self) -> ProcessResult<Vec<FileTask>> {
        let root = &self.config.input;
        let mut walker = WalkBuilder::new(root);
        walker.standard_filters(false).follow_links(false);

        let mut tasks = Vec::new();
        for entry in walker.build() {
            let entry = entry.map_err(|e| ProcessError::discovery(root, e))?;
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            if !should_include_file(entry.path(), &self.file_filter) {
                continue;
            }

            let size = entry
                .metadata()
                .map_err(|e| ProcessError::discovery(root, e))?
                .len();
            info!(path = %entry.path().display(), size, "found input file");

            let task = FileTask::new(entry.into_path(), size);
            self.observer.file_discovered(&task);
            tasks.push(task);
        }

        self.metrics.record_discovered(tasks.len() as u64);
        Ok(tasks)
    }

    /// Discovers the input files and processes them.
    ///
    /// # Errors
    ///
    /// - [`ProcessError::Closed`] if shutdown was requested before or during the run
    /// - [`ProcessError::Discovery`] if the input tree cannot be walked
    pub fn process_and_serve(&self) -> ProcessResult<RunSummary> {
        if self.is_shutting_down() {
            return Err(ProcessError::Closed);
        }

        info!(
            input = %self.config.input.display(),
            output = %self.config.output.display(),
            field = %self.config.field,
            mode = %self.config.match_mode,
            threads = self.config.threads.get(),
            "starting processor"
        );

        let tasks = self.discover().inspect_err(|e| {
            error!(error = %e, "input discovery failed");
        })?;

        if tasks.is_empty() {
            warn!(
                input = %self.config.input.display(),
                "no input files found in input folder"
            );
            return Ok(RunSummary::new());
        }

        self.serve(tasks)
    }

    /// Processes `tasks` with at most `threads` files in flight.
    ///
    /// A file whose worker fails is reported and the rest carry on. Once
    /// shutdown is requested no further file is admitted, running workers stop
    /// after their current line, and the call returns [`ProcessError::Closed`].
    pub fn serve(&self, tasks: Vec<FileTask>) -> ProcessResult<RunSummary> {
        if self.is_shutting_down() {
            return Err(ProcessError::Closed);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads.get())
            .thread_name(|i| format!("rproc-worker-{}", i))
            .build()?;

        let token = self.shutdown.token();
        let reports: Vec<FileReport> = pool.install(|| {
            tasks
                .par_iter()
                .with_max_len(1)
                .map(|task| self.run_worker(task, &token))
                .collect()
        });

        let mut summary = RunSummary::new();
        for report in reports {
            summary.add_report(report);
        }
        self.metrics.log_stats();
        summary.log();

        if self.is_shutting_down() {
            return Err(ProcessError::Closed);
        }
        Ok(summary)
    }

    /// Requests shutdown and waits up to `deadline` for running workers.
    ///
    /// # Errors
    ///
    /// [`ProcessError::ShutdownTimeout`] if workers are still running at the deadline.
    pub fn shutdown(&self, deadline: Duration) -> ProcessResult<()> {
        self.shutdown.shutdown(deadline)
    }

    fn run_worker(&self, task: &FileTask, token: &ShutdownToken) -> FileReport {
        let Some(_slot) = self.shutdown.admit() else {
            warn!(path = %task.path.display(), "shutdown in progress, file not started");
            self.metrics.record_skipped();
            return FileReport::skipped(task);
        };

        self.metrics.record_worker_started();
        self.observer.file_started(task);

        let report = self
            .processor
            .process_file(task, token, self.observer.as_ref());
        match report.outcome {
            FileOutcome::Completed => self.metrics.record_completed(),
            FileOutcome::Cancelled => self.metrics.record_cancelled(),
            FileOutcome::Failed(_) => self.metrics.record_failed(),
            FileOutcome::Skipped => {}
        }

        self.observer.file_finished(task, &report.outcome);
        self.metrics.record_worker_finished();
        report
    }
}
