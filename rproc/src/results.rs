//! Per-file and per-run results.
//!
//! A worker never lets a file-local fault escape. Whatever happens inside it
//! ends up as a [`FileOutcome`] in that file's [`FileReport`], and the run
//! collects the reports into a [`RunSummary`].
use std::path::{Path, PathBuf};
use tracing::info;

use crate::errors::ProcessError;
use crate::filters::file_stem;

/// A discovered input file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    /// Path to the compressed input
    pub path: PathBuf,
    /// Compressed size in bytes, used for progress only
    pub size: u64,
}

impl FileTask {
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Base name without extension; prefixes every output file of this task
    pub fn stem(&self) -> String {
        file_stem(&self.path)
    }
}

/// How a single file's processing ended
#[derive(Debug)]
pub enum FileOutcome {
    /// Every line was read
    Completed,
    /// Shutdown was observed between two lines
    Cancelled,
    /// Shutdown was observed before the file was admitted
    Skipped,
    /// A file-local fault stopped the worker
    Failed(ProcessError),
}

impl FileOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, FileOutcome::Completed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, FileOutcome::Failed(_))
    }
}

/// Everything one worker reports about its file
#[derive(Debug)]
pub struct FileReport {
    pub path: PathBuf,
    /// Non-empty lines read
    pub lines_read: u64,
    /// Lines appended to an output file
    pub lines_matched: u64,
    /// Matched lines dropped because the append failed
    pub write_failures: u64,
    pub outcome: FileOutcome,
}

impl FileReport {
    pub fn new(path: impl Into<PathBuf>, outcome: FileOutcome) -> Self {
        Self {
            path: path.into(),
            lines_read: 0,
            lines_matched: 0,
            write_failures: 0,
            outcome,
        }
    }

    /// Report for a file that was never admitted
    pub fn skipped(task: &FileTask) -> Self {
        Self::new(task.path.clone(), FileOutcome::Skipped)
    }
}

/// Results of a whole run
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Reports in discovery order
    pub reports: Vec<FileReport>,
    pub files_completed: usize,
    pub files_cancelled: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    pub total_lines: u64,
    pub total_matches: u64,
    pub total_write_failures: u64,
}

impl RunSummary {
    /// Creates a new empty summary
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a file report to the summary
    pub fn add_report(&mut self, report: FileReport) {
        match report.outcome {
            FileOutcome::Completed => self.files_completed += 1,
            FileOutcome::Cancelled => self.files_cancelled += 1,
            FileOutcome::Skipped => self.files_skipped += 1,
            FileOutcome::Failed(_) => self.files_failed += 1,
        }
        self.total_lines += report.lines_read;
        self.total_matches += report.lines_matched;
        self.total_write_failures += report.write_failures;
        self.reports.push(report);
    }

    /// Number of files that reached a worker
    pub fn files_admitted(&self) -> usize {
        self.files_completed + self.files_cancelled + self.files_failed
    }

    /// Whether the run stopped early because of a shutdown
    pub fn was_interrupted(&self) -> bool {
        self.files_cancelled > 0 || self.files_skipped > 0
    }

    pub fn report_for(&self, path: &Path) -> Option<&FileReport> {
        self.reports.iter().find(|report| report.path == path)
    }

    pub fn log(&self) {
        info!(
            completed = self.files_completed,
            cancelled = self.files_cancelled,
            skipped = self.files_skipped,
            failed = self.files_failed,
            lines = self.total_lines,
            matches = self.total_matches,
            "Run finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn report(path: &str, lines: u64, matches: u64, outcome: FileOutcome) -> FileReport {
        FileReport {
            lines_read: lines,
            lines_matched: matches,
            ..FileReport::new(path, outcome)
        }
    }

    #[test]
    fn test_file_task_stem() {
        let task = FileTask::new("dumps/2020/RS_2020-01.zst", 1024);
        assert_eq!(task.stem(), "RS_2020-01");
        assert_eq!(task.size, 1024);
    }

    #[test]
    fn test_run_summary_new() {
        let summary = RunSummary::new();
        assert_eq!(summary.files_admitted(), 0);
        assert_eq!(summary.total_matches, 0);
        assert!(summary.reports.is_empty());
        assert!(!summary.was_interrupted());
    }

    #[test]
    fn test_run_summary_add_report() {
        let mut summary = RunSummary::new();

        summary.add_report(report("a.zst", 10, 3, FileOutcome::Completed));
        summary.add_report(report("b.zst", 4, 1, FileOutcome::Cancelled));
        summary.add_report(report(
            "c.zst",
            0,
            0,
            FileOutcome::Failed(ProcessError::decode("c.zst", io::Error::other("corrupt"))),
        ));
        summary.add_report(FileReport::skipped(&FileTask::new("d.zst", 0)));

        assert_eq!(summary.files_completed, 1);
        assert_eq!(summary.files_cancelled, 1);
        assert_eq!(summary.files_failed, 1);
        assert_eq!(summary.files_skipped, 1);
        assert_eq!(summary.files_admitted(), 3);
        assert_eq!(summary.total_lines, 14);
        assert_eq!(summary.total_matches, 4);
        assert!(summary.was_interrupted());

        let failed = summary.report_for(Path::new("c.zst")).unwrap();
        assert!(failed.outcome.is_failed());
        assert!(summary.report_for(Path::new("missing.zst")).is_none());
    }
}
