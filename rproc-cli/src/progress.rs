use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use rproc::{FileOutcome, FileTask, ProgressObserver};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

fn bar_style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-")
}

/// Terminal progress: one bar for the whole run plus one per file in flight
pub struct IndicatifObserver {
    multi: MultiProgress,
    overall: ProgressBar,
    files: Mutex<HashMap<PathBuf, ProgressBar>>,
}

impl IndicatifObserver {
    pub fn new(visible: bool) -> Self {
        let target = if visible {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        let multi = MultiProgress::with_draw_target(target);

        let overall = multi.add(ProgressBar::new(0));
        overall.set_style(bar_style(
            "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} files",
        ));

        Self {
            multi,
            overall,
            files: Mutex::new(HashMap::new()),
        }
    }

    /// Clears every bar still on screen
    pub fn finish(&self) {
        if let Ok(mut files) = self.files.lock() {
            for (_, bar) in files.drain() {
                bar.finish_and_clear();
            }
        }
        self.overall.finish_and_clear();
    }
}

impl ProgressObserver for IndicatifObserver {
    fn file_discovered(&self, _task: &FileTask) {
        self.overall.inc_length(1);
    }

    fn file_started(&self, task: &FileTask) {
        let bar = self.multi.add(ProgressBar::new(task.size));
        bar.set_style(bar_style(
            "  {msg:20} {bar:30.green/white} {bytes}/{total_bytes} ({bytes_per_sec})",
        ));
        bar.set_message(task.stem());

        if let Ok(mut files) = self.files.lock() {
            files.insert(task.path.clone(), bar);
        }
    }

    fn bytes_processed(&self, task: &FileTask, compressed_bytes: u64) {
        if let Ok(files) = self.files.lock() {
            if let Some(bar) = files.get(&task.path) {
                bar.set_position(compressed_bytes);
            }
        }
    }

    fn file_finished(&self, task: &FileTask, _outcome: &FileOutcome) {
        let bar = self
            .files
            .lock()
            .ok()
            .and_then(|mut files| files.remove(&task.path));
        if let Some(bar) = bar {
            bar.finish_and_clear();
            self.multi.remove(&bar);
        }
        self.overall.inc(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracks_files_in_flight() {
        let observer = IndicatifObserver::new(false);
        let first = FileTask::new("/data/RS_2020-01.zst", 100);
        let second = FileTask::new("/data/RS_2020-02.zst", 50);

        observer.file_discovered(&first);
        observer.file_discovered(&second);

        observer.file_started(&first);
        observer.bytes_processed(&first, 40);
        assert_eq!(observer.files.lock().unwrap()[&first.path].position(), 40);

        observer.file_finished(&first, &FileOutcome::Completed);
        assert!(observer.files.lock().unwrap().is_empty());
        assert_eq!(observer.overall.position(), 1);

        // Events for a file that never started are ignored
        observer.bytes_processed(&second, 10);
        observer.file_finished(&second, &FileOutcome::Skipped);
        assert_eq!(observer.overall.position(), 2);
    }
}
