use anyhow::Result;
use rproc::{
    Field, FileTask, MatchMode, ProcessError, Processor, ProcessorConfig, ProgressObserver,
};
use std::fs;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

const LINES: [&str; 3] = [
    r#"{"subreddit":"pics","id":1}"#,
    r#"{"subreddit":"pics","id":2}"#,
    r#"{"subreddit":"pics","id":3}"#,
];

fn write_zst(path: &Path, lines: &[&str]) -> Result<()> {
    let mut content = lines.join("\n");
    content.push('\n');
    fs::write(path, zstd::encode_all(content.as_bytes(), 0)?)?;
    Ok(())
}

fn create_config(input: &Path, output: &Path) -> ProcessorConfig {
    ProcessorConfig {
        threads: NonZeroUsize::new(1).unwrap(),
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        field: Field::Subreddit,
        values: vec!["pics".to_string()],
        match_mode: MatchMode::Exact,
        file_filter: "^RS_".to_string(),
        shutdown_timeout: Duration::from_secs(5),
        log_level: "info".to_string(),
    }
}

/// Parks the first worker after its first line until the test releases it
struct GateObserver {
    started: Mutex<Option<Sender<()>>>,
    release: Mutex<Receiver<()>>,
}

impl GateObserver {
    fn new() -> (Arc<Self>, Receiver<()>, Sender<()>) {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let observer = Arc::new(Self {
            started: Mutex::new(Some(started_tx)),
            release: Mutex::new(release_rx),
        });
        (observer, started_rx, release_tx)
    }
}

impl ProgressObserver for GateObserver {
    fn bytes_processed(&self, _task: &FileTask, _compressed_bytes: u64) {
        let Some(started) = self.started.lock().unwrap().take() else {
            return;
        };
        started.send(()).unwrap();
        self.release.lock().unwrap().recv().unwrap();
    }
}

fn count_output_lines(output: &Path) -> Result<usize> {
    let mut total = 0;
    for entry in fs::read_dir(output)? {
        total += fs::read_to_string(entry?.path())?.lines().count();
    }
    Ok(total)
}

#[test]
fn test_shutdown_mid_run_stops_workers_and_skips_queued_files() -> Result<()> {
    let input = tempdir()?;
    let output = tempdir()?;
    write_zst(&input.path().join("RS_2020-01.zst"), &LINES)?;
    write_zst(&input.path().join("RS_2020-02.zst"), &LINES)?;

    let (observer, started, release) = GateObserver::new();
    let processor = Arc::new(
        Processor::new(create_config(input.path(), output.path()))?.with_observer(observer),
    );

    let runner = {
        let processor = Arc::clone(&processor);
        thread::spawn(move || processor.process_and_serve())
    };

    started.recv_timeout(Duration::from_secs(10))?;

    let stopper = {
        let processor = Arc::clone(&processor);
        thread::spawn(move || processor.shutdown(Duration::from_secs(10)))
    };
    while !processor.is_shutting_down() {
        thread::yield_now();
    }
    release.send(())?;

    assert!(stopper.join().unwrap().is_ok());
    assert!(matches!(runner.join().unwrap(), Err(ProcessError::Closed)));

    let stats = processor.metrics().get_stats();
    assert_eq!(stats.files_discovered, 2);
    assert_eq!(stats.files_cancelled, 1);
    assert_eq!(stats.files_skipped, 1);
    assert_eq!(stats.files_completed, 0);
    assert_eq!(stats.lines_matched, 1);
    assert_eq!(stats.active_workers, 0);

    // Only the line handled before the request reached disk
    assert_eq!(count_output_lines(output.path())?, 1);
    Ok(())
}

#[test]
fn test_shutdown_deadline_expires_while_worker_is_busy() -> Result<()> {
    let input = tempdir()?;
    let output = tempdir()?;
    write_zst(&input.path().join("RS_2020-01.zst"), &LINES)?;

    let (observer, started, release) = GateObserver::new();
    let processor = Arc::new(
        Processor::new(create_config(input.path(), output.path()))?.with_observer(observer),
    );

    let runner = {
        let processor = Arc::clone(&processor);
        thread::spawn(move || processor.process_and_serve())
    };
    started.recv_timeout(Duration::from_secs(10))?;

    let result = processor.shutdown(Duration::from_millis(50));
    assert!(matches!(result, Err(ProcessError::ShutdownTimeout(_))));
    assert!(processor.is_shutting_down());

    release.send(())?;
    assert!(matches!(runner.join().unwrap(), Err(ProcessError::Closed)));

    // A later request observes the workers gone
    processor.shutdown(Duration::from_secs(5))?;
    assert_eq!(processor.metrics().get_stats().files_cancelled, 1);
    Ok(())
}

#[test]
fn test_processor_is_single_use_after_shutdown() -> Result<()> {
    let input = tempdir()?;
    let output = tempdir()?;
    write_zst(&input.path().join("RS_2020-01.zst"), &LINES)?;

    let processor = Processor::new(create_config(input.path(), output.path()))?;
    processor.shutdown(Duration::from_secs(1))?;

    assert!(matches!(
        processor.process_and_serve(),
        Err(ProcessError::Closed)
    ));
    assert_eq!(count_output_lines(output.path())?, 0);
    Ok(())
}
