use serde::Deserialize;
use serde_json::value::RawValue;
use std::path::PathBuf;
use tracing::{error, trace, warn};

use super::decoder::RecordDecoder;
use super::matcher::ValueMatcher;
use super::sink::OutputSink;
use crate::config::Field;
use crate::errors::ProcessResult;
use crate::metrics::ProcessMetrics;
use crate::observer::ProgressObserver;
use crate::results::{FileOutcome, FileReport, FileTask};
use crate::shutdown::ShutdownToken;

/// The filterable top-level keys of a record, borrowed unparsed from the line.
/// Every other key is skipped without being built.
#[derive(Debug, Deserialize)]
struct RecordFields<'a> {
    #[serde(borrow)]
    subreddit: Option<&'a RawValue>,
    #[serde(borrow)]
    author: Option<&'a RawValue>,
    #[serde(borrow)]
    title: Option<&'a RawValue>,
    #[serde(borrow)]
    selftext: Option<&'a RawValue>,
    #[serde(borrow)]
    body: Option<&'a RawValue>,
    #[serde(borrow)]
    domain: Option<&'a RawValue>,
}

impl<'a> RecordFields<'a> {
    fn get(&self, field: Field) -> Option<&'a RawValue> {
        match field {
            Field::Subreddit => self.subreddit,
            Field::Author => self.author,
            Field::Title => self.title,
            Field::Selftext => self.selftext,
            Field::Body => self.body,
            Field::Domain => self.domain,
        }
    }
}

/// Renders a top-level field of a JSON record as text.
///
/// Strings come back unescaped, other scalars and nested values as their JSON
/// text. A missing or `null` field, or a line that is not a JSON object, gives
/// an empty string.
pub fn extract_field(line: &[u8], field: Field) -> String {
    // Arrays would otherwise bind to the struct positionally
    if line.iter().find(|b| !b.is_ascii_whitespace()) != Some(&b'{') {
        return String::new();
    }

    let record: RecordFields<'_> = match serde_json::from_slice(line) {
        Ok(record) => record,
        Err(e) => {
            trace!("Skipping line that is not valid JSON: {}", e);
            return String::new();
        }
    };

    let Some(raw) = record.get(field) else {
        return String::new();
    };
    let text = raw.get();
    if text.starts_with('"') {
        serde_json::from_str::<String>(text).unwrap_or_default()
    } else {
        text.to_string()
    }
}

/// Runs the decode, match and append pipeline for one file
#[derive(Debug)]
pub struct FileProcessor {
    field: Field,
    matcher: ValueMatcher,
    output_dir: PathBuf,
    metrics: ProcessMetrics,
}

impl FileProcessor {
    /// Creates a new FileProcessor writing into `output_dir`
    pub fn new(
        field: Field,
        matcher: ValueMatcher,
        output_dir: impl Into<PathBuf>,
        metrics: ProcessMetrics,
    ) -> Self {
        Self {
            field,
            matcher,
            output_dir: output_dir.into(),
            metrics,
        }
    }

    pub fn matcher(&self) -> &ValueMatcher {
        &self.matcher
    }

    /// Processes a file to a terminal state.
    ///
    /// Never returns an error: a file-local fault is logged and becomes
    /// [`FileOutcome::Failed`] in the report.
    pub fn process_file(
        &self,
        task: &FileTask,
        token: &ShutdownToken,
        observer: &dyn ProgressObserver,
    ) -> FileReport {
        trace!("Processing file: {}", task.path.display());

        let mut report = FileReport::new(task.path.clone(), FileOutcome::Completed);
        report.outcome = match self.stream_file(task, token, observer, &mut report) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(path = %task.path.display(), error = %e, "failed to process file");
                FileOutcome::Failed(e)
            }
        };
        report
    }

    fn stream_file(
        &self,
        task: &FileTask,
        token: &ShutdownToken,
        observer: &dyn ProgressObserver,
        report: &mut FileReport,
    ) -> ProcessResult<FileOutcome> {
        let mut decoder = RecordDecoder::open(&task.path)?;
        let mut sink = OutputSink::new(&self.output_dir, task.stem());
        let mut bytes_reported = 0u64;

        loop {
            if token.is_cancelled() {
                warn!(path = %task.path.display(), "skipping further processing of file");
                return Ok(FileOutcome::Cancelled);
            }

            let Some(line) = decoder.next_line()? else {
                break;
            };
            if line.is_empty() {
                continue;
            }
            report.lines_read += 1;
            self.metrics.record_line();

            let field = extract_field(line, self.field);
            if field.is_empty() {
                self.metrics.record_empty_field();
            } else if let Some(value) = self.matcher.find(&field) {
                match sink.append(value, line) {
                    Ok(()) => {
                        report.lines_matched += 1;
                        self.metrics.record_match();
                    }
                    Err(e) => {
                        warn!(
                            path = %task.path.display(),
                            value,
                            error = %e,
                            "failed to write matched line"
                        );
                        report.write_failures += 1;
                        self.metrics.record_write_failure();
                    }
                }
            }

            let bytes = decoder.compressed_bytes_read();
            if bytes > bytes_reported {
                self.metrics.record_compressed_bytes(bytes - bytes_reported);
                bytes_reported = bytes;
                observer.bytes_processed(task, bytes);
            }
        }

        Ok(FileOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchMode;
    use crate::errors::ProcessError;
    use crate::observer::NoopObserver;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn write_zst(path: &Path, lines: &[&str]) {
        let mut content = lines.join("\n");
        content.push('\n');
        fs::write(path, zstd::encode_all(content.as_bytes(), 0).unwrap()).unwrap();
    }

    fn processor(values: &[&str], mode: MatchMode, output: &Path) -> FileProcessor {
        let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        FileProcessor::new(
            Field::Subreddit,
            ValueMatcher::new(&values, mode).unwrap(),
            output,
            ProcessMetrics::new(),
        )
    }

    #[test]
    fn test_extract_field() {
        let line = br#"{"subreddit":"pics","score":42,"over_18":false,"author":null,"media":{"a":1}}"#;
        assert_eq!(extract_field(line, Field::Subreddit), "pics");
        assert_eq!(extract_field(line, Field::Author), "");
        assert_eq!(extract_field(line, Field::Title), "");

        let line = br#"{"title":7,"domain":{"a":1},"body":true}"#;
        assert_eq!(extract_field(line, Field::Title), "7");
        assert_eq!(extract_field(line, Field::Domain), r#"{"a":1}"#);
        assert_eq!(extract_field(line, Field::Body), "true");

        assert_eq!(extract_field(b"not json", Field::Subreddit), "");
        assert_eq!(extract_field(b"[1,2,3]", Field::Subreddit), "");
    }

    #[test]
    fn test_extract_field_reads_every_filterable_key() {
        for field in Field::ALL {
            let line = format!(r#"{{"id":"x","{}":"hit","other":[1,{{"a":null}}]}}"#, field);
            assert_eq!(extract_field(line.as_bytes(), field), "hit", "field {}", field);
        }
    }

    #[test]
    fn test_extract_field_unescapes_strings_and_skips_large_siblings() {
        let line = br#"{"title":"say \"hi\" \u00e9","subreddit":"pics"}"#;
        assert_eq!(extract_field(line, Field::Title), "say \"hi\" \u{e9}");

        let nested = format!(
            r#"{{"media":{{"frames":[{}]}},"selftext":"{}","subreddit":"AskReddit"}}"#,
            vec!["{\"w\":1}"; 1000].join(","),
            "y".repeat(10_000)
        );
        assert_eq!(extract_field(nested.as_bytes(), Field::Subreddit), "AskReddit");
        assert_eq!(extract_field(nested.as_bytes(), Field::Domain), "");

        assert_eq!(extract_field(b"  {\"body\":\"ok\"}", Field::Body), "ok");
        assert_eq!(extract_field(b"{\"body\":\"unterminated", Field::Body), "");
    }

    #[test]
    fn test_process_file_writes_matches_in_order() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("RC_2021-06.zst");
        write_zst(
            &input,
            &[
                r#"{"subreddit":"pics","id":1}"#,
                r#"{"subreddit":"aww","id":2}"#,
                "",
                r#"{"subreddit":"PICS","id":3}"#,
                r#"{"id":4}"#,
                r#"{"subreddit":"","id":5}"#,
            ],
        );

        let processor = processor(&["pics", "aww"], MatchMode::Exact, dir.path());
        let task = FileTask::new(&input, 0);
        let report = processor.process_file(&task, &ShutdownToken::new(), &NoopObserver);

        assert!(report.outcome.is_completed());
        assert_eq!(report.lines_read, 5); // The blank line is not counted
        assert_eq!(report.lines_matched, 3);
        assert_eq!(report.write_failures, 0);

        let pics = fs::read_to_string(dir.path().join("RC_2021-06_pics.ndjson")).unwrap();
        assert_eq!(
            pics,
            "{\"subreddit\":\"pics\",\"id\":1}\n{\"subreddit\":\"PICS\",\"id\":3}\n"
        );
        let aww = fs::read_to_string(dir.path().join("RC_2021-06_aww.ndjson")).unwrap();
        assert_eq!(aww, "{\"subreddit\":\"aww\",\"id\":2}\n");

        let stats = processor.metrics.get_stats();
        assert_eq!(stats.empty_fields, 2);
        assert_eq!(stats.compressed_bytes, fs::metadata(&input).unwrap().len());
    }

    #[test]
    fn test_cancelled_token_stops_before_first_line() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("RS_2020-01.zst");
        write_zst(&input, &[r#"{"subreddit":"pics"}"#]);

        let token = ShutdownToken::new();
        token.cancel();

        let processor = processor(&["pics"], MatchMode::Exact, dir.path());
        let report = processor.process_file(&FileTask::new(&input, 0), &token, &NoopObserver);

        assert!(matches!(report.outcome, FileOutcome::Cancelled));
        assert_eq!(report.lines_read, 0);
        assert!(!dir.path().join("RS_2020-01_pics.ndjson").exists());
    }

    #[test]
    fn test_missing_file_is_isolated_failure() {
        let dir = tempdir().unwrap();
        let processor = processor(&["pics"], MatchMode::Exact, dir.path());
        let task = FileTask::new(dir.path().join("gone.zst"), 0);

        let report = processor.process_file(&task, &ShutdownToken::new(), &NoopObserver);
        assert!(matches!(
            report.outcome,
            FileOutcome::Failed(ProcessError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_write_failure_drops_line_and_continues() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("RS_2020-01.zst");
        write_zst(
            &input,
            &[
                r#"{"subreddit":"pics","id":1}"#,
                r#"{"subreddit":"aww","id":2}"#,
            ],
        );

        let output = dir.path().join("out");
        fs::create_dir(&output).unwrap();
        // A directory squatting on the output name makes the open fail
        fs::create_dir(output.join("RS_2020-01_pics.ndjson")).unwrap();

        let processor = processor(&["pics", "aww"], MatchMode::Exact, &output);
        let report =
            processor.process_file(&FileTask::new(&input, 0), &ShutdownToken::new(), &NoopObserver);

        assert!(report.outcome.is_completed());
        assert_eq!(report.write_failures, 1);
        assert_eq!(report.lines_matched, 1);
        assert_eq!(
            fs::read_to_string(output.join("RS_2020-01_aww.ndjson")).unwrap(),
            "{\"subreddit\":\"aww\",\"id\":2}\n"
        );
    }
}
