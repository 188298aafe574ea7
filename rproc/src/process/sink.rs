use std::collections::hash_map::{Entry, HashMap};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::trace;

use crate::errors::{ProcessError, ProcessResult};

/// Extension of every output file
pub const OUTPUT_EXTENSION: &str = "ndjson";

/// Path of the output file for one (input stem, matched value) pair:
/// `<output_dir>/<stem>_<value>.ndjson`.
///
/// Path separators in the value are replaced so the file always lands
/// directly inside `output_dir`.
pub fn output_path(output_dir: &Path, stem: &str, value: &str) -> PathBuf {
    let value: String = value
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    output_dir.join(format!("{}_{}.{}", stem, value, OUTPUT_EXTENSION))
}

/// Appends matched lines for one input file.
///
/// Handles are opened lazily in append mode and kept for the life of the sink.
/// Every line and its newline go out in a single `write_all`, so appends to
/// the same file from another handle cannot interleave inside a line. A failed
/// handle is dropped and reopened on the next append.
#[derive(Debug)]
pub struct OutputSink {
    output_dir: PathBuf,
    stem: String,
    handles: HashMap<String, File>,
    record: Vec<u8>,
}

impl OutputSink {
    pub fn new(output_dir: impl Into<PathBuf>, stem: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            stem: stem.into(),
            handles: HashMap::new(),
            record: Vec::new(),
        }
    }

    pub fn path_for(&self, value: &str) -> PathBuf {
        output_path(&self.output_dir, &self.stem, value)
    }

    /// Appends `line` plus a newline to the file for `value`, creating it if needed.
    /// The bytes are handed to the OS before this returns.
    pub fn append(&mut self, value: &str, line: &[u8]) -> ProcessResult<()> {
        self.record.clear();
        self.record.reserve(line.len() + 1);
        self.record.extend_from_slice(line);
        self.record.push(b'\n');

        let file = match self.handles.entry(value.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let path = output_path(&self.output_dir, &self.stem, value);
                trace!("Opening output file: {}", path.display());
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .map_err(|e| ProcessError::write(path, e))?;
                entry.insert(file)
            }
        };

        if let Err(e) = file.write_all(&self.record).and_then(|_| file.flush()) {
            self.handles.remove(value);
            return Err(ProcessError::write(self.path_for(value), e));
        }
        Ok(())
    }

    /// Number of output files this sink has open
    pub fn open_files(&self) -> usize {
        self.handles.len()
    }
}
