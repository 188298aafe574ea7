use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::trace;

use crate::errors::{ProcessError, ProcessResult};

// Constants for stream decoding
const BUFFER_CAPACITY: usize = 64 * 1024; // 64KB
pub const MAX_LINE_LENGTH: usize = 512 * 1024 * 1024; // 512MB
/// Largest zstd window accepted (2^31 bytes); the big dumps use long-distance windows
pub const MAX_WINDOW_LOG: u32 = 31;

/// Counts bytes pulled from the compressed file
#[derive(Debug)]
pub struct CountingReader<R> {
    inner: R,
    bytes_read: u64,
}

impl<R: Read> CountingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            bytes_read: 0,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.bytes_read += n as u64;
        Ok(n)
    }
}

/// Yields raw lines from a buffered stream without holding more than one line.
///
/// Line terminators (`\n`, and a `\r` before it) are stripped. A final line
/// without a terminator is still returned. A line longer than `max_len` is an
/// error and ends the stream for the caller.
#[derive(Debug)]
pub struct LineReader<R> {
    inner: R,
    line: Vec<u8>,
    max_len: usize,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(inner: R, max_len: usize) -> Self {
        Self {
            inner,
            line: Vec::with_capacity(BUFFER_CAPACITY),
            max_len,
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Reads the next line; `Ok(None)` at end of stream
    pub fn next_line(&mut self) -> ProcessResult<Option<&[u8]>> {
        self.line.clear();
        let mut saw_any = false;

        loop {
            let available = match self.inner.fill_buf() {
                Ok(buf) => buf,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ProcessError::IoError(e)),
            };
            if available.is_empty() {
                break;
            }
            saw_any = true;

            let (found_newline, used) = match available.iter().position(|&b| b == b'\n') {
                Some(idx) => {
                    self.line.extend_from_slice(&available[..idx]);
                    (true, idx + 1)
                }
                None => {
                    self.line.extend_from_slice(available);
                    (false, available.len())
                }
            };
            self.inner.consume(used);

            if self.line.len() > self.max_len {
                return Err(ProcessError::LineTooLong {
                    limit: self.max_len,
                });
            }
            if found_newline {
                break;
            }
        }

        if !saw_any {
            return Ok(None);
        }
        if self.line.last() == Some(&b'\r') {
            self.line.pop();
        }
        Ok(Some(self.line.as_slice()))
    }
}

type ZstdStream = zstd::stream::read::Decoder<'static, BufReader<CountingReader<File>>>;

/// Streaming decoder for one compressed input file
pub struct RecordDecoder {
    path: PathBuf,
    lines: LineReader<BufReader<ZstdStream>>,
}

impl RecordDecoder {
    /// Opens `path` and prepares a zstd stream over it
    pub fn open(path: &Path) -> ProcessResult<Self> {
        Self::open_with_limit(path, MAX_LINE_LENGTH)
    }

    pub fn open_with_limit(path: &Path, max_line_len: usize) -> ProcessResult<Self> {
        trace!("Opening compressed input: {}", path.display());

        let file = File::open(path).map_err(|e| ProcessError::open_failed(path, e))?;
        let counted = BufReader::with_capacity(BUFFER_CAPACITY, CountingReader::new(file));

        let mut stream = zstd::stream::read::Decoder::with_buffer(counted)
            .map_err(|e| ProcessError::decode(path, e))?;
        stream
            .window_log_max(MAX_WINDOW_LOG)
            .map_err(|e| ProcessError::decode(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            lines: LineReader::new(
                BufReader::with_capacity(BUFFER_CAPACITY, stream),
                max_line_len,
            ),
        })
    }

    /// Reads the next decompressed line.
    ///
    /// Stream corruption is reported as [`ProcessError::Decode`]; an oversized
    /// line as [`ProcessError::LineTooLong`].
    pub fn next_line(&mut self) -> ProcessResult<Option<&[u8]>> {
        let path = &self.path;
        self.lines.next_line().map_err(|e| match e {
            ProcessError::IoError(source) => ProcessError::decode(path.as_path(), source),
            other => other,
        })
    }

    /// Compressed bytes consumed from the file so far
    pub fn compressed_bytes_read(&self) -> u64 {
        self.lines.get_ref().get_ref().get_ref().get_ref().bytes_read()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
