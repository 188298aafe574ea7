/// Error types for rproc.
///
/// Errors fall into two groups. Pre-start faults (bad configuration, a failed
/// directory walk, an unusable thread pool) stop a run before any worker is
/// admitted and are returned to the caller. Per-file faults (open, decode,
/// oversized lines, output writes) never leave the worker that hit them; they
/// are logged and recorded in that file's [`FileOutcome`](crate::results::FileOutcome).
///
/// ```rust,ignore
/// match processor.process_and_serve() {
///     Ok(summary) => summary.log(),
///     Err(ProcessError::Closed) => { /* collect the shutdown outcome */ }
///     Err(e) => return Err(e),
/// }
/// ```
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type for processing operations
pub type ProcessResult<T> = Result<T, ProcessError>;

/// Errors that can occur while configuring or running the processor
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },
    #[error("Failed to walk input directory {root}: {source}")]
    Discovery {
        root: PathBuf,
        source: ignore::Error,
    },
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("Failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Line exceeds the maximum length of {limit} bytes")]
    LineTooLong { limit: usize },
    #[error("Failed to append to {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Shutdown did not complete within {0:?}")]
    ShutdownTimeout(Duration),
    #[error("Processor closed")]
    Closed,
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ProcessError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn invalid_pattern(pattern: impl Into<String>, source: regex::Error) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            source,
        }
    }

    pub fn discovery(root: impl Into<PathBuf>, source: ignore::Error) -> Self {
        Self::Discovery {
            root: root.into(),
            source,
        }
    }

    pub fn decode(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Decode {
            path: path.into(),
            source,
        }
    }

    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    /// Maps an error from opening an input file to the matching variant
    pub fn open_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::FileNotFound(path),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path),
            _ => Self::IoError(source),
        }
    }

    /// Whether this error stops a run before any worker starts
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigError(_)
                | Self::InvalidPattern { .. }
                | Self::Discovery { .. }
                | Self::ThreadPool(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::Path;

    #[test]
    fn test_error_creation() {
        let err = ProcessError::config_error("Missing required field");
        assert!(matches!(err, ProcessError::ConfigError(_)));

        let source = regex::Regex::new("(").unwrap_err();
        let err = ProcessError::invalid_pattern("(", source);
        assert!(matches!(err, ProcessError::InvalidPattern { .. }));

        let err = ProcessError::decode("a.zst", io::Error::other("bad frame"));
        assert!(matches!(err, ProcessError::Decode { .. }));
    }

    #[test]
    fn test_open_failed_mapping() {
        let path = Path::new("missing.zst");
        let err = ProcessError::open_failed(path, io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, ProcessError::FileNotFound(_)));

        let err =
            ProcessError::open_failed(path, io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, ProcessError::PermissionDenied(_)));

        let err = ProcessError::open_failed(path, io::Error::from(io::ErrorKind::Other));
        assert!(matches!(err, ProcessError::IoError(_)));
    }

    #[test]
    fn test_error_messages() {
        let err = ProcessError::config_error("values must not be empty");
        assert_eq!(
            err.to_string(),
            "Configuration error: values must not be empty"
        );

        let err = ProcessError::LineTooLong { limit: 16 };
        assert_eq!(
            err.to_string(),
            "Line exceeds the maximum length of 16 bytes"
        );

        let err = ProcessError::ShutdownTimeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "Shutdown did not complete within 30s");

        assert_eq!(ProcessError::Closed.to_string(), "Processor closed");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(ProcessError::config_error("x").is_fatal());
        assert!(!ProcessError::Closed.is_fatal());
        assert!(!ProcessError::LineTooLong { limit: 1 }.is_fatal());
        assert!(!ProcessError::write("out.ndjson", io::Error::other("disk full")).is_fatal());
    }
}
