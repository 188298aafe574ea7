/// Input file selection.
///
/// A file takes part in a run when its extension is the compressed-archive
/// suffix and its file name matches the configured filter regex. Directories
/// are never candidates themselves; the walker descends into them.
use regex::Regex;
use std::path::Path;

/// Extension of the compressed inputs
pub const ARCHIVE_EXTENSION: &str = "zst";

/// Checks if a file has the archive extension (case-sensitive, like the dumps)
pub fn has_archive_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == ARCHIVE_EXTENSION)
}

/// Checks the file name (not the full path) against the filter pattern
pub fn matches_file_filter(path: &Path, filter: &Regex) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| filter.is_match(name))
}

/// Determines if a file should be processed
pub fn should_include_file(path: &Path, filter: &Regex) -> bool {
    has_archive_extension(path) && matches_file_filter(path, filter)
}

/// File name without its final extension, used to name output files
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}
