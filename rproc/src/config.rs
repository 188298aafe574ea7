use config::{Config as ConfigBuilder, File};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{ProcessError, ProcessResult};
use crate::shutdown::DEFAULT_SHUTDOWN_TIMEOUT;

/// Configuration for a processing run.
///
/// # Configuration Format
///
/// Loaded from an INI or YAML file, chosen by extension. INI example:
/// ```ini
/// threads = 4
///
/// [paths]
/// input = /data/reddit/submissions
/// output = /data/filtered
///
/// [filters]
/// field = subreddit
/// values = wallstreetbets,LivestreamFail
/// file_filter = ^RS_2020-0[1-6]
/// match_mode = exact
/// ```
///
/// The same keys work in YAML, where `values` may also be a list.
/// Optional top-level keys: `shutdown_timeout` (humantime, default `30s`) and
/// `log_level` (default `info`).
///
/// CLI arguments take precedence over file values; see [`ProcessorConfig::merge_with_cli`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Maximum number of files processed at once
    #[serde(default = "default_threads")]
    pub threads: NonZeroUsize,

    /// Directory tree holding the compressed inputs
    pub input: PathBuf,

    /// Flat directory receiving `<stem>_<value>.ndjson` files
    pub output: PathBuf,

    /// Record field tested against the candidate values
    pub field: Field,

    /// Candidate values, tried in order
    pub values: Vec<String>,

    pub match_mode: MatchMode,

    /// Regex tested against each input file name
    pub file_filter: String,

    /// How long a shutdown waits for in-flight workers
    #[serde(
        default = "default_shutdown_timeout",
        with = "humantime_duration"
    )]
    pub shutdown_timeout: Duration,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_threads() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN)
}

fn default_shutdown_timeout() -> Duration {
    DEFAULT_SHUTDOWN_TIMEOUT
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Record fields that can be filtered on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Subreddit,
    Author,
    Title,
    Selftext,
    Body,
    Domain,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::Subreddit,
        Field::Author,
        Field::Title,
        Field::Selftext,
        Field::Body,
        Field::Domain,
    ];

    /// JSON key of the field
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Subreddit => "subreddit",
            Field::Author => "author",
            Field::Title => "title",
            Field::Selftext => "selftext",
            Field::Body => "body",
            Field::Domain => "domain",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = ProcessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .into_iter()
            .find(|field| field.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                ProcessError::config_error(format!(
                    "unknown field '{}', expected one of: subreddit, author, title, selftext, body, domain",
                    s
                ))
            })
    }
}

/// How a field value is compared against the candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Case-insensitive full equality
    Exact,
    /// Case-insensitive substring containment
    Partial,
    /// Unanchored regex search
    Regex,
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MatchMode::Exact => "exact",
            MatchMode::Partial => "partial",
            MatchMode::Regex => "regex",
        })
    }
}

impl FromStr for MatchMode {
    type Err = ProcessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "exact" => Ok(MatchMode::Exact),
            "partial" => Ok(MatchMode::Partial),
            "regex" => Ok(MatchMode::Regex),
            other => Err(ProcessError::config_error(format!(
                "unknown match mode '{}', expected exact, partial or regex",
                other
            ))),
        }
    }
}

/// On-disk layout: top-level keys plus `[paths]` and `[filters]` sections
#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default = "default_threads", deserialize_with = "threads_from_any")]
    threads: NonZeroUsize,
    paths: PathsSection,
    filters: FiltersSection,
    #[serde(
        default = "default_shutdown_timeout",
        with = "humantime_duration"
    )]
    shutdown_timeout: Duration,
    #[serde(default = "default_log_level")]
    log_level: String,
}

#[derive(Debug, Deserialize)]
struct PathsSection {
    input: PathBuf,
    output: PathBuf,
}

#[derive(Debug, Deserialize)]
struct FiltersSection {
    field: Field,
    #[serde(deserialize_with = "values_from_list_or_csv")]
    values: Vec<String>,
    file_filter: String,
    match_mode: MatchMode,
}

impl From<ConfigFile> for ProcessorConfig {
    fn from(file: ConfigFile) -> Self {
        Self {
            threads: file.threads,
            input: file.paths.input,
            output: file.paths.output,
            field: file.filters.field,
            values: file.filters.values,
            match_mode: file.filters.match_mode,
            file_filter: file.filters.file_filter,
            shutdown_timeout: file.shutdown_timeout,
            log_level: file.log_level,
        }
    }
}

/// Values explicitly given on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub threads: Option<NonZeroUsize>,
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub field: Option<Field>,
    pub values: Vec<String>,
    pub match_mode: Option<MatchMode>,
    pub file_filter: Option<String>,
    pub shutdown_timeout: Option<Duration>,
    pub log_level: Option<String>,
}

impl ProcessorConfig {
    /// Loads configuration from a specific file
    pub fn load_from(config_path: &Path) -> ProcessResult<Self> {
        if !config_path.is_file() {
            return Err(ProcessError::config_error(format!(
                "config file not found: {}",
                config_path.display()
            )));
        }

        let file: ConfigFile = ConfigBuilder::builder()
            .add_source(File::from(config_path))
            .build()
            .and_then(|built| built.try_deserialize())
            .map_err(|e| {
                ProcessError::config_error(format!("{}: {}", config_path.display(), e))
            })?;

        Ok(file.into())
    }

    /// Merges CLI arguments with configuration file values
    pub fn merge_with_cli(mut self, cli: CliOverrides) -> Self {
        if let Some(threads) = cli.threads {
            self.threads = threads;
        }
        if let Some(input) = cli.input {
            self.input = input;
        }
        if let Some(output) = cli.output {
            self.output = output;
        }
        if let Some(field) = cli.field {
            self.field = field;
        }
        if !cli.values.is_empty() {
            self.values = cli.values;
        }
        if let Some(mode) = cli.match_mode {
            self.match_mode = mode;
        }
        if let Some(filter) = cli.file_filter {
            self.file_filter = filter;
        }
        if let Some(timeout) = cli.shutdown_timeout {
            self.shutdown_timeout = timeout;
        }
        if let Some(level) = cli.log_level {
            self.log_level = level;
        }
        self
    }

    /// Checks everything that must hold before any work begins
    pub fn validate(&self) -> ProcessResult<()> {
        if self.values.is_empty() {
            return Err(ProcessError::config_error("at least one value is required"));
        }
        if let Some(pos) = self.values.iter().position(|v| v.trim().is_empty()) {
            return Err(ProcessError::config_error(format!(
                "value #{} is empty",
                pos + 1
            )));
        }

        Regex::new(&self.file_filter)
            .map_err(|e| ProcessError::invalid_pattern(self.file_filter.as_str(), e))?;
        if self.match_mode == MatchMode::Regex {
            for value in &self.values {
                Regex::new(value).map_err(|e| ProcessError::invalid_pattern(value.as_str(), e))?;
            }
        }

        for (name, dir) in [("input", &self.input), ("output", &self.output)] {
            if !dir.is_dir() {
                return Err(ProcessError::config_error(format!(
                    "{} path is not a directory: {}",
                    name,
                    dir.display()
                )));
            }
        }

        Ok(())
    }
}

fn values_from_list_or_csv<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Values {
        List(Vec<String>),
        Csv(String),
    }

    Ok(match Values::deserialize(deserializer)? {
        Values::List(values) => values,
        Values::Csv(csv) => csv.split(',').map(|v| v.trim().to_string()).collect(),
    })
}

// INI sources hand every scalar over as a string
fn threads_from_any<'de, D>(deserializer: D) -> Result<NonZeroUsize, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Threads {
        Number(u64),
        Text(String),
    }

    let raw = match Threads::deserialize(deserializer)? {
        Threads::Number(n) => n,
        Threads::Text(text) => text.trim().parse().map_err(serde::de::Error::custom)?,
    };
    usize::try_from(raw)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| serde::de::Error::custom("threads must be at least 1"))
}

mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}
