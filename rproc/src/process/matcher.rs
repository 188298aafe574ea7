use regex::{Regex, RegexBuilder};

use crate::config::MatchMode;
use crate::errors::{ProcessError, ProcessResult};

/// Strategy for comparing a field value against one candidate
#[derive(Debug, Clone)]
pub enum MatchStrategy {
    /// Case-insensitive equality with the whole field
    Exact(Regex),
    /// Case-insensitive containment anywhere in the field
    Partial(Regex),
    /// Unanchored search with a user-supplied pattern
    Regex(Regex),
}

impl MatchStrategy {
    fn build(value: &str, mode: MatchMode) -> ProcessResult<Self> {
        let strategy = match mode {
            MatchMode::Exact => MatchStrategy::Exact(literal(value, true)?),
            MatchMode::Partial => MatchStrategy::Partial(literal(value, false)?),
            MatchMode::Regex => MatchStrategy::Regex(
                Regex::new(value).map_err(|e| ProcessError::invalid_pattern(value, e))?,
            ),
        };
        Ok(strategy)
    }

    fn is_match(&self, field: &str) -> bool {
        match self {
            MatchStrategy::Exact(regex)
            | MatchStrategy::Partial(regex)
            | MatchStrategy::Regex(regex) => regex.is_match(field),
        }
    }
}

/// Compiles `value` as a literal under Unicode simple case folding, so every
/// member of a fold orbit (`Σ`, `σ`, `ς`) compares equal.
fn literal(value: &str, whole_field: bool) -> ProcessResult<Regex> {
    let escaped = regex::escape(value);
    let pattern = if whole_field {
        format!(r"\A(?:{})\z", escaped)
    } else {
        escaped
    };

    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| ProcessError::invalid_pattern(value, e))
}

/// A configured value paired with the strategy that tests it
#[derive(Debug, Clone)]
struct Candidate {
    value: String,
    strategy: MatchStrategy,
}

/// Finds the first configured value a field satisfies
#[derive(Debug, Clone)]
pub struct ValueMatcher {
    candidates: Vec<Candidate>,
    mode: MatchMode,
}

impl ValueMatcher {
    /// Builds a matcher for `values` in the given mode.
    ///
    /// Every candidate is compiled here, so a bad pattern or an empty value
    /// is reported before any file is opened.
    pub fn new(values: &[String], mode: MatchMode) -> ProcessResult<Self> {
        if values.is_empty() {
            return Err(ProcessError::config_error("at least one value is required"));
        }

        let candidates = values
            .iter()
            .enumerate()
            .map(|(pos, value)| {
                if value.trim().is_empty() {
                    return Err(ProcessError::config_error(format!(
                        "value #{} is empty",
                        pos + 1
                    )));
                }
                Ok(Candidate {
                    value: value.clone(),
                    strategy: MatchStrategy::build(value, mode)?,
                })
            })
            .collect::<ProcessResult<Vec<_>>>()?;

        Ok(Self { candidates, mode })
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// Configured values, in match order
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.candidates.iter().map(|c| c.value.as_str())
    }

    /// Returns the first value, in configured order, that `field` matches.
    /// An empty field never matches.
    pub fn find(&self, field: &str) -> Option<&str> {
        if field.is_empty() {
            return None;
        }

        self.candidates
            .iter()
            .find(|candidate| candidate.strategy.is_match(field))
            .map(|candidate| candidate.value.as_str())
    }
}
