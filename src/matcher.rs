//! # Matcher
//!
//! Structural predicates over records. A [`Pattern`] lists keys a record must
//! carry, each with either an exact expected [`Value`] or a regular
//! expression tested against the value's text form. Keys the pattern does not
//! mention are ignored.
//!
//! ```rust
//! use logmixer::matcher::{matches, Pattern};
//! use logmixer::record;
//!
//! let pattern = Pattern::new().eq("exec", true).regex("at", "finish|error")?;
//! assert!(matches(&record! { "exec" => true, "at" => "finish" }, &pattern));
//! assert!(!matches(&record! { "exec" => true }, &pattern));
//! # Ok::<(), logmixer::error::MixerError>(())
//! ```

use crate::error::{MixerError, MixerResult};
use crate::record::{Record, Value};
use regex::Regex;

/// What a single pattern key expects of the record.
#[derive(Debug, Clone)]
pub enum Expected {
  /// The record value must be equal.
  Value(Value),
  /// The regex must match the record value's text form.
  Regex(Regex),
}

impl Expected {
  fn accepts(&self, value: &Value) -> bool {
    match self {
      Expected::Value(expected) => expected == value,
      Expected::Regex(re) => re.is_match(&value.to_string()),
    }
  }
}

/// A partial record, optionally with regex values.
#[derive(Debug, Clone, Default)]
pub struct Pattern {
  entries: Vec<(String, Expected)>,
}

impl Pattern {
  /// An empty pattern; it matches every record.
  pub fn new() -> Self {
    Self::default()
  }

  /// Requires `key` to equal `value`.
  pub fn eq(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    self.entries.push((key.into(), Expected::Value(value.into())));
    self
  }

  /// Requires the text form of `key` to match `pattern`.
  pub fn regex(mut self, key: impl Into<String>, pattern: &str) -> MixerResult<Self> {
    let key = key.into();
    let re = Regex::new(pattern).map_err(|source| MixerError::Pattern {
      key: key.clone(),
      source,
    })?;
    self.entries.push((key, Expected::Regex(re)));
    Ok(self)
  }

  /// Requires the text form of `key` to match an already compiled regex.
  pub fn regex_compiled(mut self, key: impl Into<String>, re: Regex) -> Self {
    self.entries.push((key.into(), Expected::Regex(re)));
    self
  }

  /// Number of keys the pattern constrains.
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  /// Returns true if the pattern constrains nothing.
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Shorthand for [`matches`]`(record, self)`.
  pub fn is_match(&self, record: &Record) -> bool {
    matches(record, self)
  }
}

impl From<Record> for Pattern {
  fn from(record: Record) -> Self {
    Self {
      entries: record
        .into_iter()
        .map(|(k, v)| (k, Expected::Value(v)))
        .collect(),
    }
  }
}

/// Returns true iff every key of `pattern` is present in `record` and
/// accepted by its expectation.
pub fn matches(record: &Record, pattern: &Pattern) -> bool {
  pattern
    .entries
    .iter()
    .all(|(key, expected)| record.get(key).is_some_and(|v| expected.accepts(v)))
}
