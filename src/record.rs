//! # Records
//!
//! The in-memory form of a log/event line: an ordered set of key/value
//! fields whose values are one of four scalar types.
//!
//! Field order is part of a record's identity. It decides the order fields
//! are written on the wire and [`decode`](crate::codec::decode) restores it,
//! so two records with the same fields in a different order are not equal.
//!
//! ## Reserved keys
//!
//! - [`TIME_KEY`] (`__time`): timestamp in fractional seconds. Stamped by the
//!   node on ingestion when absent; never rewritten afterwards.
//! - [`BIN_KEY`] (`__bin`): window index, only present on accumulators.
//! - [`FILTER_KEY`] (`__filter`): name of the filter that seeded an
//!   accumulator.
//!
//! ## Example
//!
//! ```rust
//! use logmixer::record;
//! use logmixer::record::{Record, Value};
//!
//! let r = record! { "exec" => true, "at" => "start", "pid" => 42 };
//! assert_eq!(r.get("pid"), Some(&Value::Int(42)));
//! assert_eq!(r.to_string(), "exec at=start pid=42");
//! ```

use std::fmt;

/// Key holding the record timestamp in seconds.
pub const TIME_KEY: &str = "__time";
/// Key holding an accumulator's window index.
pub const BIN_KEY: &str = "__bin";
/// Key naming the filter a fresh accumulator belongs to.
pub const FILTER_KEY: &str = "__filter";

/// A single field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  /// `true` is written as a bare key, `false` as `key=false`.
  Bool(bool),
  /// Signed integer.
  Int(i64),
  /// Floating point, written with three fractional digits.
  Float(f64),
  /// Free-form text. Identifier-like strings go on the wire unquoted.
  Str(String),
}

impl Value {
  /// Returns the value as `f64` when it is numeric.
  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Value::Int(i) => Some(*i as f64),
      Value::Float(f) => Some(*f),
      _ => None,
    }
  }

  /// Returns the value as `i64` when it is an integer.
  pub fn as_i64(&self) -> Option<i64> {
    match self {
      Value::Int(i) => Some(*i),
      _ => None,
    }
  }

  /// Returns the text of a string value.
  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::Str(s) => Some(s),
      _ => None,
    }
  }

  /// Returns the flag of a boolean value.
  pub fn as_bool(&self) -> Option<bool> {
    match self {
      Value::Bool(b) => Some(*b),
      _ => None,
    }
  }
}

/// The unquoted textual form: what regex patterns are matched against.
impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Bool(b) => write!(f, "{}", b),
      Value::Int(i) => write!(f, "{}", i),
      Value::Float(x) => write!(f, "{:.3}", x),
      Value::Str(s) => f.write_str(s),
    }
  }
}

impl From<bool> for Value {
  fn from(v: bool) -> Self {
    Value::Bool(v)
  }
}

impl From<i64> for Value {
  fn from(v: i64) -> Self {
    Value::Int(v)
  }
}

impl From<i32> for Value {
  fn from(v: i32) -> Self {
    Value::Int(i64::from(v))
  }
}

impl From<u32> for Value {
  fn from(v: u32) -> Self {
    Value::Int(i64::from(v))
  }
}

impl From<f64> for Value {
  fn from(v: f64) -> Self {
    Value::Float(v)
  }
}

impl From<&str> for Value {
  fn from(v: &str) -> Self {
    Value::Str(v.to_string())
  }
}

impl From<String> for Value {
  fn from(v: String) -> Self {
    Value::Str(v)
  }
}

/// An insertion-ordered map from field names to [`Value`]s.
///
/// Records are small (a handful of fields), so lookups scan a `Vec` rather
/// than hashing; this keeps order handling trivial.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
  fields: Vec<(String, Value)>,
}

impl Record {
  /// Creates an empty record.
  pub fn new() -> Self {
    Self::default()
  }

  /// Builder form of [`insert`](Self::insert).
  pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    self.insert(key, value);
    self
  }

  /// Sets `key` to `value`.
  ///
  /// An existing key keeps its position; a new key is appended. Returns the
  /// previous value, if any.
  pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
    let key = key.into();
    let value = value.into();
    match self.fields.iter_mut().find(|(k, _)| *k == key) {
      Some((_, slot)) => Some(std::mem::replace(slot, value)),
      None => {
        self.fields.push((key, value));
        None
      }
    }
  }

  /// Returns the value stored under `key`.
  pub fn get(&self, key: &str) -> Option<&Value> {
    self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
  }

  /// Removes `key`, returning its value.
  pub fn remove(&mut self, key: &str) -> Option<Value> {
    let idx = self.fields.iter().position(|(k, _)| k == key)?;
    Some(self.fields.remove(idx).1)
  }

  /// Returns true if `key` is present.
  pub fn contains_key(&self, key: &str) -> bool {
    self.get(key).is_some()
  }

  /// Iterates the keys in record order.
  pub fn keys(&self) -> impl Iterator<Item = &str> {
    self.fields.iter().map(|(k, _)| k.as_str())
  }

  /// Iterates `(key, value)` pairs in record order.
  pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
    self.fields.iter().map(|(k, v)| (k.as_str(), v))
  }

  /// Number of fields.
  pub fn len(&self) -> usize {
    self.fields.len()
  }

  /// Returns true if the record has no fields.
  pub fn is_empty(&self) -> bool {
    self.fields.is_empty()
  }

  /// Folds `other` into `self`; on a key collision `other` wins.
  pub fn merge(&mut self, other: Record) {
    for (key, value) in other.fields {
      self.insert(key, value);
    }
  }

  /// The `__time` field as seconds, if present and numeric.
  pub fn time(&self) -> Option<f64> {
    self.get(TIME_KEY).and_then(Value::as_f64)
  }

  /// The `__bin` field, if present.
  pub fn bin(&self) -> Option<i64> {
    self.get(BIN_KEY).and_then(Value::as_i64)
  }
}

impl<K, V> FromIterator<(K, V)> for Record
where
  K: Into<String>,
  V: Into<Value>,
{
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    let mut record = Record::new();
    for (k, v) in iter {
      record.insert(k, v);
    }
    record
  }
}

impl IntoIterator for Record {
  type Item = (String, Value);
  type IntoIter = std::vec::IntoIter<(String, Value)>;

  fn into_iter(self) -> Self::IntoIter {
    self.fields.into_iter()
  }
}

/// Writes the wire form, see [`encode`](crate::codec::encode).
impl fmt::Display for Record {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&crate::codec::encode(self))
  }
}

/// Builds a [`Record`] from `key => value` pairs, keeping their order.
///
/// ```rust
/// use logmixer::record;
///
/// let r = record! { "a" => true, "n" => 3 };
/// assert_eq!(r.len(), 2);
/// ```
#[macro_export]
macro_rules! record {
  () => {
    $crate::record::Record::new()
  };
  ($($key:expr => $value:expr),+ $(,)?) => {{
    let mut record = $crate::record::Record::new();
    $(record.insert($key, $value);)+
    record
  }};
}
