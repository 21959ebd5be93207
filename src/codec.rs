//! # Wire Codec
//!
//! Conversion between [`Record`]s and their single-line text form:
//!
//! ```text
//! exec at=start pid=42 took=0.250 cmd="echo \"hi\""
//! ```
//!
//! - a bare key is boolean `true`; `key=false` is boolean `false`
//! - `key=value` is an integer when `value` is a canonical integer literal,
//!   a float when formatting it to three decimals reproduces it, otherwise
//!   an opaque string
//! - `key="..."` is always a string; `\"` and `\\` are the only escapes
//! - fields appear in record order
//!
//! Decoding never fails. Malformed text (an unterminated quote, a stray `=`)
//! still yields a record, possibly with string values where another type
//! was intended.

use crate::record::{Record, Value};
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::trace;

static QUOTED: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r#"([^\s="]+)="((?:[^"\\]|\\.)*)""#).expect("static regex"));

static PLAIN: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r#"([^\s="]+)=(\S*)"#).expect("static regex"));

// Only `\"` and `\\` are escapes; any other backslash is literal.
static ESCAPED: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r#"\\(["\\])"#).expect("static regex"));

/// Encodes `record` as one line of text, without a trailing newline.
pub fn encode(record: &Record) -> String {
  let mut out = String::new();
  for (key, value) in record.iter() {
    if !out.is_empty() {
      out.push(' ');
    }
    out.push_str(key);
    match value {
      Value::Bool(true) => {}
      Value::Bool(false) => out.push_str("=false"),
      Value::Int(i) => {
        out.push('=');
        out.push_str(&i.to_string());
      }
      Value::Float(x) => {
        out.push('=');
        out.push_str(&format!("{:.3}", x));
      }
      Value::Str(s) if needs_quoting(s) => {
        out.push_str("=\"");
        for c in s.chars() {
          if c == '"' || c == '\\' {
            out.push('\\');
          }
          out.push(c);
        }
        out.push('"');
      }
      Value::Str(s) => {
        out.push('=');
        out.push_str(s);
      }
    }
  }
  out
}

/// Decodes one line of text into a [`Record`].
///
/// Values are harvested first (quoted pairs, then unquoted pairs), each
/// matched span is collapsed to its bare key, and the remaining tokens give
/// the field order. Quoted values may contain spaces and `=`, so splitting
/// the raw line would not work.
pub fn decode(line: &str) -> Record {
  let mut values: HashMap<String, Value> = HashMap::new();

  let unquoted = QUOTED.replace_all(line, |caps: &Captures<'_>| {
    let key = caps[1].to_string();
    let text = ESCAPED.replace_all(&caps[2], "$1").into_owned();
    values.insert(key.clone(), Value::Str(text));
    key
  });

  let keys_only = PLAIN.replace_all(&unquoted, |caps: &Captures<'_>| {
    let key = caps[1].to_string();
    values.insert(key.clone(), infer(&caps[2]));
    key
  });

  let record: Record = keys_only
    .split_whitespace()
    .map(|key| {
      let value = values.get(key).cloned().unwrap_or(Value::Bool(true));
      (key, value)
    })
    .collect();
  trace!(fields = record.len(), "decoded line");
  record
}

/// Type inference for an unquoted value.
pub(crate) fn infer(raw: &str) -> Value {
  if raw == "false" {
    return Value::Bool(false);
  }
  if let Ok(i) = raw.parse::<i64>()
    && i.to_string() == raw
  {
    return Value::Int(i);
  }
  if let Ok(x) = raw.parse::<f64>()
    && format!("{:.3}", x) == raw
  {
    return Value::Float(x);
  }
  Value::Str(raw.to_string())
}

/// A string goes on the wire quoted unless it would decode back to itself
/// as a bare token.
fn needs_quoting(s: &str) -> bool {
  s.is_empty()
    || s.chars().any(|c| c.is_whitespace() || c == '"' || c == '\\')
    || !matches!(infer(s), Value::Str(_))
}
