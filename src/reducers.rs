//! Stock reduce functions.
//!
//! [`count`] builds per-window counters of records matching a pattern and
//! [`sum`] merges partial counters from upstream nodes (the rereduce step);
//! both are associative over partial accumulators. [`passthrough`] keeps
//! records verbatim, which is what unbounded filters usually want.

use crate::error::BoxError;
use crate::matcher::{Pattern, matches};
use crate::record::{Record, Value};
use crate::window::{Reduced, Reducer};

/// Field [`count`] increments.
pub const COUNT_KEY: &str = "num";

/// A [`Reducer`] backed by a closure over `(accumulator, record)`.
pub struct FnReducer<F> {
  f: F,
}

impl<F> Reducer for FnReducer<F>
where
  F: FnMut(&Record, &Record) -> Result<Reduced, BoxError> + Send,
{
  fn reduce(&mut self, acc: &Record, record: &Record) -> Result<Reduced, BoxError> {
    (self.f)(acc, record)
  }
}

/// Wraps a closure as a [`Reducer`].
///
/// ```rust
/// use logmixer::reducers;
/// use logmixer::window::Reduced;
///
/// let _latest = reducers::from_fn(|_acc, record| Ok(Reduced::Accept(record.clone())));
/// ```
pub fn from_fn<F>(f: F) -> FnReducer<F>
where
  F: FnMut(&Record, &Record) -> Result<Reduced, BoxError> + Send,
{
  FnReducer { f }
}

/// Accepts every record unchanged.
pub fn passthrough() -> impl Reducer {
  from_fn(|_acc, record| Ok(Reduced::Accept(record.clone())))
}

/// Counts records matching `pattern` into [`COUNT_KEY`]; others are skipped.
pub fn count(pattern: Pattern) -> impl Reducer {
  from_fn(move |acc, record| {
    if !matches(record, &pattern) {
      return Ok(Reduced::Skip);
    }
    let seen = acc.get(COUNT_KEY).and_then(Value::as_i64).unwrap_or(0);
    Ok(Reduced::Accept(acc.clone().with(COUNT_KEY, seen + 1)))
  })
}

/// Adds the numeric `field` of records matching `pattern` into the
/// accumulator's `field`.
///
/// Records without a numeric `field` are skipped. The sum stays an integer
/// while both operands are integers.
pub fn sum(field: impl Into<String>, pattern: Pattern) -> impl Reducer {
  let field = field.into();
  from_fn(move |acc, record| {
    if !matches(record, &pattern) {
      return Ok(Reduced::Skip);
    }
    let Some(value) = record.get(&field).filter(|v| v.as_f64().is_some()) else {
      return Ok(Reduced::Skip);
    };
    let total = match (acc.get(&field), value) {
      (None, _) => value.clone(),
      (Some(Value::Int(a)), Value::Int(b)) => match a.checked_add(*b) {
        Some(total) => Value::Int(total),
        None => return Err(format!("field {} overflowed", field).into()),
      },
      (Some(a), b) => match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => Value::Float(a + b),
        _ => return Err(format!("field {} is not numeric", field).into()),
      },
    };
    Ok(Reduced::Accept(acc.clone().with(field.as_str(), total)))
  })
}
