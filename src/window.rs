//! # Windowed Reduction
//!
//! A [`Filter`] folds incoming records into time-bucketed accumulators and
//! reports a bucket only once it is known to be closed.
//!
//! # Overview
//!
//! - [`Windowing::Tumbling`]: records map to bin `floor(__time / period)`.
//!   Each bin owns one accumulator in the filter's buffer, created the first
//!   time a record lands in it and updated in place afterwards.
//! - [`Windowing::Unbounded`]: every record is its own window. The reduce
//!   result is appended and emitted straight away.
//!
//! # Delayed emission
//!
//! A tumbling filter emits nothing while records keep landing in known bins.
//! When a record opens a new bin, the accumulator that was last in the
//! buffer before it is emitted: a later window has started, so the earlier
//! one is closed. The very first bin a filter sees has no predecessor and
//! triggers no emission. Buffer order is bin arrival order, not numeric
//! order; a late record for an older bin updates that accumulator without
//! emitting anything.
//!
//! Closed-only emission is what makes cascading work: a downstream node can
//! run the same reduction over partial accumulators from several upstream
//! nodes (rereduce), provided the reduce function is associative and
//! commutative over partials.
//!
//! # Example
//!
//! ```rust
//! use logmixer::matcher::Pattern;
//! use logmixer::record;
//! use logmixer::reducers;
//! use logmixer::window::Filter;
//! use std::time::Duration;
//!
//! let mut filter = Filter::tumbling(
//!   "starts",
//!   Duration::from_secs(60),
//!   reducers::count(Pattern::new().eq("at", "start")),
//! );
//! assert!(filter.ingest(&record! { "at" => "start", "__time" => 1.0 })?.is_none());
//! let closed = filter.ingest(&record! { "at" => "start", "__time" => 61.0 })?;
//! assert_eq!(closed.and_then(|r| r.bin()), Some(0));
//! # Ok::<(), logmixer::error::MixerError>(())
//! ```

use crate::error::{BoxError, MixerError, MixerResult};
use crate::record::{BIN_KEY, FILTER_KEY, Record, TIME_KEY};
use crate::time::bin_of;
use std::fmt;
use std::time::Duration;
use tracing::{debug, trace};

/// How a filter groups records into windows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Windowing {
  /// Fixed-length, non-overlapping windows.
  Tumbling {
    /// Window length.
    period: Duration,
  },
  /// No windowing: each record stands alone and the buffer is unbounded.
  Unbounded,
}

impl Windowing {
  /// Tumbling windows of `period`, or unbounded when `period` is absent or
  /// zero.
  pub fn from_period(period: Option<Duration>) -> Self {
    match period {
      Some(period) if !period.is_zero() => Windowing::Tumbling { period },
      _ => Windowing::Unbounded,
    }
  }
}

/// Outcome of a reduce step.
#[derive(Debug, Clone, PartialEq)]
pub enum Reduced {
  /// The record was folded in; this is the new accumulator.
  Accept(Record),
  /// The record does not qualify; leave everything untouched.
  Skip,
}

/// Folds a record into an accumulator.
///
/// For a bin seen for the first time the accumulator is a fresh seed
/// carrying only `__filter`. Closures become reducers through
/// [`reducers::from_fn`](crate::reducers::from_fn).
pub trait Reducer: Send {
  /// Returns the updated accumulator, or [`Reduced::Skip`].
  fn reduce(&mut self, acc: &Record, record: &Record) -> Result<Reduced, BoxError>;
}

/// A named windowed reduction and its buffer of accumulators.
pub struct Filter {
  name: String,
  windowing: Windowing,
  reducer: Box<dyn Reducer>,
  buffer: Vec<Record>,
}

impl Filter {
  /// Creates a filter with explicit windowing.
  pub fn new(name: impl Into<String>, windowing: Windowing, reducer: impl Reducer + 'static) -> Self {
    Self {
      name: name.into(),
      windowing,
      reducer: Box::new(reducer),
      buffer: Vec::new(),
    }
  }

  /// Creates a filter over tumbling windows of `period`. A zero period gives
  /// an unbounded filter.
  pub fn tumbling(name: impl Into<String>, period: Duration, reducer: impl Reducer + 'static) -> Self {
    Self::new(name, Windowing::from_period(Some(period)), reducer)
  }

  /// Creates a filter where every record is its own window.
  pub fn unbounded(name: impl Into<String>, reducer: impl Reducer + 'static) -> Self {
    Self::new(name, Windowing::Unbounded, reducer)
  }

  /// The filter name.
  pub fn name(&self) -> &str {
    &self.name
  }

  /// The windowing mode.
  pub fn windowing(&self) -> Windowing {
    self.windowing
  }

  /// Accumulators in bin arrival order.
  pub fn buffer(&self) -> &[Record] {
    &self.buffer
  }

  /// The accumulator for `bin`, if that bin has been seen.
  pub fn accumulator(&self, bin: i64) -> Option<&Record> {
    self.position(bin).map(|idx| &self.buffer[idx])
  }

  /// Folds `record` in and returns the record to emit, if any.
  ///
  /// For tumbling filters that is the previously-last accumulator whenever
  /// `record` opens a new bin; for unbounded filters it is the reduce result
  /// itself. A skipped record changes nothing and emits nothing.
  pub fn ingest(&mut self, record: &Record) -> MixerResult<Option<Record>> {
    match self.windowing {
      Windowing::Tumbling { period } => self.ingest_windowed(record, period),
      Windowing::Unbounded => self.ingest_unbounded(record),
    }
  }

  fn ingest_windowed(&mut self, record: &Record, period: Duration) -> MixerResult<Option<Record>> {
    let time = record.time().ok_or_else(|| MixerError::MissingTimestamp {
      filter: self.name.clone(),
    })?;
    let bin = bin_of(time, period);

    if let Some(idx) = self.position(bin) {
      let current = self.buffer[idx].clone();
      let Some(mut updated) = self.reduce(&current, record)? else {
        trace!(filter = %self.name, bin, "record skipped");
        return Ok(None);
      };
      // An accumulator keeps the time of the record that opened its bin.
      if let Some(opened) = current.time() {
        updated.insert(TIME_KEY, opened);
      }
      updated.insert(BIN_KEY, bin);
      self.buffer[idx] = updated;
      return Ok(None);
    }

    let seed = self.seed();
    let Some(mut fresh) = self.reduce(&seed, record)? else {
      trace!(filter = %self.name, bin, "record skipped");
      return Ok(None);
    };
    fresh.insert(TIME_KEY, time);
    fresh.insert(BIN_KEY, bin);
    self.buffer.push(fresh);

    let closed = self.buffer.len().checked_sub(2).map(|idx| self.buffer[idx].clone());
    if let Some(closed) = &closed {
      debug!(filter = %self.name, bin = ?closed.bin(), opened = bin, "window closed");
    }
    Ok(closed)
  }

  fn ingest_unbounded(&mut self, record: &Record) -> MixerResult<Option<Record>> {
    let seed = self.seed();
    let Some(result) = self.reduce(&seed, record)? else {
      return Ok(None);
    };
    self.buffer.push(result.clone());
    debug!(filter = %self.name, "record passed through");
    Ok(Some(result))
  }

  fn reduce(&mut self, acc: &Record, record: &Record) -> MixerResult<Option<Record>> {
    match self.reducer.reduce(acc, record) {
      Ok(Reduced::Accept(acc)) => Ok(Some(acc)),
      Ok(Reduced::Skip) => Ok(None),
      Err(source) => Err(MixerError::Reduce {
        filter: self.name.clone(),
        source,
      }),
    }
  }

  fn seed(&self) -> Record {
    Record::new().with(FILTER_KEY, self.name.as_str())
  }

  // The newest bins sit at the end of the buffer.
  fn position(&self, bin: i64) -> Option<usize> {
    self.buffer.iter().rposition(|acc| acc.bin() == Some(bin))
  }
}

impl fmt::Debug for Filter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Filter")
      .field("name", &self.name)
      .field("windowing", &self.windowing)
      .field("buffer", &self.buffer)
      .finish_non_exhaustive()
  }
}
