//! # Dispatch Router
//!
//! Conditional fan-out. A [`Router`] keeps, per name, an ordered list of
//! [`Binding`]s: a [`Condition`] and the [`Action`] to run when it holds.
//! Dispatching a record under a name runs every binding whose condition
//! accepts it, in registration order.
//!
//! The node keeps two routers: one keyed by filter name, fired with each
//! record a filter emits, and one keyed by input name, fired with every raw
//! inbound record before windowing.
//!
//! ## Callback shapes
//!
//! Conditions and actions come in two shapes picked at registration time:
//! over the record alone, or over the record and the emitting filter's
//! buffer. User callbacks are synchronous. The two stock actions,
//! [`Action::write_to`] and [`Action::forward_to`], do I/O and are awaited
//! by the router.
//!
//! ## Failures
//!
//! A condition or action error is not caught. Dispatch stops at the first
//! failing binding and returns the error.

use crate::channel::Channels;
use crate::codec::encode;
use crate::error::{BoxError, MixerError, MixerResult};
use crate::matcher::{Pattern, matches};
use crate::mixer::Mixer;
use crate::record::Record;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

type RecordFn<T> = Arc<dyn Fn(&Record) -> Result<T, BoxError> + Send + Sync>;
type BufferedFn<T> = Arc<dyn Fn(&Record, &[Record]) -> Result<T, BoxError> + Send + Sync>;

/// Decides whether a binding fires.
#[derive(Clone, Default)]
pub enum Condition {
  /// Always fires.
  #[default]
  Always,
  /// Fires when the record matches the pattern.
  Pattern(Pattern),
  /// Predicate over the record.
  Record(RecordFn<bool>),
  /// Predicate over the record and the filter buffer.
  Buffered(BufferedFn<bool>),
}

impl Condition {
  /// Predicate over the record.
  pub fn when<F>(f: F) -> Self
  where
    F: Fn(&Record) -> Result<bool, BoxError> + Send + Sync + 'static,
  {
    Condition::Record(Arc::new(f))
  }

  /// Predicate over the record and the buffer it was emitted from.
  pub fn when_buffered<F>(f: F) -> Self
  where
    F: Fn(&Record, &[Record]) -> Result<bool, BoxError> + Send + Sync + 'static,
  {
    Condition::Buffered(Arc::new(f))
  }

  fn check(&self, record: &Record, buffer: &[Record]) -> Result<bool, BoxError> {
    match self {
      Condition::Always => Ok(true),
      Condition::Pattern(pattern) => Ok(matches(record, pattern)),
      Condition::Record(f) => f(record),
      Condition::Buffered(f) => f(record, buffer),
    }
  }
}

impl From<Pattern> for Condition {
  fn from(pattern: Pattern) -> Self {
    Condition::Pattern(pattern)
  }
}

impl fmt::Debug for Condition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Condition::Always => f.write_str("Always"),
      Condition::Pattern(p) => f.debug_tuple("Pattern").field(p).finish(),
      Condition::Record(_) => f.write_str("Record(..)"),
      Condition::Buffered(_) => f.write_str("Buffered(..)"),
    }
  }
}

/// What a binding does when it fires.
#[derive(Clone)]
pub enum Action {
  /// Callback over the record.
  Record(RecordFn<()>),
  /// Callback over the record and the filter buffer.
  Buffered(BufferedFn<()>),
  /// Encodes the record and writes it to a channel.
  Write {
    /// Registry holding the channel.
    channels: Channels,
    /// Channel id.
    id: String,
  },
  /// Hands the record to another node's ingestion entry point.
  Forward(Mixer),
}

impl Action {
  /// Callback over the record.
  pub fn new<F>(f: F) -> Self
  where
    F: Fn(&Record) -> Result<(), BoxError> + Send + Sync + 'static,
  {
    Action::Record(Arc::new(f))
  }

  /// Callback over the record and the buffer it was emitted from.
  pub fn buffered<F>(f: F) -> Self
  where
    F: Fn(&Record, &[Record]) -> Result<(), BoxError> + Send + Sync + 'static,
  {
    Action::Buffered(Arc::new(f))
  }

  /// Encodes the record and writes it to channel `id`.
  pub fn write_to(channels: Channels, id: impl Into<String>) -> Self {
    Action::Write {
      channels,
      id: id.into(),
    }
  }

  /// Feeds the record straight into another node's ingestion entry point.
  pub fn forward_to(node: Mixer) -> Self {
    Action::Forward(node)
  }

  async fn run(&self, record: &Record, buffer: &[Record]) -> Result<(), BoxError> {
    match self {
      Action::Record(f) => f(record),
      Action::Buffered(f) => f(record, buffer),
      Action::Write { channels, id } => Ok(channels.write(id, &encode(record)).await?),
      Action::Forward(node) => node
        .log([record.clone()])
        .await
        .map_err(|source| {
          MixerError::Downstream {
            node: node.name().to_string(),
            source: Box::new(source),
          }
          .into()
        }),
    }
  }
}

impl fmt::Debug for Action {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Action::Record(_) => f.write_str("Record(..)"),
      Action::Buffered(_) => f.write_str("Buffered(..)"),
      Action::Write { id, .. } => f.debug_struct("Write").field("id", id).finish_non_exhaustive(),
      Action::Forward(node) => f.debug_tuple("Forward").field(&node.name()).finish(),
    }
  }
}

/// A registered (condition, action) pair.
#[derive(Debug, Clone)]
pub struct Binding {
  condition: Condition,
  action: Action,
}

/// Per-name ordered binding lists.
#[derive(Debug, Default)]
pub struct Router {
  bindings: HashMap<String, Vec<Binding>>,
}

impl Router {
  /// Creates an empty router.
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers `action` under every name in `names`, after any bindings
  /// already there.
  pub fn bind<I, S>(&mut self, names: I, condition: Condition, action: Action)
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    for name in names {
      self
        .bindings
        .entry(name.into())
        .or_default()
        .push(Binding {
          condition: condition.clone(),
          action: action.clone(),
        });
    }
  }

  /// Number of bindings registered under `name`.
  pub fn binding_count(&self, name: &str) -> usize {
    self.bindings.get(name).map_or(0, Vec::len)
  }

  /// Runs the bindings for `name` whose condition accepts `record`.
  ///
  /// Bindings run one at a time; a channel write or downstream node is
  /// awaited before the next binding is considered. Returns how many fired.
  pub async fn dispatch(
    &self,
    name: &str,
    record: &Record,
    buffer: &[Record],
  ) -> MixerResult<usize> {
    let Some(bindings) = self.bindings.get(name) else {
      return Ok(0);
    };
    let mut fired = 0;
    for binding in bindings {
      let accepted = binding
        .condition
        .check(record, buffer)
        .map_err(|source| MixerError::Condition {
          name: name.to_string(),
          source,
        })?;
      if !accepted {
        continue;
      }
      binding
        .action
        .run(record, buffer)
        .await
        .map_err(|source| MixerError::Action {
          name: name.to_string(),
          source,
        })?;
      fired += 1;
    }
    debug!(name, fired, "dispatched");
    Ok(fired)
  }
}
