//! # Error Handling
//!
//! One error type for the whole node, [`MixerError`].
//!
//! The core never retries and never swallows a failure: decode is the only
//! operation that cannot fail (it degrades to a best-effort parse), and every
//! other failure propagates to whoever called into the node.
//!
//! ## Callback failures
//!
//! Reduce functions, conditions and actions are user code. They report
//! failure with a [`BoxError`]; the core wraps it in
//! [`MixerError::Reduce`], [`MixerError::Condition`] or
//! [`MixerError::Action`] naming where it happened and returns it from the
//! ingestion call. For a record delivered by an input reader this ends that
//! reader only.

use std::io;
use thiserror::Error;

/// Boxed error returned by user-supplied callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type used throughout the crate.
pub type MixerResult<T> = Result<T, MixerError>;

/// Errors raised by the node, its filters, bindings and channels.
#[derive(Error, Debug)]
pub enum MixerError {
  /// `write` named a channel that was never opened.
  #[error("unknown channel: {0}")]
  UnknownChannel(String),

  /// `open` named a channel id that is already in use.
  #[error("channel already open: {0}")]
  DuplicateChannel(String),

  /// A channel or input could not be opened.
  #[error("failed to open channel {id}: {source}")]
  Open {
    /// Channel id.
    id: String,
    /// Underlying I/O failure.
    #[source]
    source: io::Error,
  },

  /// Writing a line to a channel failed.
  #[error("failed to write to channel {id}: {source}")]
  Write {
    /// Channel id.
    id: String,
    /// Underlying I/O failure.
    #[source]
    source: io::Error,
  },

  /// Tearing down a channel failed.
  #[error("failed to close channel {id}: {source}")]
  Close {
    /// Channel id.
    id: String,
    /// Underlying I/O failure.
    #[source]
    source: io::Error,
  },

  /// A pattern regex did not compile.
  #[error("invalid pattern for key {key}: {source}")]
  Pattern {
    /// Pattern key the regex was meant for.
    key: String,
    /// Compile error.
    #[source]
    source: regex::Error,
  },

  /// A windowed filter received a record without a numeric `__time`.
  #[error("filter {filter}: record has no numeric __time")]
  MissingTimestamp {
    /// Filter name.
    filter: String,
  },

  /// A filter's reduce function failed.
  #[error("reduce function of filter {filter} failed: {source}")]
  Reduce {
    /// Filter name.
    filter: String,
    /// Callback error.
    #[source]
    source: BoxError,
  },

  /// A binding's condition failed.
  #[error("condition bound to {name} failed: {source}")]
  Condition {
    /// Filter or input name the binding is registered under.
    name: String,
    /// Callback error.
    #[source]
    source: BoxError,
  },

  /// A binding's action failed.
  #[error("action bound to {name} failed: {source}")]
  Action {
    /// Filter or input name the binding is registered under.
    name: String,
    /// Callback error.
    #[source]
    source: BoxError,
  },

  /// A node this node cascades into failed while ingesting.
  #[error("downstream node {node} failed: {source}")]
  Downstream {
    /// Name of the downstream node.
    node: String,
    /// Its error.
    #[source]
    source: Box<MixerError>,
  },

  /// Configuration could not be parsed.
  #[error("invalid configuration: {0}")]
  Config(#[from] serde_json::Error),

  /// A thread panicked while holding the input reader registry.
  #[error("reader registry lock poisoned")]
  Poisoned,
}
