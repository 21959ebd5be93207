//! # logmixer
//!
//! A single-process log-mixing node: routes structured log/event records
//! from sources to sinks, reducing them over time windows on the way.
//!
//! Producers deliver records (as [`Record`]s or as lines of wire text), the
//! node folds them into per-filter windowed accumulators, and each window a
//! filter closes is handed to the bindings registered for that filter,
//! which typically encode it and write it to a channel. A channel can be
//! another node, so aggregation cascades: several nodes reduce locally and
//! a collecting node re-reduces their closed windows (rereduce).
//!
//! ## Pieces
//!
//! - [`codec`]: record ⇄ single-line text
//! - [`matcher`]: structural record patterns
//! - [`window`]: windowed reduction with delayed emission
//! - [`dispatch`]: conditional fan-out of emitted records
//! - [`channel`]: output sinks
//! - [`mixer`]: the node tying it together, plus its input readers
//!
//! ## Quick Start
//!
//! ```rust
//! use logmixer::channel::{MemoryBuffer, Target};
//! use logmixer::dispatch::{Action, Condition};
//! use logmixer::matcher::Pattern;
//! use logmixer::mixer::Mixer;
//! use logmixer::window::Filter;
//! use logmixer::{record, reducers};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), logmixer::MixerError> {
//! let node = Mixer::new("edge");
//! let sink = MemoryBuffer::new();
//! node.output("out", Target::Memory(sink.clone())).await?;
//! node
//!   .filter(Filter::tumbling(
//!     "starts",
//!     Duration::from_secs(60),
//!     reducers::count(Pattern::new().eq("at", "start")),
//!   ))
//!   .await;
//! node
//!   .bind(["starts"], Condition::Always, Action::write_to(node.channels().clone(), "out"))
//!   .await;
//!
//! node.log([record! { "at" => "start", "__time" => 5.0 }]).await?;
//! node.log([record! { "at" => "start", "__time" => 65.0 }]).await?;
//! assert_eq!(sink.lines(), vec!["__filter=starts num=1 __time=5.000 __bin=0"]);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

/// Output channel registry.
pub mod channel;
/// Wire format encode/decode.
pub mod codec;
/// Declarative node configuration.
pub mod config;
/// Conditional fan-out of emitted records.
pub mod dispatch;
/// Crate error type.
pub mod error;
/// Record patterns.
pub mod matcher;
/// The log-mixing node.
pub mod mixer;
/// Ordered key/value records.
pub mod record;
/// Stock reduce functions.
pub mod reducers;
/// Wall-clock time and window indices.
pub mod time;
/// Windowed reduction.
pub mod window;

pub use error::{BoxError, MixerError, MixerResult};
pub use mixer::Mixer;
pub use record::{Record, Value};

#[cfg(test)]
mod mixer_test;
