//! # Node Configuration
//!
//! Declarative description of a node's channels, loadable from JSON:
//!
//! ```json
//! {
//!   "name": "edge",
//!   "outputs": [
//!     { "id": "console", "kind": "stdout" },
//!     { "id": "archive", "kind": "file", "path": "log/edge.log", "mode": "append" },
//!     { "id": "pager",   "kind": "command", "argv": ["logger", "-t", "edge"] }
//!   ],
//!   "inputs": [
//!     { "id": "app", "kind": "command", "argv": ["tail", "-F", "/var/log/app.log"] }
//!   ]
//! }
//! ```
//!
//! Filters and bindings carry closures and are registered in code; see
//! [`Mixer::from_config`](crate::mixer::Mixer::from_config).

use crate::channel::{OpenMode, Target};
use crate::error::MixerResult;
use crate::mixer::Source;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_name() -> String {
  "logmixer".to_string()
}

/// Top-level node configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixerConfig {
  /// Node name, used in logs and in cascading errors.
  #[serde(default = "default_name")]
  pub name: String,
  /// Output channels, opened in order.
  #[serde(default)]
  pub outputs: Vec<OutputConfig>,
  /// Inputs, started in order after every output is open.
  #[serde(default)]
  pub inputs: Vec<InputConfig>,
}

impl Default for MixerConfig {
  fn default() -> Self {
    Self {
      name: default_name(),
      outputs: Vec::new(),
      inputs: Vec::new(),
    }
  }
}

impl MixerConfig {
  /// Parses a JSON configuration.
  pub fn from_json(json: &str) -> MixerResult<Self> {
    Ok(serde_json::from_str(json)?)
  }

  /// Sets the node name.
  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  /// Adds an output channel.
  pub fn with_output(mut self, id: impl Into<String>, target: OutputTarget) -> Self {
    self.outputs.push(OutputConfig {
      id: id.into(),
      target,
    });
    self
  }

  /// Adds an input.
  pub fn with_input(mut self, id: impl Into<String>, source: InputSource) -> Self {
    self.inputs.push(InputConfig {
      id: id.into(),
      source,
    });
    self
  }
}

/// One output channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
  /// Channel id actions write to.
  pub id: String,
  /// What the channel writes to.
  #[serde(flatten)]
  pub target: OutputTarget,
}

/// Serializable subset of [`Target`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputTarget {
  /// Standard output.
  Stdout,
  /// Standard error.
  Stderr,
  /// A file.
  File {
    /// File path.
    path: PathBuf,
    /// Defaults to append.
    #[serde(default)]
    mode: OpenMode,
  },
  /// A subprocess fed on stdin.
  Command {
    /// Program and arguments.
    argv: Vec<String>,
  },
}

impl From<OutputTarget> for Target {
  fn from(target: OutputTarget) -> Self {
    match target {
      OutputTarget::Stdout => Target::Stdout,
      OutputTarget::Stderr => Target::Stderr,
      OutputTarget::File { path, mode } => Target::File { path, mode },
      OutputTarget::Command { argv } => Target::Command(argv),
    }
  }
}

/// One input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
  /// Input id, the name input bindings are registered under.
  pub id: String,
  /// Where lines come from.
  #[serde(flatten)]
  pub source: InputSource,
}

/// Serializable subset of [`Source`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputSource {
  /// Standard input.
  Stdin,
  /// A file, read from the start.
  File {
    /// File path.
    path: PathBuf,
  },
  /// A subprocess's stdout.
  Command {
    /// Program and arguments.
    argv: Vec<String>,
  },
}

impl From<InputSource> for Source {
  fn from(source: InputSource) -> Self {
    match source {
      InputSource::Stdin => Source::Stdin,
      InputSource::File { path } => Source::File(path),
      InputSource::Command { argv } => Source::Command(argv),
    }
  }
}
